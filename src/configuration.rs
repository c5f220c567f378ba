//! Config for the agent process
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! Required:
//!
//! - `CERTIFICATE_SETTINGS`: JSON object `{"path": "<prefix>"}`; `<prefix>.crt` and
//!   `<prefix>.key` must exist
//! - `FRIEDMAN_PORT`: Local port the round RPC listens on (`0` picks a free port)
//! - `PLAYING_FIELD_PORT`: Port of the playing field
//!
//! Optional:
//!
//! - `FRIEDMAN_NAME`: Name announced to the playing field (default: the strategy's name)
//! - `FRIEDMAN_BIND_IP`: Local address the listener binds (default: `::`, falling back to
//!   `0.0.0.0` on hosts without IPv6)
//! - `FRIEDMAN_PUBLIC_HOST`: Host part of the announced address (default: `localhost`)
//! - `PLAYING_FIELD_HOST`: Host of the playing field, also checked against its
//!   certificate (default: `localhost`)
//! - `FRIEDMAN_WORKERS`: Number of runtime worker threads (default: number of CPUs)
//! - `FRIEDMAN_LOG`: Set to `"true"` to log to a file instead of stdout (default: `false`)
//! - `FRIEDMAN_LOG_LEVEL`: `trace`, `debug`, `info`, `warn` or `error` (default: `info`)

use std::net::{IpAddr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::Level;

/// Certificate location descriptor.
pub const CERTIFICATE_SETTINGS_ENV_VAR: &str = "CERTIFICATE_SETTINGS";
/// Local listening port.
pub const FRIEDMAN_PORT_ENV_VAR: &str = "FRIEDMAN_PORT";
/// Playing field port.
pub const PLAYING_FIELD_PORT_ENV_VAR: &str = "PLAYING_FIELD_PORT";
/// Announced name.
pub const FRIEDMAN_NAME_ENV_VAR: &str = "FRIEDMAN_NAME";
/// Listening address.
pub const FRIEDMAN_BIND_IP_ENV_VAR: &str = "FRIEDMAN_BIND_IP";
/// Announced host.
pub const FRIEDMAN_PUBLIC_HOST_ENV_VAR: &str = "FRIEDMAN_PUBLIC_HOST";
/// Playing field host.
pub const PLAYING_FIELD_HOST_ENV_VAR: &str = "PLAYING_FIELD_HOST";
/// Runtime worker threads.
pub const FRIEDMAN_WORKERS_ENV_VAR: &str = "FRIEDMAN_WORKERS";
/// Log to file.
pub const FRIEDMAN_LOG_ENV_VAR: &str = "FRIEDMAN_LOG";
/// Log level.
pub const FRIEDMAN_LOG_LEVEL_ENV_VAR: &str = "FRIEDMAN_LOG_LEVEL";

/// A required setting is missing or cannot be parsed.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The variable is not set.
    #[error("{0} environment variable not set")]
    Missing(&'static str),
    /// The variable is set to something unusable.
    #[error("invalid value for {var}: {reason}")]
    Invalid {
        /// Name of the variable.
        var: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

#[derive(Deserialize)]
struct CertificateSettings {
    path: PathBuf,
}

/// Configuration of one agent process.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) certificate_path: PathBuf,
    pub(crate) bind_ip: IpAddr,
    pub(crate) port: u16,
    pub(crate) playing_field_host: String,
    pub(crate) playing_field_port: u16,
    pub(crate) public_host: String,
    pub(crate) agent_name: Option<String>,
    pub(crate) workers: usize,
    pub(crate) log: bool,
    pub(crate) log_level: Level,
    pub(crate) connect_timeout: Duration,
    pub(crate) response_timeout: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) shutdown_grace: Duration,
}

impl Configuration {
    /// Create a new configuration from the three required settings.
    ///
    /// By default:
    /// - The listener binds every interface, IPv6 and IPv4.
    /// - Both the agent and the playing field are announced/dialed as `localhost`.
    /// - The announced name is the strategy's own name.
    /// - One runtime worker thread per CPU.
    /// - Logs go to stdout at `INFO` level.
    /// - Registration gives up after 5s to connect and 10s to get an answer.
    /// - A round request taking more than 10s is cancelled.
    /// - Shutdown waits 5s for in-flight requests.
    pub fn new(certificate_path: impl Into<PathBuf>, port: u16, playing_field_port: u16) -> Self {
        Self {
            certificate_path: certificate_path.into(),
            bind_ip: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            port,
            playing_field_host: "localhost".to_owned(),
            playing_field_port,
            public_host: "localhost".to_owned(),
            agent_name: None,
            workers: num_cpus::get().max(1),
            log: false,
            log_level: Level::INFO,
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(5),
        }
    }

    /// Create configuration from environment variables (see module documentation).
    ///
    /// # Errors
    /// Returns a [`ConfigError`] naming the first missing or malformed variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let require = |var: &'static str| lookup(var).ok_or(ConfigError::Missing(var));

        let settings = require(CERTIFICATE_SETTINGS_ENV_VAR)?;
        let settings: CertificateSettings =
            serde_json::from_str(&settings).map_err(|e| ConfigError::Invalid {
                var: CERTIFICATE_SETTINGS_ENV_VAR,
                reason: e.to_string(),
            })?;
        let port = parse(FRIEDMAN_PORT_ENV_VAR, &require(FRIEDMAN_PORT_ENV_VAR)?)?;
        let playing_field_port: u16 =
            parse(PLAYING_FIELD_PORT_ENV_VAR, &require(PLAYING_FIELD_PORT_ENV_VAR)?)?;
        if playing_field_port == 0 {
            return Err(ConfigError::Invalid {
                var: PLAYING_FIELD_PORT_ENV_VAR,
                reason: "port 0 cannot be dialed".to_owned(),
            });
        }

        let mut config = Self::new(settings.path, port, playing_field_port);

        if let Some(name) = lookup(FRIEDMAN_NAME_ENV_VAR) {
            config = config.with_agent_name(name);
        }
        if let Some(ip) = lookup(FRIEDMAN_BIND_IP_ENV_VAR) {
            config = config.with_bind_ip(parse(FRIEDMAN_BIND_IP_ENV_VAR, &ip)?);
        }
        if let Some(host) = lookup(FRIEDMAN_PUBLIC_HOST_ENV_VAR) {
            config = config.with_public_host(host);
        }
        if let Some(host) = lookup(PLAYING_FIELD_HOST_ENV_VAR) {
            config = config.with_playing_field_host(host);
        }
        if let Some(workers) = lookup(FRIEDMAN_WORKERS_ENV_VAR) {
            let workers: usize = parse(FRIEDMAN_WORKERS_ENV_VAR, &workers)?;
            if workers == 0 {
                return Err(ConfigError::Invalid {
                    var: FRIEDMAN_WORKERS_ENV_VAR,
                    reason: "at least one worker is needed".to_owned(),
                });
            }
            config = config.with_workers(workers);
        }
        if let Some(log) = lookup(FRIEDMAN_LOG_ENV_VAR) {
            config = config.with_log(log.eq_ignore_ascii_case("true"));
        }
        if let Some(level) = lookup(FRIEDMAN_LOG_LEVEL_ENV_VAR) {
            config = config.with_log_level(parse(FRIEDMAN_LOG_LEVEL_ENV_VAR, &level)?);
        }

        Ok(config)
    }

    /// Set the name announced to the playing field.
    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = Some(name.into());
        self
    }

    /// Set the interface the listener binds.
    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Set the host part of the announced address.
    pub fn with_public_host(mut self, host: impl Into<String>) -> Self {
        self.public_host = host.into();
        self
    }

    /// Set the playing field host.
    pub fn with_playing_field_host(mut self, host: impl Into<String>) -> Self {
        self.playing_field_host = host.into();
        self
    }

    /// Set the number of runtime worker threads. Values below one are raised to one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Set the maximum log level.
    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }

    /// Set the registration connect and response timeouts.
    pub fn with_registration_timeouts(mut self, connect: Duration, response: Duration) -> Self {
        self.connect_timeout = connect;
        self.response_timeout = response;
        self
    }

    /// Set how long a round request may take before it is cancelled.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set how long shutdown waits for in-flight requests.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Certificate path prefix.
    pub fn certificate_path(&self) -> &Path {
        &self.certificate_path
    }

    /// Local listening port as configured.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether logs go to a file.
    pub fn log(&self) -> bool {
        self.log
    }

    /// Maximum log level.
    pub fn log_level(&self) -> Level {
        self.log_level
    }

    /// Runtime worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Shutdown grace period.
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: format!("'{value}': {e}"),
    })
}
