//! Startup sequence of an agent process.
//!
//! The order is fixed and every step must succeed before the next one runs:
//!
//! 1. load the TLS material (nothing is bound yet)
//! 2. bind the round RPC listener
//! 3. register with the playing field; on failure the listener is closed
//! 4. accept round requests until [`RunningAgent::shutdown`]
//!
//! Everything runs on the caller's tokio runtime.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, instrument};

use crate::configuration::{ConfigError, Configuration};
use crate::decision::{GrimTrigger, Strategy};
use crate::registration::{public_address, RegistrationClient, RegistrationError};
use crate::server::{Server, ServerHandle};
use crate::service::AgentService;
use crate::tls::{TlsError, TlsMaterial};

/// A fatal startup failure. The process must not serve traffic after one.
#[derive(Error, Debug)]
pub enum StartupError {
    /// Missing or malformed setting.
    #[error("configuration error")]
    Config(#[from] ConfigError),
    /// Certificate or key unusable.
    #[error("certificate error")]
    Tls(#[from] TlsError),
    /// The listener could not be bound.
    #[error("could not listen on {addr}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        source: io::Error,
    },
    /// The transport refused to start.
    #[error("could not start serving")]
    Serve(#[source] tonic::transport::Error),
    /// The playing field could not be reached or refused the agent.
    #[error("registration failed")]
    Registration(#[from] RegistrationError),
}

/// A registered agent serving round requests.
#[derive(Debug)]
pub struct RunningAgent<S: Strategy = GrimTrigger> {
    service: Arc<AgentService<S>>,
    server: ServerHandle,
    name: String,
    address: String,
    grace: Duration,
}

impl<S: Strategy> RunningAgent<S> {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Name announced to the playing field.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address announced to the playing field.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The service answering round requests.
    pub fn service(&self) -> &Arc<AgentService<S>> {
        &self.service
    }

    /// Stop serving, waiting for in-flight requests up to the configured grace period.
    ///
    /// Returns `true` when every in-flight request completed in time.
    pub async fn shutdown(self) -> bool {
        let grace = self.grace;
        self.shutdown_with(grace).await
    }

    /// Same as [`shutdown`](Self::shutdown) with an explicit grace period.
    pub async fn shutdown_with(self, grace: Duration) -> bool {
        info!(name = %self.name, "shutting down");
        self.server.shutdown(grace).await
    }
}

/// Run the startup sequence with the grim-trigger strategy.
pub async fn start_friedman(
    config: &Configuration,
) -> Result<RunningAgent<GrimTrigger>, StartupError> {
    start(config, GrimTrigger::new()).await
}

/// Run the startup sequence for `strategy`.
///
/// # Errors
/// See [`StartupError`]. When registration fails the listener is closed before returning.
#[instrument(skip_all)]
pub async fn start<S: Strategy + 'static>(
    config: &Configuration,
    strategy: S,
) -> Result<RunningAgent<S>, StartupError> {
    let material = TlsMaterial::load(&config.certificate_path)?;

    let service = Arc::new(AgentService::new(strategy));
    let addrs = bind_addrs(config.bind_ip, config.port);
    let bound = Server::new(service.clone(), material.server_tls())
        .with_request_timeout(config.request_timeout)
        .bind(&addrs)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addrs[0],
            source,
        })?;

    let name = config.agent_name.clone().unwrap_or_else(|| service.name());
    let address = public_address(&config.public_host, bound.local_addr().port());

    let registration = RegistrationClient::new(
        material.client_tls(&config.playing_field_host),
        config.playing_field_host.clone(),
        config.playing_field_port,
    )
    .with_timeouts(config.connect_timeout, config.response_timeout);

    if let Err(e) = registration.register(&name, &address).await {
        error!("{e}");
        // closes the listener
        drop(bound);
        return Err(e.into());
    }

    let server = bound.serve().map_err(StartupError::Serve)?;

    info!(%name, %address, "ready");
    Ok(RunningAgent {
        service,
        server,
        name,
        address,
        grace: config.shutdown_grace,
    })
}

/// Addresses tried in order for `ip`. The IPv6 wildcard falls back to the IPv4 one on hosts
/// without IPv6.
fn bind_addrs(ip: IpAddr, port: u16) -> Vec<SocketAddr> {
    let mut addrs = vec![SocketAddr::new(ip, port)];
    if ip.is_ipv6() && ip.is_unspecified() {
        addrs.push(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    addrs
}
