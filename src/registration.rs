//! One-shot registration with the playing field.
//!
//! The agent announces its name and public address through the playing field's `Subscribe`
//! operation. Anything but an `OK` acknowledgement is fatal: there is no retry, restarting the
//! process is left to whatever supervises it.

use std::time::Duration;

use thiserror::Error;
use tonic::transport::ClientTlsConfig;
use tonic::{Code, Status};
use tracing::{info, instrument};

use crate::client::{endpoint, https_uri};
use crate::rpc;
use crate::wire::{StrategyInfo, SubscribeResponse, SUBSCRIBE_PATH};

/// Registration did not succeed.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// The playing field host does not form a usable URI.
    #[error("invalid playing field address {uri}")]
    Endpoint {
        /// URI that was built.
        uri: String,
        /// Underlying error.
        source: tonic::transport::Error,
    },
    /// No connection could be established, TLS verification included.
    #[error("could not reach the playing field at {uri}")]
    Connect {
        /// URI that was dialed.
        uri: String,
        /// Underlying error.
        source: tonic::transport::Error,
    },
    /// The call itself failed with a gRPC status.
    #[error("failed to subscribe to the playing field ({}): {}", .0.code(), .0.message())]
    Failed(Status),
    /// The playing field answered with a non-`OK` code.
    #[error("failed to subscribe to the playing field ({code}): {details}")]
    Rejected {
        /// Code returned by the playing field.
        code: Code,
        /// Failure detail returned by the playing field.
        details: String,
    },
}

/// Base address announced for an agent, e.g. `https://localhost:50051`.
pub fn public_address(host: &str, port: u16) -> String {
    https_uri(host, port)
}

/// Client side of the playing field's `Subscribe` operation.
#[derive(Debug, Clone)]
pub struct RegistrationClient {
    tls: ClientTlsConfig,
    host: String,
    port: u16,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl RegistrationClient {
    /// A client for the playing field at `host:port`. `tls` must trust its certificate.
    pub fn new(tls: ClientTlsConfig, host: impl Into<String>, port: u16) -> Self {
        RegistrationClient {
            tls,
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(10),
        }
    }

    /// Set the connect and response timeouts.
    pub fn with_timeouts(mut self, connect: Duration, response: Duration) -> Self {
        self.connect_timeout = connect;
        self.response_timeout = response;
        self
    }

    /// Announce `name` reachable at `address`.
    ///
    /// # Errors
    /// Any transport failure, an error status, or an acknowledgement whose code is not `OK`.
    /// The error message carries the playing field's details.
    #[instrument(skip(self), fields(playing_field = %https_uri(&self.host, self.port)))]
    pub async fn register(
        &self,
        name: &str,
        address: &str,
    ) -> Result<SubscribeResponse, RegistrationError> {
        let uri = https_uri(&self.host, self.port);
        let channel = endpoint(
            &uri,
            self.tls.clone(),
            self.connect_timeout,
            self.response_timeout,
        )
        .map_err(|source| RegistrationError::Endpoint {
            uri: uri.clone(),
            source,
        })?
        .connect()
        .await
        .map_err(|source| RegistrationError::Connect { uri, source })?;

        let info = StrategyInfo {
            name: name.to_owned(),
            address: address.to_owned(),
        };
        let response: SubscribeResponse = rpc::unary(channel, SUBSCRIBE_PATH, info)
            .await
            .map_err(RegistrationError::Failed)?;

        let code = response.status_code();
        if code != Code::Ok {
            return Err(RegistrationError::Rejected {
                code,
                details: response.details,
            });
        }

        info!("subscribed to the playing field");
        Ok(response)
    }
}
