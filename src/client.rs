//! Caller side of the round RPC, as used by the playing field.

use std::time::Duration;

use thiserror::Error;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::Status;
use tracing::trace;

use crate::decision::{OpponentSignal, OwnMove};
use crate::rpc;
use crate::wire::{HandleRequestRequest, HandleRequestResponse, UnknownEnumValue, HANDLE_REQUEST_PATH};

/// A round call failed.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The host and port do not form a usable URI, or the TLS settings were refused.
    #[error("invalid endpoint {uri}")]
    Endpoint {
        /// URI that was built.
        uri: String,
        /// Underlying error.
        source: tonic::transport::Error,
    },
    /// No connection could be established.
    #[error("could not connect to {uri}")]
    Connect {
        /// URI that was dialed.
        uri: String,
        /// Underlying error.
        source: tonic::transport::Error,
    },
    /// The agent answered with an error status.
    #[error(transparent)]
    Status(#[from] Status),
    /// The agent answered with a move this side does not know.
    #[error(transparent)]
    UnknownMove(#[from] UnknownEnumValue),
}

/// A connection to a strategy agent.
///
/// Cloning is cheap; clones share the underlying HTTP/2 connection.
#[derive(Debug, Clone)]
pub struct StrategyClient {
    channel: Channel,
}

impl StrategyClient {
    /// Connect to the agent at `host:port`, checking its certificate with `tls`.
    pub async fn connect(
        tls: ClientTlsConfig,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let uri = https_uri(host, port);
        let channel = endpoint(&uri, tls, timeout, timeout)
            .map_err(|source| ClientError::Endpoint {
                uri: uri.clone(),
                source,
            })?
            .connect()
            .await
            .map_err(|source| ClientError::Connect { uri, source })?;
        Ok(StrategyClient { channel })
    }

    /// Use an already configured channel.
    pub fn from_channel(channel: Channel) -> Self {
        StrategyClient { channel }
    }

    /// Report the opponent's last move and get the agent's next one.
    pub async fn handle_request(&self, signal: OpponentSignal) -> Result<OwnMove, ClientError> {
        self.send_raw(signal.into()).await
    }

    /// Same as [`handle_request`](Self::handle_request) with an unchecked signal value.
    pub async fn send_raw(&self, opponent_action: i32) -> Result<OwnMove, ClientError> {
        let response: HandleRequestResponse = rpc::unary(
            self.channel.clone(),
            HANDLE_REQUEST_PATH,
            HandleRequestRequest { opponent_action },
        )
        .await?;
        trace!(player_action = response.player_action, "reply received");
        Ok(OwnMove::try_from(response.player_action)?)
    }

    /// The underlying channel, for calls this client does not wrap.
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }
}

/// `https://host:port`, bracketing IPv6 literals.
pub(crate) fn https_uri(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    }
}

/// A TLS endpoint for `uri` with its connect and per-call timeouts.
pub(crate) fn endpoint(
    uri: &str,
    tls: ClientTlsConfig,
    connect_timeout: Duration,
    timeout: Duration,
) -> Result<Endpoint, tonic::transport::Error> {
    Ok(Endpoint::from_shared(uri.to_owned())?
        .tls_config(tls)?
        .connect_timeout(connect_timeout)
        .timeout(timeout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uris() {
        assert_eq!(https_uri("localhost", 50051), "https://localhost:50051");
        assert_eq!(https_uri("127.0.0.1", 1), "https://127.0.0.1:1");
        assert_eq!(https_uri("::1", 443), "https://[::1]:443");
        assert_eq!(https_uri("[::1]", 443), "https://[::1]:443");
    }

    #[test]
    fn malformed_hosts_are_refused() {
        let tls = ClientTlsConfig::new();
        assert!(endpoint(
            &https_uri("bad host", 1),
            tls,
            Duration::from_secs(1),
            Duration::from_secs(1)
        )
        .is_err());
    }

    #[tokio::test]
    async fn refused_connections_name_the_uri() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = StrategyClient::connect(
            ClientTlsConfig::new().domain_name("localhost"),
            "127.0.0.1",
            port,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }), "{err:?}");
        assert_eq!(err.to_string(), format!("could not connect to https://127.0.0.1:{port}"));
    }
}
