//! gRPC front end of the [`AgentService`].
//!
//! A [`Server`] binds one listener; once told to [`serve`](BoundServer::serve) it runs a tonic
//! server on the current tokio runtime, answering `strategy.Strategy` over TLS. Every
//! connection is driven by its own task, so silent or slow peers hold no resources other
//! connections need. Peers that do not speak TLS fail the handshake and are dropped without
//! an answer.
//!
//! [`ServerHandle::shutdown`] stops accepting, tells connected peers to go away, and gives
//! in-flight requests a grace period before the remaining connections are cut.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::ServerTlsConfig;
use tracing::{debug, info, instrument, warn};

use crate::decision::Strategy;
use crate::rpc::StrategyServer;
use crate::service::AgentService;

/// Builder for the round RPC server.
pub struct Server<S: Strategy> {
    service: Arc<AgentService<S>>,
    tls: ServerTlsConfig,
    request_timeout: Duration,
}

impl<S: Strategy + 'static> Server<S> {
    /// A server for `service`, presenting the identity of `tls`.
    ///
    /// Defaults to a 10s request timeout.
    pub fn new(service: Arc<AgentService<S>>, tls: ServerTlsConfig) -> Self {
        Server {
            service,
            tls,
            request_timeout: Duration::from_secs(10),
        }
    }

    /// How long one round request may take before it is cancelled.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bind the first of `addrs` that can be bound. Nothing is accepted until
    /// [`BoundServer::serve`] is called; connections arriving before that wait in the listen
    /// backlog.
    pub async fn bind(self, addrs: &[SocketAddr]) -> io::Result<BoundServer<S>> {
        let listener = TcpListener::bind(addrs).await?;
        let local_addr = listener.local_addr()?;
        debug!(%local_addr, "bound");
        Ok(BoundServer {
            server: self,
            listener,
            local_addr,
        })
    }
}

/// A bound listener that does not accept connections yet. Dropping it closes the listener.
pub struct BoundServer<S: Strategy> {
    server: Server<S>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl<S: Strategy + 'static> BoundServer<S> {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start answering round requests on a background task.
    ///
    /// # Errors
    /// The TLS identity was refused by the transport.
    #[instrument(skip(self), fields(local_addr = %self.local_addr))]
    pub fn serve(self) -> Result<ServerHandle, tonic::transport::Error> {
        let BoundServer {
            server,
            listener,
            local_addr,
        } = self;

        let mut builder = tonic::transport::Server::builder()
            .tls_config(server.tls)?
            .timeout(server.request_timeout);
        let router = builder.add_service(StrategyServer::new(server.service));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let incoming = TcpListenerStream::new(listener);
        let join = tokio::spawn(async move {
            let signal = async {
                let _ = shutdown_rx.await;
                debug!("stopped accepting");
            };
            if let Err(e) = router.serve_with_incoming_shutdown(incoming, signal).await {
                warn!("server error: {e}");
            }
        });

        info!("listening");
        Ok(ServerHandle {
            local_addr,
            shutdown: Some(shutdown_tx),
            join,
        })
    }
}

/// A running server. Dropping it starts a graceful shutdown without waiting for it.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close the listener, wait up to `grace` for in-flight requests.
    ///
    /// Returns `false` when the grace period ran out and the remaining connections were cut.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        self.stop_accepting();

        match tokio::time::timeout(grace, &mut self.join).await {
            Ok(_) => {
                info!("server stopped");
                true
            }
            Err(_) => {
                warn!(?grace, "grace period elapsed, closing remaining connections");
                self.join.abort();
                false
            }
        }
    }

    fn stop_accepting(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // the serve task already ended if nobody listens
            let _ = shutdown.send(());
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop_accepting();
    }
}
