//! gRPC plumbing for the two services of the protocol.
//!
//! [`StrategyServer`] exposes an [`AgentService`] as `strategy.Strategy`. [`PlayingFieldServer`]
//! exposes any [`PlayingField`] implementation as `playing_field.PlayingField`, which is what
//! a coordinator written against this crate (or a test double) serves. Both are plain tower
//! services routed by path, so they plug into `tonic::transport::Server::add_service`.
//!
//! [`unary`] is the client half shared by the round client and the registration client.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use prost::Message;
use tonic::body::BoxBody;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::codegen::{empty_body, http, Body, BoxFuture, Service, StdError};
use tonic::server::{Grpc, NamedService, UnaryService};
use tonic::transport::Channel;
use tonic::Status;

use crate::decision::Strategy;
use crate::service::AgentService;
use crate::wire::{
    HandleRequestRequest, HandleRequestResponse, StrategyInfo, SubscribeResponse,
    HANDLE_REQUEST_PATH, PLAYING_FIELD_SERVICE, STRATEGY_SERVICE, SUBSCRIBE_PATH,
};

/// `strategy.Strategy` backed by an [`AgentService`].
pub struct StrategyServer<S: Strategy> {
    service: Arc<AgentService<S>>,
}

impl<S: Strategy> StrategyServer<S> {
    /// Route round requests to `service`.
    pub fn new(service: Arc<AgentService<S>>) -> Self {
        StrategyServer { service }
    }
}

impl<S: Strategy> Clone for StrategyServer<S> {
    fn clone(&self) -> Self {
        StrategyServer {
            service: self.service.clone(),
        }
    }
}

impl<S: Strategy> NamedService for StrategyServer<S> {
    const NAME: &'static str = STRATEGY_SERVICE;
}

impl<S, B> Service<http::Request<B>> for StrategyServer<S>
where
    S: Strategy + 'static,
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        match req.uri().path() {
            HANDLE_REQUEST_PATH => {
                let method = HandleRequestMethod(self.service.clone());
                Box::pin(async move {
                    let mut grpc = Grpc::new(ProstCodec::default());
                    Ok(grpc.unary(method, req).await)
                })
            }
            _ => Box::pin(async move { Ok(unimplemented()) }),
        }
    }
}

struct HandleRequestMethod<S: Strategy>(Arc<AgentService<S>>);

impl<S: Strategy + 'static> UnaryService<HandleRequestRequest> for HandleRequestMethod<S> {
    type Response = HandleRequestResponse;
    type Future = BoxFuture<tonic::Response<HandleRequestResponse>, Status>;

    fn call(&mut self, request: tonic::Request<HandleRequestRequest>) -> Self::Future {
        let service = self.0.clone();
        Box::pin(async move {
            service
                .handle_request(request.into_inner())
                .map(tonic::Response::new)
        })
    }
}

/// Coordinator side of the registration handshake.
pub trait PlayingField: Send + Sync + 'static {
    /// Accept or refuse the agent described by `info`.
    fn subscribe(&self, info: StrategyInfo) -> Result<SubscribeResponse, Status>;
}

/// `playing_field.PlayingField` backed by a [`PlayingField`] implementation.
pub struct PlayingFieldServer<P> {
    inner: Arc<P>,
}

impl<P: PlayingField> PlayingFieldServer<P> {
    /// Route `Subscribe` calls to `inner`.
    pub fn new(inner: P) -> Self {
        PlayingFieldServer {
            inner: Arc::new(inner),
        }
    }
}

impl<P> Clone for PlayingFieldServer<P> {
    fn clone(&self) -> Self {
        PlayingFieldServer {
            inner: self.inner.clone(),
        }
    }
}

impl<P: PlayingField> NamedService for PlayingFieldServer<P> {
    const NAME: &'static str = PLAYING_FIELD_SERVICE;
}

impl<P, B> Service<http::Request<B>> for PlayingFieldServer<P>
where
    P: PlayingField,
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        match req.uri().path() {
            SUBSCRIBE_PATH => {
                let method = SubscribeMethod(self.inner.clone());
                Box::pin(async move {
                    let mut grpc = Grpc::new(ProstCodec::default());
                    Ok(grpc.unary(method, req).await)
                })
            }
            _ => Box::pin(async move { Ok(unimplemented()) }),
        }
    }
}

struct SubscribeMethod<P>(Arc<P>);

impl<P: PlayingField> UnaryService<StrategyInfo> for SubscribeMethod<P> {
    type Response = SubscribeResponse;
    type Future = BoxFuture<tonic::Response<SubscribeResponse>, Status>;

    fn call(&mut self, request: tonic::Request<StrategyInfo>) -> Self::Future {
        let inner = self.0.clone();
        Box::pin(async move { inner.subscribe(request.into_inner()).map(tonic::Response::new) })
    }
}

/// Trailers-only answer for a route this server does not know.
fn unimplemented() -> http::Response<BoxBody> {
    let mut response = http::Response::new(empty_body());
    let headers = response.headers_mut();
    headers.insert(
        "grpc-status",
        http::HeaderValue::from(tonic::Code::Unimplemented as i32),
    );
    headers.insert(
        http::header::CONTENT_TYPE,
        tonic::metadata::GRPC_CONTENT_TYPE,
    );
    response
}

/// Issue one unary call on `channel` and return the decoded body.
pub async fn unary<Req, Resp>(
    channel: Channel,
    path: &'static str,
    request: Req,
) -> Result<Resp, Status>
where
    Req: Message + Send + Sync + 'static,
    Resp: Message + Default + Send + Sync + 'static,
{
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| Status::unavailable(format!("service was not ready: {e}")))?;
    let response = grpc
        .unary(
            tonic::Request::new(request),
            PathAndQuery::from_static(path),
            ProstCodec::default(),
        )
        .await?;
    Ok(response.into_inner())
}
