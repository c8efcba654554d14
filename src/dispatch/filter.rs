//! # Dispatch Filter
//!
//! A decorator over a [`Transport`]. Every outgoing request passes through
//! [`DispatchFilter::exchange`]:
//!
//! - logical authority (`http://api/...`): resolve once, then send to the chosen
//!   instance
//! - literal authority (`http://10.0.0.1:8080/...`): send untouched
//!
//! Resolution failure fails the call before the inner transport is touched. There
//! is no retry and no address cache; the response comes back exactly as the
//! transport produced it, body still streaming.
//!
//! The filter is also a `tower::Service<LogicalRequest>`, and [`DispatchLayer`]
//! wraps any transport in it through `ServiceBuilder`.

use async_trait::async_trait;
use futures::future::BoxFuture;
use metrics::counter;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, info, warn};

use crate::core::error::{DispatchError, DispatchResult};
use crate::core::types::{ClientResponse, ConcreteRequest, LogicalRequest};
use crate::dispatch::resolver::RequestResolver;
use crate::dispatch::transport::Transport;

/// Executes a caller-level request end to end
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn exchange(&self, request: LogicalRequest) -> DispatchResult<ClientResponse>;
}

/// No resolution at all: every authority goes to the transport as written
pub struct Direct<T> {
    inner: T,
}

impl<T: Transport> Direct<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: Transport> Exchange for Direct<T> {
    async fn exchange(&self, request: LogicalRequest) -> DispatchResult<ClientResponse> {
        self.inner.send(ConcreteRequest::pass_through(request)).await
    }
}

/// Load-balancing decorator over a transport
pub struct DispatchFilter<T> {
    inner: Arc<T>,
    resolver: Arc<RequestResolver>,
}

impl<T> Clone for DispatchFilter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            resolver: Arc::clone(&self.resolver),
        }
    }
}

impl<T: Transport> DispatchFilter<T> {
    pub fn new(inner: T, resolver: Arc<RequestResolver>) -> Self {
        Self {
            inner: Arc::new(inner),
            resolver,
        }
    }

    pub fn resolver(&self) -> &Arc<RequestResolver> {
        &self.resolver
    }
}

#[async_trait]
impl<T: Transport> Exchange for DispatchFilter<T> {
    async fn exchange(&self, request: LogicalRequest) -> DispatchResult<ClientResponse> {
        if request.logical_service_name().is_none() {
            counter!("dispatch_pass_through_total").increment(1);
            debug!(request_id = %request.id, uri = %request.uri, "Literal authority, passing through");
            return self.inner.send(ConcreteRequest::pass_through(request)).await;
        }

        let concrete = self.resolver.resolve(request).await?;
        let request_id = concrete.id().to_string();
        let instance = concrete
            .instance()
            .map(|instance| instance.instance_id())
            .unwrap_or_default();

        match self.inner.send(concrete).await {
            Ok(response) => {
                info!(
                    request_id = %request_id,
                    instance = %instance,
                    status = response.status().as_u16(),
                    "Dispatched request"
                );
                Ok(response)
            }
            Err(e) => {
                warn!(request_id = %request_id, instance = %instance, error = %e, "Dispatch failed");
                Err(e)
            }
        }
    }
}

impl<T> Service<LogicalRequest> for DispatchFilter<T>
where
    T: Transport + 'static,
{
    type Response = ClientResponse;
    type Error = DispatchError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: LogicalRequest) -> Self::Future {
        let filter = self.clone();
        Box::pin(async move { filter.exchange(request).await })
    }
}

/// Layer that wraps a transport in a [`DispatchFilter`]
#[derive(Clone)]
pub struct DispatchLayer {
    resolver: Arc<RequestResolver>,
}

impl DispatchLayer {
    pub fn new(resolver: Arc<RequestResolver>) -> Self {
        Self { resolver }
    }
}

impl<T: Transport> Layer<T> for DispatchLayer {
    type Service = DispatchFilter<T>;

    fn layer(&self, inner: T) -> Self::Service {
        DispatchFilter::new(inner, Arc::clone(&self.resolver))
    }
}
