//! # Manual Dispatcher
//!
//! The explicit path: ask the resolver for an instance, build the URL by hand,
//! send it, and hand the body stream back. Same resolver and selector as the
//! filter, so both paths share one round-robin cursor per service.

use http::Method;
use std::sync::Arc;
use tracing::info;

use crate::core::error::DispatchResult;
use crate::core::types::{BodyStream, ConcreteRequest, LogicalRequest};
use crate::dispatch::observer::{DispatchObserver, NoopObserver};
use crate::dispatch::resolver::RequestResolver;
use crate::dispatch::transport::Transport;

pub struct ManualDispatcher {
    resolver: Arc<RequestResolver>,
    transport: Arc<dyn Transport>,
    scheme: String,
    observer: Arc<dyn DispatchObserver>,
}

impl ManualDispatcher {
    pub fn new(resolver: Arc<RequestResolver>, transport: Arc<dyn Transport>) -> Self {
        Self {
            resolver,
            transport,
            scheme: "http".to_string(),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_scheme<S: Into<String>>(mut self, scheme: S) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Report every built URL to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// GET `path` on one instance of `service_name` and return the body stream.
    ///
    /// Fails on resolution errors, send errors, and non-2xx statuses. The body is
    /// not read here; dropping the stream cancels it.
    pub async fn dispatch_once(&self, service_name: &str, path: &str) -> DispatchResult<BodyStream> {
        let instance = self.resolver.choose_instance(service_name).await?;
        let url = instance.url(&self.scheme, path)?;

        info!(service = service_name, url = %url, "Manual dispatch");
        self.observer.observe("ManualDispatcher", &url.to_string());

        let request = ConcreteRequest::resolved(LogicalRequest::new(Method::GET, url)?, instance)?;
        let response = self.transport.send(request).await?.error_for_status()?;
        Ok(response.into_body())
    }
}
