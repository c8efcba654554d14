//! # Demo Runners
//!
//! Three ways to call the same logical endpoint, one per call path:
//!
//! 1. [`ConfiguredClientRunner`]: a client that was built load-balanced
//! 2. [`FilterRunner`]: a plain transport wrapped by the dispatch layer per call
//! 3. [`ManualRunner`]: explicit resolution through the manual dispatcher
//!
//! All three share the stack's resolver, so consecutive runs walk the same
//! round-robin cursor.

use async_trait::async_trait;
use bytes::BytesMut;
use futures::TryStreamExt;
use std::sync::Arc;
use tower::Layer;
use tracing::warn;

use crate::core::config::DispatchConfig;
use crate::core::error::{DispatchError, DispatchResult};
use crate::core::types::LogicalRequest;
use crate::dispatch::{DispatchClient, DispatchLayer, DispatchObserver, DispatchStack, Exchange, ManualDispatcher, Transport};

#[async_trait]
pub trait DemoRunner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Call the endpoint once and return the body as text
    async fn run(&self) -> DispatchResult<String>;
}

pub struct ConfiguredClientRunner {
    client: DispatchClient,
    url: String,
}

impl ConfiguredClientRunner {
    pub fn new<S: Into<String>>(client: DispatchClient, url: S) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl DemoRunner for ConfiguredClientRunner {
    fn name(&self) -> &'static str {
        "ConfiguredClientRunner"
    }

    async fn run(&self) -> DispatchResult<String> {
        self.client.get(&self.url).text().await
    }
}

pub struct FilterRunner {
    transport: Arc<dyn Transport>,
    layer: DispatchLayer,
    url: String,
}

impl FilterRunner {
    pub fn new<S: Into<String>>(transport: Arc<dyn Transport>, layer: DispatchLayer, url: S) -> Self {
        Self {
            transport,
            layer,
            url: url.into(),
        }
    }
}

#[async_trait]
impl DemoRunner for FilterRunner {
    fn name(&self) -> &'static str {
        "FilterRunner"
    }

    async fn run(&self) -> DispatchResult<String> {
        let filter = Layer::layer(&self.layer, Arc::clone(&self.transport));
        let request = LogicalRequest::get(&self.url)?;

        let response = Exchange::exchange(&filter, request).await?;
        response.error_for_status()?.text().await
    }
}

pub struct ManualRunner {
    dispatcher: Arc<ManualDispatcher>,
    service_name: String,
    path: String,
}

impl ManualRunner {
    pub fn new<S: Into<String>, P: Into<String>>(dispatcher: Arc<ManualDispatcher>, service_name: S, path: P) -> Self {
        Self {
            dispatcher,
            service_name: service_name.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl DemoRunner for ManualRunner {
    fn name(&self) -> &'static str {
        "ManualRunner"
    }

    async fn run(&self) -> DispatchResult<String> {
        let body = self
            .dispatcher
            .dispatch_once(&self.service_name, &self.path)
            .await?
            .try_fold(BytesMut::new(), |mut buffer, chunk| async move {
                buffer.extend_from_slice(&chunk);
                Ok(buffer)
            })
            .await?;

        String::from_utf8(body.to_vec())
            .map_err(|e| DispatchError::transport(format!("Response body is not valid UTF-8: {}", e)))
    }
}

/// The three runners, wired against `stack` and targeting `config.demo`
pub fn standard_runners(stack: &DispatchStack, config: &DispatchConfig) -> Vec<Box<dyn DemoRunner>> {
    let url = config.demo.logical_url(&config.client.scheme);
    vec![
        Box::new(ConfiguredClientRunner::new(stack.client.clone(), url.clone())),
        Box::new(FilterRunner::new(Arc::clone(&stack.transport), stack.layer(), url)),
        Box::new(ManualRunner::new(
            Arc::clone(&stack.manual),
            config.demo.service_name.clone(),
            config.demo.path.clone(),
        )),
    ]
}

/// Run each runner once, in order, reporting outcomes to `observer`.
///
/// A failing runner does not stop the others.
pub async fn run_all(
    runners: &[Box<dyn DemoRunner>],
    observer: &dyn DispatchObserver,
) -> Vec<(&'static str, DispatchResult<String>)> {
    let mut outcomes = Vec::with_capacity(runners.len());
    for runner in runners {
        let result = runner.run().await;
        match &result {
            Ok(body) => observer.observe(runner.name(), body),
            Err(e) => {
                warn!(runner = runner.name(), error = %e, "Runner failed");
                observer.observe(runner.name(), &format!("failed: {}", e));
            }
        }
        outcomes.push((runner.name(), result));
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ClientResponse, ConcreteRequest, ServiceInstance};
    use crate::discovery::StaticRegistry;
    use crate::dispatch::RequestResolver;
    use crate::load_balancing::RoundRobinSelector;
    use bytes::Bytes;
    use http::StatusCode;

    /// Answers 200 with the target URI as the body
    struct EchoTransport;

    #[async_trait]
    impl Transport for EchoTransport {
        async fn send(&self, request: ConcreteRequest) -> DispatchResult<ClientResponse> {
            let uri = request.uri().clone();
            let body = Bytes::from(uri.to_string());
            Ok(ClientResponse::from_chunks(StatusCode::OK, uri, vec![body]))
        }
    }

    fn layer_for(instances: Vec<ServiceInstance>) -> DispatchLayer {
        let registry = StaticRegistry::new();
        registry.set_instances("api", instances);
        DispatchLayer::new(Arc::new(RequestResolver::new(
            Arc::new(registry),
            Arc::new(RoundRobinSelector::new()),
        )))
    }

    #[tokio::test]
    async fn test_filter_runner_resolves_through_layer() {
        let runner = FilterRunner::new(
            Arc::new(EchoTransport),
            layer_for(vec![
                ServiceInstance::new("api", "10.0.0.1", 8080),
                ServiceInstance::new("api", "10.0.0.2", 8080),
            ]),
            "http://api/greetings",
        );

        assert_eq!(runner.run().await.unwrap(), "http://10.0.0.1:8080/greetings");
        assert_eq!(runner.run().await.unwrap(), "http://10.0.0.2:8080/greetings");
    }

    #[tokio::test]
    async fn test_filter_runner_reports_missing_instances() {
        let runner = FilterRunner::new(Arc::new(EchoTransport), layer_for(Vec::new()), "http://api/greetings");
        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, DispatchError::NoInstancesAvailable { .. }));
    }
}
