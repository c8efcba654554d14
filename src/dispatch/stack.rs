//! Explicit wiring of the dispatch components, done once at process start.

use std::sync::Arc;
use tracing::info;

use crate::core::config::DispatchConfig;
use crate::core::error::DispatchResult;
use crate::discovery::StaticRegistry;
use crate::dispatch::client::DispatchClient;
use crate::dispatch::filter::DispatchLayer;
use crate::dispatch::manual::ManualDispatcher;
use crate::dispatch::observer::DispatchObserver;
use crate::dispatch::resolver::RequestResolver;
use crate::dispatch::transport::{ReqwestTransport, Transport};

/// Every component a caller needs, sharing one registry and one selector
pub struct DispatchStack {
    pub registry: Arc<StaticRegistry>,
    pub resolver: Arc<RequestResolver>,
    pub transport: Arc<dyn Transport>,
    /// Load-balanced client: logical names are resolved
    pub client: DispatchClient,
    /// Plain client: URLs are sent as written
    pub plain_client: DispatchClient,
    pub manual: Arc<ManualDispatcher>,
}

impl DispatchStack {
    /// Wire the stack with a `reqwest` transport built from `config.client`
    pub fn from_config(config: &DispatchConfig, observer: Arc<dyn DispatchObserver>) -> DispatchResult<Self> {
        let transport = ReqwestTransport::from_config(&config.client)?;
        Self::with_transport(config, Arc::new(transport), observer)
    }

    /// Wire the stack around any transport
    pub fn with_transport(
        config: &DispatchConfig,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn DispatchObserver>,
    ) -> DispatchResult<Self> {
        let registry = Arc::new(StaticRegistry::from_config(&config.discovery)?);
        let selector = config.selection.build();
        let resolver = Arc::new(RequestResolver::new(registry.clone(), selector));

        let client = DispatchClient::load_balanced(Arc::clone(&transport), Arc::clone(&resolver));
        let plain_client = DispatchClient::direct(Arc::clone(&transport));
        let manual = ManualDispatcher::new(Arc::clone(&resolver), Arc::clone(&transport))
            .with_scheme(config.client.scheme.clone())
            .with_observer(observer);

        info!(
            services = ?registry.service_names(),
            algorithm = resolver.selector().algorithm_name(),
            "Dispatch stack wired"
        );

        Ok(Self {
            registry,
            resolver,
            transport,
            client,
            plain_client,
            manual: Arc::new(manual),
        })
    }

    /// A layer sharing this stack's resolver, for wrapping further transports
    pub fn layer(&self) -> DispatchLayer {
        DispatchLayer::new(Arc::clone(&self.resolver))
    }
}
