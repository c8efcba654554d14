//! # Request Resolver
//!
//! Turns `scheme://service-name/path` into `scheme://host:port/path`.
//!
//! Each resolution takes a fresh registry snapshot, asks the selector for one
//! instance and rewrites the authority. Nothing is cached between calls, so an
//! instance that left the registry is never chosen again.

use metrics::counter;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::error::{DispatchError, DispatchResult};
use crate::core::types::{ConcreteRequest, LogicalRequest, ServiceInstance};
use crate::discovery::InstanceRegistry;
use crate::load_balancing::InstanceSelector;

pub struct RequestResolver {
    registry: Arc<dyn InstanceRegistry>,
    selector: Arc<dyn InstanceSelector>,
}

impl RequestResolver {
    pub fn new(registry: Arc<dyn InstanceRegistry>, selector: Arc<dyn InstanceSelector>) -> Self {
        Self { registry, selector }
    }

    pub fn selector(&self) -> &Arc<dyn InstanceSelector> {
        &self.selector
    }

    /// Pick one instance for `service_name` from a fresh registry snapshot.
    ///
    /// The name is matched case-insensitively and every spelling shares one cursor.
    pub async fn choose_instance(&self, service_name: &str) -> DispatchResult<ServiceInstance> {
        let service_name = service_name.to_ascii_lowercase();
        let service_name = service_name.as_str();
        let instances = self.registry.list_instances(service_name).await.map_err(|e| {
            counter!("dispatch_resolution_failures_total", "reason" => "registry").increment(1);
            warn!(service = service_name, error = %e, "Registry query failed");
            match e {
                DispatchError::ResolutionTransport { .. } => e,
                other => DispatchError::resolution_transport(service_name, other.to_string()),
            }
        })?;

        if instances.is_empty() {
            counter!("dispatch_resolution_failures_total", "reason" => "no_instances").increment(1);
            warn!(service = service_name, "No instances available");
            return Err(DispatchError::no_instances(service_name));
        }

        let chosen = self
            .selector
            .choose(service_name, &instances)
            .cloned()
            .ok_or_else(|| DispatchError::no_instances(service_name))?;

        counter!("dispatch_resolutions_total", "algorithm" => self.selector.algorithm_name()).increment(1);
        Ok(chosen)
    }

    /// Bind a logical request to a concrete instance
    ///
    /// Fails with `InvalidRequest` when the authority is already a literal address;
    /// callers that accept both kinds go through the dispatch filter instead.
    pub async fn resolve(&self, request: LogicalRequest) -> DispatchResult<ConcreteRequest> {
        let service_name = request
            .logical_service_name()
            .ok_or_else(|| {
                DispatchError::invalid_request(format!(
                    "'{}' does not name a logical service",
                    request.uri
                ))
            })?;

        let instance = self.choose_instance(&service_name).await?;
        let concrete = ConcreteRequest::resolved(request, instance)?;

        debug!(
            request_id = concrete.id(),
            service = %service_name,
            uri = %concrete.uri(),
            "Resolved logical request"
        );
        Ok(concrete)
    }
}
