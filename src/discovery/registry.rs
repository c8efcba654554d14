//! # Instance Registry
//!
//! The registry answers one question: which instances currently serve a given
//! logical name? Every call returns a fresh snapshot; nothing above this layer
//! caches the answer across resolutions.
//!
//! ## Rust Concepts Used
//!
//! - `async_trait` so backends that talk to a network service can suspend
//! - `DashMap` for lock-sharded concurrent reads while a reload swaps entries
//! - `tokio::sync::broadcast` to announce changes to interested tasks

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::core::config::DiscoveryConfig;
use crate::core::error::DispatchResult;
use crate::core::types::ServiceInstance;

/// Source of instance sets for logical service names
///
/// An unknown name is not an error: implementations return an empty set and let
/// the resolver decide. An `Err` means the registry itself could not be asked.
#[async_trait]
pub trait InstanceRegistry: Send + Sync {
    /// Current instances registered under `service_name`
    async fn list_instances(&self, service_name: &str) -> DispatchResult<Vec<ServiceInstance>>;
}

/// Registry change event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChangeEvent {
    /// The instance list of one service was set
    InstancesUpdated { service: String, count: usize },
    /// A service was removed entirely
    ServiceRemoved(String),
    /// The whole registry was re-seeded from configuration
    Reseeded { services: usize },
}

pub type RegistryChangeReceiver = broadcast::Receiver<RegistryChangeEvent>;

/// In-memory registry seeded from configuration
///
/// The moral equivalent of a "simple discovery" block in an application
/// config file: a fixed list of `uri`s per service that can be swapped at
/// runtime when the file is reloaded. Names are stored and looked up lowercased.
pub struct StaticRegistry {
    services: DashMap<String, Vec<ServiceInstance>>,
    change_sender: broadcast::Sender<RegistryChangeEvent>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        let (change_sender, _) = broadcast::channel(64);
        Self {
            services: DashMap::new(),
            change_sender,
        }
    }

    /// Build a registry from the `discovery` section of the configuration
    pub fn from_config(config: &DiscoveryConfig) -> DispatchResult<Self> {
        let registry = Self::new();
        registry.replace_from_config(config)?;
        Ok(registry)
    }

    /// Replace every entry with the instances in `config`.
    ///
    /// The new set is parsed in full before anything is touched, so a bad entry
    /// leaves the previous contents in place.
    pub fn replace_from_config(&self, config: &DiscoveryConfig) -> DispatchResult<()> {
        let parsed = config.instances()?;

        let parsed: HashMap<String, Vec<ServiceInstance>> = parsed
            .into_iter()
            .map(|(name, instances)| (name.to_ascii_lowercase(), instances))
            .collect();

        self.services.retain(|name, _| parsed.contains_key(name));
        let count = parsed.len();
        for (name, instances) in parsed {
            debug!(service = %name, instances = instances.len(), "Seeding service");
            self.services.insert(name, instances);
        }

        info!(services = count, "Static registry re-seeded");
        let _ = self.change_sender.send(RegistryChangeEvent::Reseeded { services: count });
        Ok(())
    }

    /// Set the instance list for one service, replacing what was there
    pub fn set_instances<S: Into<String>>(&self, service_name: S, instances: Vec<ServiceInstance>) {
        let service = service_name.into().to_ascii_lowercase();
        let count = instances.len();
        self.services.insert(service.clone(), instances);
        let _ = self
            .change_sender
            .send(RegistryChangeEvent::InstancesUpdated { service, count });
    }

    /// Forget a service. Returns the instances it had.
    pub fn remove_service(&self, service_name: &str) -> Option<Vec<ServiceInstance>> {
        let service = service_name.to_ascii_lowercase();
        let removed = self.services.remove(&service).map(|(_, instances)| instances);
        if removed.is_some() {
            let _ = self.change_sender.send(RegistryChangeEvent::ServiceRemoved(service));
        }
        removed
    }

    /// Registered service names, sorted
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Instance counts per service
    pub fn stats(&self) -> HashMap<String, usize> {
        self.services
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().len()))
            .collect()
    }

    pub fn watch_changes(&self) -> RegistryChangeReceiver {
        self.change_sender.subscribe()
    }
}

impl Default for StaticRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstanceRegistry for StaticRegistry {
    async fn list_instances(&self, service_name: &str) -> DispatchResult<Vec<ServiceInstance>> {
        Ok(self
            .services
            .get(&service_name.to_ascii_lowercase())
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}
