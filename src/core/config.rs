//! # Configuration Module
//!
//! This module handles configuration management with hot reloading capabilities.
//! It provides the configuration structures for the dispatcher and the loading
//! mechanisms around them.
//!
//! ## Key Features
//! - YAML/JSON configuration parsing with serde
//! - Environment variable override support (`DISPATCH_<SECTION>_<FIELD>`)
//! - Hot reloading using file system watchers
//! - Validation that reports every problem at once
//!
//! ## Example
//!
//! ```yaml
//! client:
//!   connect_timeout: "2s"
//!   request_timeout: "10s"
//! selection: round_robin
//! discovery:
//!   services:
//!     api:
//!       - uri: "http://10.0.0.1:8080"
//!       - uri: "http://10.0.0.2:8080"
//!         metadata:
//!           zone: "b"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use notify::{Event, EventKind, RecursiveMode, Watcher, recommended_watcher};
use tokio::sync::{RwLock, broadcast};
use url::Url;

use crate::core::error::{DispatchError, DispatchResult};
use crate::core::types::ServiceInstance;
use crate::load_balancing::SelectionPolicy;

/// Complete configuration for the dispatcher and its demo binaries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Outgoing HTTP client settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Instance selection policy
    #[serde(default)]
    pub selection: SelectionPolicy,

    /// Static service instances
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Logging settings
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Target of the demo runners
    #[serde(default)]
    pub demo: DemoConfig,

    /// Where the greetings API listens
    #[serde(default)]
    pub api: ApiConfig,
}

impl DispatchConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> DispatchResult<Self> {
        let content = tokio::fs::read_to_string(path).await
            .map_err(|e| DispatchError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: DispatchConfig = serde_yaml::from_str(&content)
            .map_err(|e| DispatchError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON
    pub async fn load_from_json<P: AsRef<Path>>(path: P) -> DispatchResult<Self> {
        let content = tokio::fs::read_to_string(path).await
            .map_err(|e| DispatchError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: DispatchConfig = serde_json::from_str(&content)
            .map_err(|e| DispatchError::config(format!("Failed to parse JSON config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load by file extension: `.json` is JSON, anything else YAML
    pub async fn load<P: AsRef<Path>>(path: P) -> DispatchResult<Self> {
        let path = path.as_ref();
        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            Self::load_from_json(path).await
        } else {
            Self::load_from_file(path).await
        }
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> DispatchResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    ///
    /// Variables follow the pattern `DISPATCH_<SECTION>_<FIELD>`, for example
    /// `DISPATCH_CLIENT_REQUEST_TIMEOUT=5s`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> DispatchResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(timeout) = lookup("DISPATCH_CLIENT_CONNECT_TIMEOUT") {
            self.client.connect_timeout = humantime::parse_duration(&timeout)
                .map_err(|e| DispatchError::config(format!("Invalid DISPATCH_CLIENT_CONNECT_TIMEOUT: {}", e)))?;
        }

        if let Some(timeout) = lookup("DISPATCH_CLIENT_REQUEST_TIMEOUT") {
            self.client.request_timeout = humantime::parse_duration(&timeout)
                .map_err(|e| DispatchError::config(format!("Invalid DISPATCH_CLIENT_REQUEST_TIMEOUT: {}", e)))?;
        }

        if let Some(policy) = lookup("DISPATCH_SELECTION_POLICY") {
            self.selection = match policy.to_lowercase().as_str() {
                "round_robin" => SelectionPolicy::RoundRobin,
                "random" => SelectionPolicy::Random,
                other => {
                    return Err(DispatchError::config(format!(
                        "Invalid DISPATCH_SELECTION_POLICY: {}",
                        other
                    )))
                }
            };
        }

        if let Some(level) = lookup("DISPATCH_LOG_LEVEL") {
            self.observability.logging.level = level;
        }

        if let Some(format) = lookup("DISPATCH_LOG_FORMAT") {
            self.observability.logging.format = format;
        }

        if let Some(addr) = lookup("DISPATCH_API_BIND_ADDRESS") {
            self.api.bind_address = addr;
        }

        if let Some(port) = lookup("DISPATCH_API_PORT") {
            self.api.port = port.parse()
                .map_err(|e| DispatchError::config(format!("Invalid DISPATCH_API_PORT: {}", e)))?;
        }

        Ok(())
    }

    /// Validate the configuration, reporting every problem found
    pub fn validate(&self) -> DispatchResult<()> {
        let mut errors = Vec::new();

        if self.client.connect_timeout.is_zero() {
            errors.push("client.connect_timeout must be greater than 0".to_string());
        }

        if self.client.request_timeout.is_zero() {
            errors.push("client.request_timeout must be greater than 0".to_string());
        }

        match self.client.scheme.as_str() {
            "http" | "https" => {}
            other => errors.push(format!("client.scheme must be http or https, got: {}", other)),
        }

        for (name, instances) in &self.discovery.services {
            if name.is_empty() {
                errors.push("discovery service name cannot be empty".to_string());
            }
            if name.contains(':') || name.contains('/') {
                errors.push(format!("discovery service name '{}' must be a bare host name", name));
            }
            for (index, instance) in instances.iter().enumerate() {
                if let Err(e) = instance.to_instance(name) {
                    errors.push(format!("discovery.services.{}[{}]: {}", name, index, e));
                }
            }
        }

        match self.observability.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => errors.push(format!("Invalid log level: {}", self.observability.logging.level)),
        }

        match self.observability.logging.format.to_lowercase().as_str() {
            "json" | "text" => {}
            _ => errors.push(format!("Invalid log format: {}", self.observability.logging.format)),
        }

        if self.demo.service_name.is_empty() {
            errors.push("demo.service_name cannot be empty".to_string());
        }

        if self.api.bind_address.is_empty() {
            errors.push("api.bind_address cannot be empty".to_string());
        }

        if !errors.is_empty() {
            return Err(DispatchError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }
}

/// Outgoing HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// TCP connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Whole-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent upstream
    pub user_agent: String,

    /// Scheme used when the manual dispatcher builds URLs
    pub scheme: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("service-dispatch/{}", env!("CARGO_PKG_VERSION")),
            scheme: "http".to_string(),
        }
    }
}

/// Static discovery: instances listed per logical service name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub services: HashMap<String, Vec<StaticInstanceConfig>>,
}

impl DiscoveryConfig {
    /// Materialise every configured instance, keyed by service name
    pub fn instances(&self) -> DispatchResult<HashMap<String, Vec<ServiceInstance>>> {
        self.services
            .iter()
            .map(|(name, entries)| {
                let instances = entries
                    .iter()
                    .map(|entry| entry.to_instance(name))
                    .collect::<DispatchResult<Vec<_>>>()?;
                Ok((name.clone(), instances))
            })
            .collect()
    }
}

/// One statically configured instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticInstanceConfig {
    /// Base URI of the instance, e.g. `http://10.0.0.1:8080`
    pub uri: String,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StaticInstanceConfig {
    pub fn new<S: Into<String>>(uri: S) -> Self {
        Self {
            uri: uri.into(),
            metadata: HashMap::new(),
        }
    }

    /// Parse the URI into a [`ServiceInstance`] registered under `service_name`
    pub fn to_instance(&self, service_name: &str) -> DispatchResult<ServiceInstance> {
        let url = Url::parse(&self.uri)?;

        let host = url
            .host_str()
            .ok_or_else(|| DispatchError::config(format!("URI '{}' has no host", self.uri)))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let port = url
            .port_or_known_default()
            .ok_or_else(|| DispatchError::config(format!("URI '{}' has no port", self.uri)))?;

        Ok(ServiceInstance {
            service_name: service_name.to_string(),
            host,
            port,
            metadata: self.metadata.clone(),
        })
    }
}

/// Observability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,

    /// Log format (json, text)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// What the demo runners call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub service_name: String,
    pub path: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            service_name: "api".to_string(),
            path: "/greetings".to_string(),
        }
    }
}

impl DemoConfig {
    /// Logical URL of the demo endpoint, e.g. `http://api/greetings`
    pub fn logical_url(&self, scheme: &str) -> String {
        format!("{}://{}{}", scheme, self.service_name, self.path)
    }
}

/// Greetings API listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Configuration change event
#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    /// Path of the changed configuration file
    pub file_path: PathBuf,
    /// New configuration
    pub config: DispatchConfig,
    /// Timestamp of the change
    pub timestamp: std::time::Instant,
}

/// Configuration manager with hot reloading capabilities
///
/// Loads the initial configuration, watches the file's directory with `notify`,
/// and broadcasts every successfully validated reload to subscribers. A reload
/// that fails to parse or validate is logged and the previous configuration
/// stays in effect.
pub struct ConfigManager {
    current_config: Arc<RwLock<DispatchConfig>>,
    config_path: PathBuf,
    _watcher: Option<notify::RecommendedWatcher>,
    change_sender: broadcast::Sender<ConfigChangeEvent>,
}

impl ConfigManager {
    /// Load the configuration at `config_path` without watching it
    pub async fn new<P: AsRef<Path>>(config_path: P) -> DispatchResult<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let config = DispatchConfig::load(&config_path).await?;
        let (change_sender, _) = broadcast::channel(16);

        Ok(Self {
            current_config: Arc::new(RwLock::new(config)),
            config_path,
            _watcher: None,
            change_sender,
        })
    }

    /// Load the configuration and start watching the file for changes
    pub async fn watching<P: AsRef<Path>>(config_path: P) -> DispatchResult<Self> {
        let mut manager = Self::new(config_path).await?;
        manager.setup_file_watcher()?;
        Ok(manager)
    }

    /// Snapshot of the current configuration
    pub async fn get_config(&self) -> DispatchConfig {
        self.current_config.read().await.clone()
    }

    /// Subscribe to configuration changes
    pub fn subscribe_to_changes(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.change_sender.subscribe()
    }

    /// Manually reload configuration from file
    pub async fn reload_config(&self) -> DispatchResult<()> {
        tracing::info!(path = ?self.config_path, "Manually reloading configuration");
        let new_config = DispatchConfig::load(&self.config_path).await?;
        Self::publish(&self.current_config, &self.change_sender, &self.config_path, new_config).await;
        Ok(())
    }

    async fn publish(
        current_config: &RwLock<DispatchConfig>,
        change_sender: &broadcast::Sender<ConfigChangeEvent>,
        config_path: &Path,
        new_config: DispatchConfig,
    ) {
        {
            let mut config = current_config.write().await;
            *config = new_config.clone();
        }

        let change_event = ConfigChangeEvent {
            file_path: config_path.to_path_buf(),
            config: new_config,
            timestamp: std::time::Instant::now(),
        };

        // No subscribers is fine.
        let _ = change_sender.send(change_event);
        tracing::info!("Configuration updated successfully");
    }

    /// Watch the configuration file's parent directory; editors that save via
    /// rename would otherwise break a file-level watch.
    fn setup_file_watcher(&mut self) -> DispatchResult<()> {
        let config_path = self.config_path.clone();
        let current_config = Arc::clone(&self.current_config);
        let change_sender = self.change_sender.clone();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let mut watcher = recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })
        .map_err(|e| DispatchError::config(format!("Failed to create file watcher: {}", e)))?;

        let watch_dir = match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| DispatchError::config(format!("Failed to watch config directory: {}", e)))?;

        self._watcher = Some(watcher);

        let config_file_name = config_path
            .file_name()
            .ok_or_else(|| DispatchError::config("Invalid config file path"))?
            .to_owned();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let is_config_file_event = event
                    .paths
                    .iter()
                    .any(|path| path.file_name() == Some(config_file_name.as_os_str()));

                if !is_config_file_event {
                    continue;
                }

                if let EventKind::Modify(_) | EventKind::Create(_) = event.kind {
                    tracing::info!("Configuration file changed, reloading...");

                    // Let the writer finish.
                    tokio::time::sleep(Duration::from_millis(100)).await;

                    match DispatchConfig::load(&config_path).await {
                        Ok(new_config) => {
                            Self::publish(&current_config, &change_sender, &config_path, new_config).await;
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {}", e);
                        }
                    }
                }
            }
        });

        tracing::info!(dir = ?watch_dir, "File watcher set up for configuration hot reloading");
        Ok(())
    }
}
