//! # Service Dispatch - Demo Client
//!
//! Loads the dispatch configuration, wires the stack, and calls the configured
//! logical endpoint once through each call path. The configuration file stays
//! watched: every successful reload re-seeds the registry and runs the three
//! paths again, until Ctrl-C.

use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use service_dispatch::core::config::LoggingConfig;
use service_dispatch::demo::{run_all, standard_runners};
use service_dispatch::dispatch::{BannerLogObserver, DispatchObserver};
use service_dispatch::observability::init_logging;
use service_dispatch::{ConfigManager, DispatchResult, DispatchStack};

#[tokio::main]
async fn main() -> DispatchResult<()> {
    let config_path = std::env::var("DISPATCH_CONFIG_PATH")
        .unwrap_or_else(|_| "config/dispatch.yaml".to_string());

    let manager = match ConfigManager::watching(&config_path).await {
        Ok(manager) => manager,
        Err(e) => {
            init_logging(&LoggingConfig::default());
            error!("Failed to load configuration from {}: {}", config_path, e);
            return Err(e);
        }
    };

    let config = manager.get_config().await;
    init_logging(&config.observability.logging);
    info!(version = env!("CARGO_PKG_VERSION"), config = %config_path, "🚀 Starting service dispatch");

    let observer: Arc<dyn DispatchObserver> = Arc::new(BannerLogObserver);
    let stack = DispatchStack::from_config(&config, Arc::clone(&observer))?;
    let runners = Arc::new(standard_runners(&stack, &config));

    run_all(&runners, observer.as_ref()).await;

    let registry = Arc::clone(&stack.registry);
    let mut registry_events = registry.watch_changes();
    let events_task = tokio::spawn(async move {
        loop {
            match registry_events.recv().await {
                Ok(event) => info!(event = ?event, instances = ?registry.stats(), "Registry changed"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed registry change events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let registry = Arc::clone(&stack.registry);
    let mut changes = manager.subscribe_to_changes();
    let reload_task = tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(event) => {
                    if let Err(e) = registry.replace_from_config(&event.config.discovery) {
                        warn!(error = %e, "Keeping previous instances");
                        continue;
                    }
                    run_all(&runners, observer.as_ref()).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed configuration change events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    info!("Watching {} for changes, press Ctrl-C to exit", config_path);
    signal::ctrl_c().await?;

    reload_task.abort();
    events_task.abort();
    info!("✅ Service dispatch shutdown complete");
    Ok(())
}
