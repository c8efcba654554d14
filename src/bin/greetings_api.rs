//! # Greetings API
//!
//! Upstream for the dispatch demo. Start several on different ports:
//!
//! ```text
//! DISPATCH_API_PORT=8081 cargo run --bin greetings-api
//! DISPATCH_API_PORT=8082 cargo run --bin greetings-api
//! ```

use tokio::signal;
use tracing::{error, info};

use service_dispatch::demo::greetings;
use service_dispatch::observability::init_logging;
use service_dispatch::{DispatchConfig, DispatchResult};

#[tokio::main]
async fn main() -> DispatchResult<()> {
    let config = load_config().await?;
    init_logging(&config.observability.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting greetings API");

    tokio::select! {
        result = greetings::serve(&config.api) => {
            if let Err(e) = &result {
                error!("Greetings API stopped: {}", e);
            }
            result
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    }
}

/// The config file is optional here; without one, defaults plus environment apply.
async fn load_config() -> DispatchResult<DispatchConfig> {
    match std::env::var("DISPATCH_CONFIG_PATH") {
        Ok(path) => DispatchConfig::load(path).await,
        Err(_) => {
            let mut config = DispatchConfig::default();
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
    }
}
