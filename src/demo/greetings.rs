//! # Greetings API
//!
//! The upstream the demo client calls: `GET /greetings` answers
//! `{"greetings": "Hello, world!"}`. Several copies on different ports make a
//! service worth balancing across.

use axum::extract::State;
use axum::http::{HeaderName, HeaderValue};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::config::ApiConfig;
use crate::core::error::{DispatchError, DispatchResult};

/// Header naming the instance that produced a response
pub const SERVED_BY_HEADER: &str = "x-served-by";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    pub greetings: String,
}

impl Default for Greeting {
    fn default() -> Self {
        Self {
            greetings: "Hello, world!".to_string(),
        }
    }
}

#[derive(Clone)]
struct GreetingsState {
    instance: String,
}

/// Router exposing `GET /greetings`; `instance` is echoed in [`SERVED_BY_HEADER`]
pub fn router<S: Into<String>>(instance: S) -> Router {
    Router::new()
        .route("/greetings", get(greetings))
        .with_state(GreetingsState {
            instance: instance.into(),
        })
}

async fn greetings(State(state): State<GreetingsState>) -> impl IntoResponse {
    let served_by = HeaderValue::from_str(&state.instance)
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
    (
        [(HeaderName::from_static(SERVED_BY_HEADER), served_by)],
        Json(Greeting::default()),
    )
}

/// Bind `config.bind_address:config.port` and serve until the future is dropped
pub async fn serve(config: &ApiConfig) -> DispatchResult<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .map_err(|e| DispatchError::config(format!("Invalid API bind address: {}", e)))?;

    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "Greetings API listening");

    axum::serve(listener, router(local_addr.to_string())).await?;
    Ok(())
}
