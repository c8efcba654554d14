//! # Transport
//!
//! The seam between resolution and the network. A [`Transport`] sends a
//! [`ConcreteRequest`] exactly as given and hands back the response with its body
//! still unread. It never looks at service names.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use http::Uri;
use metrics::histogram;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::core::config::ClientConfig;
use crate::core::error::{DispatchError, DispatchResult};
use crate::core::types::{ClientResponse, ConcreteRequest, RequestBody};

/// Sends concrete requests
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ConcreteRequest) -> DispatchResult<ClientResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: ConcreteRequest) -> DispatchResult<ClientResponse> {
        (**self).send(request).await
    }
}

/// `reqwest`-backed transport with streaming request and response bodies
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wrap an existing client
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client with the configured timeouts and user agent
    pub fn from_config(config: &ClientConfig) -> DispatchResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            // A redirect would reach an address the selector never chose.
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ConcreteRequest) -> DispatchResult<ClientResponse> {
        let request_id = request.id().to_string();
        let target = request.uri().to_string();
        let (method, uri, headers, body) = request.into_parts();

        let mut builder = self.client.request(method.clone(), uri.to_string()).headers(headers);
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Full(bytes) => builder.body(bytes),
            RequestBody::Streaming(stream) => builder.body(reqwest::Body::wrap_stream(stream)),
        };

        let start = Instant::now();
        let response = builder.send().await.map_err(|e| {
            warn!(request_id = %request_id, url = %target, error = %e, "Transport send failed");
            DispatchError::from(e)
        })?;
        histogram!("dispatch_transport_duration_seconds").record(start.elapsed().as_secs_f64());

        let status = response.status();
        let headers = response.headers().clone();
        let url: Uri = response.url().as_str().parse()?;

        debug!(
            request_id = %request_id,
            method = %method,
            url = %url,
            status = status.as_u16(),
            "Response headers received"
        );

        let body = response.bytes_stream().map_err(DispatchError::from).boxed();
        Ok(ClientResponse::new(status, headers, url, body))
    }
}
