//! # Dispatch Client
//!
//! A small fluent HTTP client on top of an [`Exchange`]. Built plain, it sends
//! every URL as written; built load-balanced, logical service names in the URL
//! are resolved by a [`DispatchFilter`] first.
//!
//! ```ignore
//! let greeting: Greeting = client.get("http://api/greetings").json().await?;
//! ```

use http::header::{HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::core::error::DispatchResult;
use crate::core::types::{ClientResponse, LogicalRequest};
use crate::dispatch::filter::{Direct, DispatchFilter, Exchange};
use crate::dispatch::resolver::RequestResolver;
use crate::dispatch::transport::Transport;

#[derive(Clone)]
pub struct DispatchClient {
    exchange: Arc<dyn Exchange>,
}

impl DispatchClient {
    pub fn new(exchange: Arc<dyn Exchange>) -> Self {
        Self { exchange }
    }

    /// Client without any name resolution
    pub fn direct<T: Transport + 'static>(transport: T) -> Self {
        Self::new(Arc::new(Direct::new(transport)))
    }

    /// Client whose requests go through a [`DispatchFilter`]
    pub fn load_balanced<T: Transport + 'static>(transport: T, resolver: Arc<RequestResolver>) -> Self {
        Self::new(Arc::new(DispatchFilter::new(transport, resolver)))
    }

    /// Start a GET request. URL errors surface when the request is sent.
    pub fn get(&self, url: &str) -> RequestSpec {
        RequestSpec {
            exchange: Arc::clone(&self.exchange),
            request: LogicalRequest::get(url),
        }
    }

    /// Start from a fully built request
    pub fn request(&self, request: LogicalRequest) -> RequestSpec {
        RequestSpec {
            exchange: Arc::clone(&self.exchange),
            request: Ok(request),
        }
    }
}

/// A request waiting to be sent
pub struct RequestSpec {
    exchange: Arc<dyn Exchange>,
    request: DispatchResult<LogicalRequest>,
}

impl RequestSpec {
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.request = self.request.map(|request| request.with_header(name, value));
        self
    }

    /// Send and return the response whatever its status
    pub async fn send(self) -> DispatchResult<ClientResponse> {
        let request = self.request?;
        self.exchange.exchange(request).await
    }

    /// Send and fail on a non-2xx status
    pub async fn retrieve(self) -> DispatchResult<ClientResponse> {
        self.send().await?.error_for_status()
    }

    /// `retrieve`, then read the body as text
    pub async fn text(self) -> DispatchResult<String> {
        self.retrieve().await?.text().await
    }

    /// `retrieve`, then decode the body as JSON
    pub async fn json<T: DeserializeOwned>(self) -> DispatchResult<T> {
        self.retrieve().await?.json().await
    }
}
