//! # Core Types Module
//!
//! Data structures shared by every layer of the dispatcher: the registry's view of
//! a [`ServiceInstance`], the caller's [`LogicalRequest`], the transport's
//! [`ConcreteRequest`], and the streamed [`ClientResponse`].
//!
//! ## Rust Ownership Concepts in This Module
//!
//! - A `ConcreteRequest` is built once and then *moved* into the transport, so the
//!   compiler guarantees nothing mutates it after resolution
//! - Bodies are `Stream`s of `Bytes`; `Bytes` clones are reference-counted, so
//!   chunks are handed on without copying
//! - `Pin<Box<dyn Stream + Send>>` erases the concrete stream type so that reqwest
//!   bodies and in-memory test bodies share one type

use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use http::header::{HeaderName, HeaderValue};
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{HeaderMap, Method, StatusCode, Uri};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::pin::Pin;
use uuid::Uuid;

use crate::core::error::{DispatchError, DispatchResult};

/// One concrete network endpoint registered under a logical service name
///
/// Instances are snapshots: the registry hands out fresh copies on every query and
/// nothing downstream keeps them beyond a single resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Logical service name this instance is registered under
    pub service_name: String,

    /// Host name or IP address
    pub host: String,

    /// TCP port
    pub port: u16,

    /// Free-form metadata (zone, version, ...)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    /// Create a new service instance without metadata
    pub fn new<S: Into<String>, H: Into<String>>(service_name: S, host: H, port: u16) -> Self {
        Self {
            service_name: service_name.into(),
            host: host.into(),
            port,
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Identifier used in logs and metrics
    pub fn instance_id(&self) -> String {
        format!("{}@{}", self.service_name, self.authority())
    }

    /// `host:port`, with IPv6 literals bracketed
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Build `scheme://host:port/path` for this instance
    pub fn url(&self, scheme: &str, path_and_query: &str) -> DispatchResult<Uri> {
        let path = if path_and_query.starts_with('/') {
            path_and_query.to_string()
        } else {
            format!("/{}", path_and_query)
        };

        let uri = Uri::builder()
            .scheme(scheme)
            .authority(self.authority().as_str())
            .path_and_query(path.as_str())
            .build()?;
        Ok(uri)
    }
}

// Identity is (host, port, service_name); metadata does not participate.
impl PartialEq for ServiceInstance {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port && self.service_name == other.service_name
    }
}

impl Eq for ServiceInstance {}

impl Hash for ServiceInstance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
        self.service_name.hash(state);
    }
}

/// Request body stream. `Sync` so it can be handed to any HTTP client body wrapper.
pub type RequestBodyStream = Pin<Box<dyn Stream<Item = DispatchResult<Bytes>> + Send + Sync>>;

/// Response body: a lazy, single-consumption sequence of chunks
pub type BodyStream = BoxStream<'static, DispatchResult<Bytes>>;

/// Outgoing request body
#[derive(Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Full(Bytes),
    Streaming(RequestBodyStream),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => write!(f, "Empty"),
            RequestBody::Full(bytes) => write!(f, "Full({} bytes)", bytes.len()),
            RequestBody::Streaming(_) => write!(f, "Streaming"),
        }
    }
}

/// A request as the caller writes it
///
/// The authority is either a literal network address (`10.0.0.1:8080`) or a
/// logical service name used as if it were a host name (`api`).
#[derive(Debug)]
pub struct LogicalRequest {
    /// Unique identifier for this request (for tracing and logging)
    pub id: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl LogicalRequest {
    /// Create a request with a generated ID. The URI must carry an authority.
    pub fn new(method: Method, uri: Uri) -> DispatchResult<Self> {
        if uri.authority().is_none() {
            return Err(DispatchError::invalid_request(format!(
                "URI '{}' has no authority",
                uri
            )));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            method,
            uri,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        })
    }

    /// Parse `url` and build a GET request
    pub fn get(url: &str) -> DispatchResult<Self> {
        Self::new(Method::GET, url.parse::<Uri>()?)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = RequestBody::Full(body.into());
        self
    }

    pub fn with_body_stream<S>(mut self, stream: S) -> Self
    where
        S: Stream<Item = DispatchResult<Bytes>> + Send + Sync + 'static,
    {
        self.body = RequestBody::Streaming(Box::pin(stream));
        self
    }

    /// Request path without query parameters
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// The service name to resolve, lowercased, or `None` when the authority is a
    /// literal address. Host names are case-insensitive, so `API` and `api` name
    /// the same service.
    pub fn logical_service_name(&self) -> Option<String> {
        self.uri
            .authority()
            .filter(|authority| is_logical_authority(authority))
            .map(|authority| authority.host().to_ascii_lowercase())
    }
}

/// A bare host name with no port is a logical service name; an IP literal or
/// anything carrying an explicit port is a real network address.
///
/// Port-less DNS names count as logical too: `http://example.com/` is looked up
/// in the registry under `example.com` and fails with `NoInstancesAvailable` if
/// nothing is registered there. Write the port (`http://example.com:80/`) to
/// send such a request as-is.
pub fn is_logical_authority(authority: &Authority) -> bool {
    if authority.port_u16().is_some() {
        return false;
    }

    let host = authority.host().trim_start_matches('[').trim_end_matches(']');
    !host.is_empty() && host.parse::<IpAddr>().is_err()
}

/// A request bound to a concrete `host:port`, ready for the transport
///
/// Fields are private: once built, a concrete request is only read or consumed.
#[derive(Debug)]
pub struct ConcreteRequest {
    id: String,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: RequestBody,
    instance: Option<ServiceInstance>,
}

impl ConcreteRequest {
    /// Rewrite the request's authority to the chosen instance, keeping scheme,
    /// path, query, method, headers and body as they were.
    pub fn resolved(request: LogicalRequest, instance: ServiceInstance) -> DispatchResult<Self> {
        let LogicalRequest {
            id,
            method,
            uri,
            headers,
            body,
        } = request;

        let mut parts = uri.into_parts();
        parts.scheme = Some(parts.scheme.unwrap_or(Scheme::HTTP));
        parts.authority = Some(instance.authority().parse::<Authority>()?);
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }

        let uri = Uri::from_parts(parts)
            .map_err(|e| DispatchError::invalid_request(format!("Failed to rewrite URI: {}", e)))?;

        Ok(Self {
            id,
            method,
            uri,
            headers,
            body,
            instance: Some(instance),
        })
    }

    /// Forward a request whose authority is already a real address
    pub fn pass_through(request: LogicalRequest) -> Self {
        Self {
            id: request.id,
            method: request.method,
            uri: request.uri,
            headers: request.headers,
            body: request.body,
            instance: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// The instance chosen during resolution; `None` for pass-through requests
    pub fn instance(&self) -> Option<&ServiceInstance> {
        self.instance.as_ref()
    }

    pub fn into_parts(self) -> (Method, Uri, HeaderMap, RequestBody) {
        (self.method, self.uri, self.headers, self.body)
    }
}

/// Response metadata plus a lazily streamed body
pub struct ClientResponse {
    status: StatusCode,
    headers: HeaderMap,
    url: Uri,
    body: BodyStream,
}

impl ClientResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, url: Uri, body: BodyStream) -> Self {
        Self {
            status,
            headers,
            url,
            body,
        }
    }

    /// Build a response from an in-memory list of chunks
    pub fn from_chunks(status: StatusCode, url: Uri, chunks: Vec<Bytes>) -> Self {
        let body = futures::stream::iter(chunks.into_iter().map(Ok)).boxed();
        Self::new(status, HeaderMap::new(), url, body)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The concrete URL the transport actually called
    pub fn url(&self) -> &Uri {
        &self.url
    }

    /// Fail with [`DispatchError::UpstreamStatus`] on a non-2xx status
    pub fn error_for_status(self) -> DispatchResult<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(DispatchError::UpstreamStatus {
                status: self.status.as_u16(),
                url: self.url.to_string(),
            })
        }
    }

    pub fn into_body(self) -> BodyStream {
        self.body
    }

    /// Drain the body into one buffer
    pub async fn bytes(self) -> DispatchResult<Bytes> {
        let mut body = self.body;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.try_next().await? {
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }

    pub async fn text(self) -> DispatchResult<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| DispatchError::transport(format!("Response body is not valid UTF-8: {}", e)))
    }

    pub async fn json<T: DeserializeOwned>(self) -> DispatchResult<T> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl fmt::Debug for ClientResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientResponse")
            .field("status", &self.status)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_authority_detection() {
        let logical = LogicalRequest::get("http://api/greetings").unwrap();
        assert_eq!(logical.logical_service_name().as_deref(), Some("api"));

        let shouting = LogicalRequest::get("http://API/greetings").unwrap();
        assert_eq!(shouting.logical_service_name().as_deref(), Some("api"));

        let fqdn = LogicalRequest::get("http://example.com/").unwrap();
        assert_eq!(fqdn.logical_service_name().as_deref(), Some("example.com"));

        for literal in [
            "http://10.0.0.1:8080/greetings",
            "http://10.0.0.1/greetings",
            "http://[::1]/greetings",
            "http://localhost:8080/greetings",
        ] {
            let request = LogicalRequest::get(literal).unwrap();
            assert_eq!(request.logical_service_name(), None, "{}", literal);
        }
    }

    #[test]
    fn test_request_without_authority_is_rejected() {
        let err = LogicalRequest::get("/greetings").unwrap_err();
        assert_eq!(err.error_type(), "invalid_request");
    }

    #[test]
    fn test_resolved_request_preserves_everything_but_authority() {
        let request = LogicalRequest::get("https://api/greetings?lang=en")
            .unwrap()
            .with_header(
                HeaderName::from_static("x-trace"),
                HeaderValue::from_static("abc"),
            )
            .with_body("payload");
        let id = request.id.clone();

        let instance = ServiceInstance::new("api", "10.0.0.7", 9443);
        let concrete = ConcreteRequest::resolved(request, instance.clone()).unwrap();

        assert_eq!(concrete.uri().to_string(), "https://10.0.0.7:9443/greetings?lang=en");
        assert_eq!(concrete.id(), id);
        assert_eq!(concrete.method(), &Method::GET);
        assert_eq!(concrete.headers().get("x-trace").unwrap(), "abc");
        assert!(matches!(concrete.body(), RequestBody::Full(b) if b.as_ref() == b"payload"));
        assert_eq!(concrete.instance(), Some(&instance));
    }

    #[test]
    fn test_resolved_request_without_path_gets_root() {
        let request = LogicalRequest::get("http://api").unwrap();
        let concrete =
            ConcreteRequest::resolved(request, ServiceInstance::new("api", "10.0.0.1", 80)).unwrap();
        assert_eq!(concrete.uri().to_string(), "http://10.0.0.1:80/");
    }

    #[test]
    fn test_instance_url_and_identity() {
        let v4 = ServiceInstance::new("api", "10.0.0.1", 8080).with_metadata("zone", "a");
        let same = ServiceInstance::new("api", "10.0.0.1", 8080).with_metadata("zone", "b");
        let v6 = ServiceInstance::new("api", "::1", 8080);

        assert_eq!(v4, same);
        assert_eq!(v4.url("http", "greetings").unwrap().to_string(), "http://10.0.0.1:8080/greetings");
        assert_eq!(v6.authority(), "[::1]:8080");
        assert_eq!(v4.instance_id(), "api@10.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_response_body_helpers() {
        let url: Uri = "http://10.0.0.1:8080/greetings".parse().unwrap();
        let response = ClientResponse::from_chunks(
            StatusCode::OK,
            url.clone(),
            vec![Bytes::from_static(b"{\"greetings\":"), Bytes::from_static(b"\"hi\"}")],
        );
        let value: serde_json::Value = response.json().await.unwrap();
        assert_eq!(value["greetings"], "hi");

        let failed = ClientResponse::from_chunks(StatusCode::SERVICE_UNAVAILABLE, url, vec![]);
        let err = failed.error_for_status().unwrap_err();
        assert!(matches!(err, DispatchError::UpstreamStatus { status: 503, .. }));
    }
}
