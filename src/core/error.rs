//! # Error Handling Module
//!
//! Every failure the dispatcher can surface is a variant of [`DispatchError`],
//! built on the `thiserror` crate. Errors are plain data: they are returned to the
//! immediate caller, never retried internally, and never fatal to the process.
//!
//! ## Error kinds that matter to callers
//!
//! - [`DispatchError::NoInstancesAvailable`]: the registry answered, but with an
//!   empty set for the requested service name. Nothing was sent anywhere.
//! - [`DispatchError::ResolutionTransport`]: the registry could not be asked at
//!   all (discovery backend unreachable, broken configuration source, ...).
//! - [`DispatchError::Transport`]: resolution succeeded but the send failed. The
//!   selector already charged the chosen instance a turn; that is not undone.
//!
//! ## Rust Concepts
//!
//! - `#[error("...")]` generates the `Display` implementation for each variant
//! - `From` implementations let `?` convert library errors automatically
//! - `DispatchResult<T>` is a type alias so signatures stay short

use http::StatusCode;
use thiserror::Error;

/// Result type used throughout the dispatcher
pub type DispatchResult<T> = Result<T, DispatchError>;

/// All the ways resolving or dispatching a request can fail
#[derive(Debug, Error, Clone)]
pub enum DispatchError {
    /// The registry returned an empty instance set for the service
    #[error("No instances available for service: {service}")]
    NoInstancesAvailable { service: String },

    /// The registry query itself failed
    #[error("Failed to query instances for service {service}: {message}")]
    ResolutionTransport { service: String, message: String },

    /// The underlying send failed after resolution
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The upstream answered with a non-success status
    #[error("Upstream {url} responded with status {status}")]
    UpstreamStatus { status: u16, url: String },

    /// The request could not be turned into something sendable
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// I/O errors (file operations, socket binding, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl DispatchError {
    /// Create a no-instances error for a service
    pub fn no_instances<S: Into<String>>(service: S) -> Self {
        Self::NoInstancesAvailable {
            service: service.into(),
        }
    }

    /// Create a registry query failure for a service
    pub fn resolution_transport<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::ResolutionTransport {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a transport error with a custom message
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an invalid request error with a custom reason
    pub fn invalid_request<S: Into<String>>(reason: S) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// HTTP status a server fronting this dispatcher should report for the error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoInstancesAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::ResolutionTransport { .. } => StatusCode::BAD_GATEWAY,
            Self::Transport { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamStatus { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Json { .. } => StatusCode::BAD_REQUEST,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether an external retry policy could reasonably try again.
    ///
    /// Nothing inside this crate acts on this.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NoInstancesAvailable { .. } => true,
            Self::ResolutionTransport { .. } => true,
            Self::Transport { .. } => true,
            Self::UpstreamStatus { status, .. } => *status >= 500,
            Self::Io { .. } => true,
            _ => false,
        }
    }

    /// Stable string identifier for the error kind, used in logs and metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NoInstancesAvailable { .. } => "no_instances_available",
            Self::ResolutionTransport { .. } => "resolution_transport_error",
            Self::Transport { .. } => "transport_error",
            Self::UpstreamStatus { .. } => "upstream_status",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Configuration { .. } => "configuration_error",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
        }
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for DispatchError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Connect failures, timeouts and broken bodies all surface as transport errors
impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

impl From<http::uri::InvalidUri> for DispatchError {
    fn from(err: http::uri::InvalidUri) -> Self {
        Self::InvalidRequest {
            reason: err.to_string(),
        }
    }
}

impl From<http::Error> for DispatchError {
    fn from(err: http::Error) -> Self {
        Self::InvalidRequest {
            reason: err.to_string(),
        }
    }
}

impl From<url::ParseError> for DispatchError {
    fn from(err: url::ParseError) -> Self {
        Self::Configuration {
            message: format!("Invalid URL: {}", err),
        }
    }
}
