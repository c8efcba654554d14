//! # Service Dispatch - Core Library Crate
//!
//! Client-side load balancing: a request addressed to a logical service name
//! (`http://api/greetings`) is resolved to one concrete instance
//! (`http://10.0.0.2:8080/greetings`) at the moment it is sent, and the response
//! is streamed back unchanged.
//!
//! ## Request Flow
//!
//! ```text
//! caller ──► DispatchClient ──► DispatchFilter ──► Transport ──► instance
//!                                    │
//!                              RequestResolver
//!                              │            │
//!                    InstanceRegistry   InstanceSelector
//! ```
//!
//! The explicit alternative, [`dispatch::ManualDispatcher`], asks the same
//! resolver for an instance and builds the URL itself.
//!
//! ## Module Layout
//! - `core`: errors, configuration, request and instance types
//! - `discovery`: where instance sets come from
//! - `load_balancing`: how one instance is picked from a set
//! - `dispatch`: resolution, the filter, the manual path, and the client
//! - `observability`: logging setup
//! - `demo`: the greetings upstream and the client runners

/// Core functionality including error types, configuration, and basic data structures
pub mod core;

/// Instance registries keyed by logical service name
pub mod discovery;

/// Selection policies and their shared cursor state
pub mod load_balancing;

/// Resolution, transports, and the two call paths
pub mod dispatch;

/// Structured logging
pub mod observability;

/// Demo greetings API and client runners
pub mod demo;

/// Main error type used throughout the crate
pub use crate::core::error::{DispatchError, DispatchResult};

/// Configuration and its hot-reloading manager
pub use crate::core::config::{ConfigManager, DispatchConfig};

pub use crate::core::types::{ClientResponse, ConcreteRequest, LogicalRequest, ServiceInstance};
pub use crate::discovery::{InstanceRegistry, StaticRegistry};
pub use crate::dispatch::{DispatchClient, DispatchFilter, DispatchLayer, DispatchStack, ManualDispatcher, RequestResolver, Transport};
pub use crate::load_balancing::{InstanceSelector, RoundRobinSelector, SelectionPolicy};
