//! # Dispatch
//!
//! Resolution and sending. Two call paths share one [`RequestResolver`]:
//!
//! - [`DispatchFilter`] intercepts requests transparently (used by the
//!   load-balanced [`DispatchClient`])
//! - [`ManualDispatcher`] resolves explicitly and builds the URL itself

pub mod client;
pub mod filter;
pub mod manual;
pub mod observer;
pub mod resolver;
pub mod stack;
pub mod transport;

pub use client::{DispatchClient, RequestSpec};
pub use filter::{Direct, DispatchFilter, DispatchLayer, Exchange};
pub use manual::ManualDispatcher;
pub use observer::{banner, BannerLogObserver, DispatchObserver, NoopObserver};
pub use resolver::RequestResolver;
pub use stack::DispatchStack;
pub use transport::{ReqwestTransport, Transport};
