//! Service discovery: where logical service names turn into instance sets.

pub mod registry;

pub use registry::{InstanceRegistry, RegistryChangeEvent, RegistryChangeReceiver, StaticRegistry};
