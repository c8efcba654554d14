//! # Instance Selection Strategies
//!
//! An [`InstanceSelector`] is a pure, synchronous policy: given the instance set a
//! registry just returned, pick one. It never suspends and its only side effect is
//! advancing its own cursor.
//!
//! ## Strategies
//!
//! 1. **Round Robin** (default): `instances[cursor mod len]`, then advance the
//!    per-service cursor. If the set shrinks between calls the modulo wraps the
//!    cursor back into range.
//! 2. **Random**: uniform choice. Fair over a long run, deterministic never.

use metrics::counter;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::core::types::ServiceInstance;
use crate::load_balancing::state::SelectionState;

/// Selection policy trait
pub trait InstanceSelector: Send + Sync {
    /// Choose one instance for the next request to `service_name`.
    ///
    /// Returns `None` only for an empty slice; callers reject that case first.
    fn choose<'a>(&self, service_name: &str, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance>;

    /// Algorithm name for metrics and logging
    fn algorithm_name(&self) -> &'static str;
}

/// Round-robin selector backed by a shared [`SelectionState`]
pub struct RoundRobinSelector {
    state: Arc<SelectionState>,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self::with_state(Arc::new(SelectionState::new()))
    }

    /// Use an existing cursor map, e.g. one shared with another selector
    pub fn with_state(state: Arc<SelectionState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<SelectionState> {
        &self.state
    }
}

impl Default for RoundRobinSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceSelector for RoundRobinSelector {
    fn choose<'a>(&self, service_name: &str, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance> {
        if instances.is_empty() {
            return None;
        }

        let position = self.state.advance(service_name);
        let selected = &instances[position % instances.len()];

        counter!("selector_selections_total", "algorithm" => "round_robin").increment(1);
        debug!(
            service = service_name,
            position = position,
            pool_size = instances.len(),
            instance = %selected.authority(),
            algorithm = "round_robin",
            "Selected instance"
        );

        Some(selected)
    }

    fn algorithm_name(&self) -> &'static str {
        "round_robin"
    }
}

/// Uniform random selector
#[derive(Default)]
pub struct RandomSelector;

impl RandomSelector {
    pub fn new() -> Self {
        Self
    }
}

impl InstanceSelector for RandomSelector {
    fn choose<'a>(&self, service_name: &str, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance> {
        if instances.is_empty() {
            return None;
        }

        let index = rand::thread_rng().gen_range(0..instances.len());
        let selected = &instances[index];

        counter!("selector_selections_total", "algorithm" => "random").increment(1);
        debug!(
            service = service_name,
            pool_size = instances.len(),
            instance = %selected.authority(),
            algorithm = "random",
            "Selected instance"
        );

        Some(selected)
    }

    fn algorithm_name(&self) -> &'static str {
        "random"
    }
}

/// Configured selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    RoundRobin,
    Random,
}

impl SelectionPolicy {
    pub fn build(self) -> Arc<dyn InstanceSelector> {
        match self {
            SelectionPolicy::RoundRobin => Arc::new(RoundRobinSelector::new()),
            SelectionPolicy::Random => Arc::new(RandomSelector::new()),
        }
    }
}
