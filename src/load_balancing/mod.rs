pub mod state;
pub mod strategies;

pub use state::SelectionState;
pub use strategies::{InstanceSelector, RandomSelector, RoundRobinSelector, SelectionPolicy};
