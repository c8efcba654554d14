//! Demo services: the greetings upstream and the client runners that call it.

pub mod greetings;
pub mod runners;

pub use greetings::{Greeting, SERVED_BY_HEADER};
pub use runners::{run_all, standard_runners, ConfiguredClientRunner, DemoRunner, FilterRunner, ManualRunner};
