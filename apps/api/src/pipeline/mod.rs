//! Run execution: the per-posting orchestrator, the run records it reports
//! into, and the manager that owns run tasks.

pub mod factory;
pub mod manager;
pub mod orchestrator;
pub mod progress;
pub mod runs;
pub mod stop;

pub use factory::ServiceRunFactory;
pub use manager::{RunManager, RunManagerError};
