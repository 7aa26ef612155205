//! Lifecycle orchestrator. Drives customers through stage timelines,
//! dispatches due actions through channel collaborators and keeps
//! engagement tiers current. All periodic work runs as idempotent sweeps.

pub mod error;
pub mod guard;
pub mod locks;
pub mod memory;
pub mod orchestrator;
pub mod ports;
pub mod registry;
pub mod sweeps;

pub use error::OrchestratorError;
pub use guard::ActivityGuardEvaluator;
pub use locks::{CustomerLease, CustomerLocks};
pub use orchestrator::{Collaborators, Orchestrator};
pub use ports::{ChannelDispatcher, ProgressRepository};
pub use registry::{LoggingHandler, SideEffectHandler, SideEffectRegistry};
pub use sweeps::SweepReport;
