//! Shared domain types, configuration, errors and collaborator ports for the
//! customer lifecycle orchestration engine.

pub mod clock;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod ports;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{LifecycleError, LifecycleResult};
