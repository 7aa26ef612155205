//! Timeline orchestration: day-indexed action schedules per pipeline stage
//! and the per-customer progress state machine that walks them.

pub mod error;
pub mod guard;
pub mod progress;
pub mod state_machine;
pub mod store;
pub mod types;

pub use error::TimelineError;
pub use guard::{ActionGuard, GuardCondition, GuardDecision, GuardEvaluator};
pub use progress::{actions_due_today, resolve_action, try_advance_day, Advance, ResolveOutcome};
pub use store::TimelineStore;
pub use types::{ActionOutcome, ProgressStatus, TimelineAction, TimelineDefinition, TimelineProgress};
