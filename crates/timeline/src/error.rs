use lifecycle_core::types::PipelineStage;
use thiserror::Error;
use uuid::Uuid;

use crate::types::ProgressStatus;

#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("Action {action_id} is not scheduled for day {day} of timeline {timeline_id}")]
    UnknownAction {
        action_id: Uuid,
        timeline_id: Uuid,
        day: u32,
    },

    #[error("Progress references timeline {expected}, got definition {found}")]
    TimelineMismatch { expected: Uuid, found: Uuid },

    #[error("Timeline {0} not found")]
    NotFound(Uuid),

    #[error("Invalid timeline definition: {0}")]
    InvalidDefinition(String),

    #[error("Stage '{0}' already has an active timeline")]
    StageAlreadyActive(PipelineStage),

    #[error("Invalid progress transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ProgressStatus,
        to: ProgressStatus,
    },
}
