use lifecycle_core::error::LifecycleError;
use lifecycle_engagement::TierError;
use lifecycle_timeline::TimelineError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Customer {0} not found")]
    CustomerNotFound(Uuid),

    #[error("Timeline {0} not found")]
    TimelineNotFound(Uuid),

    #[error("Timeline {0} is not active")]
    TimelineInactive(Uuid),

    #[error("Customer {customer_id} has no progress on timeline {timeline_id}")]
    ProgressNotFound { customer_id: Uuid, timeline_id: Uuid },

    #[error("Customer {0} is being processed by another worker")]
    CustomerBusy(Uuid),

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error(transparent)]
    Tier(#[from] TierError),

    #[error("Collaborator failed: {0}")]
    Collaborator(#[from] anyhow::Error),
}

impl From<OrchestratorError> for LifecycleError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Tier(e) => LifecycleError::Config(e.to_string()),
            OrchestratorError::Collaborator(e) => LifecycleError::Collaborator(format!("{e:#}")),
            OrchestratorError::CustomerBusy(id) => {
                LifecycleError::Internal(anyhow::anyhow!("customer {id} is busy"))
            }
            other => LifecycleError::DataIntegrity(other.to_string()),
        }
    }
}
