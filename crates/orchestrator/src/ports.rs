//! Collaborators the orchestrator needs beyond the shared core ports.

use async_trait::async_trait;
use lifecycle_core::types::{Customer, DispatchReceipt};
use lifecycle_timeline::{TimelineAction, TimelineProgress};
use uuid::Uuid;

/// Outbound channel delivery (email, SMS, phone). A returned receipt with
/// `success == false` counts as a failed attempt, the same as an error.
#[async_trait]
pub trait ChannelDispatcher: Send + Sync {
    async fn dispatch(&self, action: &TimelineAction, customer: &Customer) -> anyhow::Result<DispatchReceipt>;
}

/// Storage for timeline progress keyed by `(customer_id, timeline_id)`.
pub trait ProgressRepository: Send + Sync {
    fn get(&self, customer_id: &Uuid, timeline_id: &Uuid) -> anyhow::Result<Option<TimelineProgress>>;

    fn for_customer(&self, customer_id: &Uuid) -> anyhow::Result<Vec<TimelineProgress>>;

    fn save(&self, progress: &TimelineProgress) -> anyhow::Result<()>;

    /// Customers with at least one active progress row, deduplicated.
    fn customers_with_active_progress(&self) -> anyhow::Result<Vec<Uuid>>;
}
