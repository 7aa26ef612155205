//! Capabilities the lifecycle engine consumes from its host. Nothing behind
//! these traits is implemented by the engine itself.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::types::{ActivityHistory, Customer, EngagementProfile, SideEffect};

/// Supplies the activity signals used for engagement scoring and guards.
pub trait ActivityHistoryProvider: Send + Sync {
    fn get(&self, customer_id: &Uuid) -> anyhow::Result<ActivityHistory>;
}

/// Context handed to a side-effect executor alongside the effect itself.
#[derive(Debug, Clone)]
pub struct EffectContext {
    pub customer_id: Uuid,
    /// Where the effect came from, e.g. `dialog:initial-call/close_success`.
    pub origin: String,
    pub extra: Value,
}

impl EffectContext {
    pub fn new(customer_id: Uuid, origin: impl Into<String>) -> Self {
        Self {
            customer_id,
            origin: origin.into(),
            extra: Value::Null,
        }
    }
}

/// Executes dialog-node, objection and tier-transition side effects
/// (CRM updates, callbacks, templated emails, sequences).
#[async_trait]
pub trait SideEffectExecutor: Send + Sync {
    async fn execute(&self, effect: &SideEffect, ctx: &EffectContext) -> anyhow::Result<Value>;
}

/// Customer records and engagement-profile persistence.
pub trait CustomerDirectory: Send + Sync {
    fn get(&self, customer_id: &Uuid) -> Option<Customer>;
    fn list(&self) -> Vec<Customer>;
    fn save_engagement(&self, profile: EngagementProfile) -> anyhow::Result<()>;
}
