//! In-memory collaborators for the standalone binary and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use lifecycle_core::ports::{ActivityHistoryProvider, CustomerDirectory};
use lifecycle_core::types::{ActionKind, ActivityHistory, Customer, DispatchReceipt, EngagementProfile};
use lifecycle_timeline::{TimelineAction, TimelineProgress};
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

use crate::ports::{ChannelDispatcher, ProgressRepository};

#[derive(Debug, Default)]
pub struct InMemoryProgressRepository {
    rows: DashMap<(Uuid, Uuid), TimelineProgress>,
}

impl InMemoryProgressRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl ProgressRepository for InMemoryProgressRepository {
    fn get(&self, customer_id: &Uuid, timeline_id: &Uuid) -> anyhow::Result<Option<TimelineProgress>> {
        Ok(self.rows.get(&(*customer_id, *timeline_id)).map(|r| r.value().clone()))
    }

    fn for_customer(&self, customer_id: &Uuid) -> anyhow::Result<Vec<TimelineProgress>> {
        let mut rows: Vec<_> = self
            .rows
            .iter()
            .filter(|r| r.customer_id == *customer_id)
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(|p| p.started_at);
        Ok(rows)
    }

    fn save(&self, progress: &TimelineProgress) -> anyhow::Result<()> {
        self.rows.insert(progress.key(), progress.clone());
        Ok(())
    }

    fn customers_with_active_progress(&self) -> anyhow::Result<Vec<Uuid>> {
        let ids: HashSet<Uuid> = self
            .rows
            .iter()
            .filter(|r| r.is_active())
            .map(|r| r.customer_id)
            .collect();
        let mut ids: Vec<_> = ids.into_iter().collect();
        ids.sort();
        Ok(ids)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCustomers {
    customers: DashMap<Uuid, Customer>,
}

impl InMemoryCustomers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }
}

impl CustomerDirectory for InMemoryCustomers {
    fn get(&self, customer_id: &Uuid) -> Option<Customer> {
        self.customers.get(customer_id).map(|r| r.value().clone())
    }

    fn list(&self) -> Vec<Customer> {
        let mut all: Vec<_> = self.customers.iter().map(|r| r.value().clone()).collect();
        all.sort_by_key(|c| c.id);
        all
    }

    fn save_engagement(&self, profile: EngagementProfile) -> anyhow::Result<()> {
        let mut customer = self
            .customers
            .get_mut(&profile.customer_id)
            .ok_or_else(|| anyhow::anyhow!("Customer {} not found", profile.customer_id))?;
        customer.engagement = profile;
        Ok(())
    }
}

/// Activity signals keyed by customer; unknown customers have no activity.
#[derive(Debug, Default)]
pub struct InMemoryActivity {
    histories: DashMap<Uuid, ActivityHistory>,
}

impl InMemoryActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, history: ActivityHistory) {
        self.histories.insert(history.customer_id, history);
    }

    pub fn update(&self, customer_id: Uuid, f: impl FnOnce(&mut ActivityHistory)) {
        let mut entry = self.histories.entry(customer_id).or_insert_with(|| ActivityHistory {
            customer_id,
            ..Default::default()
        });
        f(entry.value_mut());
    }
}

impl ActivityHistoryProvider for InMemoryActivity {
    fn get(&self, customer_id: &Uuid) -> anyhow::Result<ActivityHistory> {
        Ok(self
            .histories
            .get(customer_id)
            .map(|r| r.value().clone())
            .unwrap_or_else(|| ActivityHistory {
                customer_id: *customer_id,
                ..Default::default()
            }))
    }
}

/// A dispatched action as seen by `DryRunDispatcher`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentAction {
    pub customer_id: Uuid,
    pub action_id: Uuid,
    pub kind: ActionKind,
}

/// Logs and records every dispatch without contacting a channel. Kinds
/// registered with `fail_kind` report delivery failure.
#[derive(Debug, Default)]
pub struct DryRunDispatcher {
    sent: Mutex<Vec<SentAction>>,
    failing: Mutex<HashSet<ActionKind>>,
}

impl DryRunDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_kind(&self, kind: ActionKind) {
        self.failing.lock().insert(kind);
    }

    pub fn recover_kind(&self, kind: ActionKind) {
        self.failing.lock().remove(&kind);
    }

    pub fn sent(&self) -> Vec<SentAction> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl ChannelDispatcher for DryRunDispatcher {
    async fn dispatch(&self, action: &TimelineAction, customer: &Customer) -> anyhow::Result<DispatchReceipt> {
        if self.failing.lock().contains(&action.action_type) {
            return Ok(DispatchReceipt::failed(format!("{:?} channel unavailable", action.channel)));
        }
        info!(
            customer_id = %customer.id,
            action_id = %action.id,
            kind = %action.action_type,
            template = action.template.as_deref().unwrap_or("-"),
            "Dry-run dispatch"
        );
        self.sent.lock().push(SentAction {
            customer_id: customer.id,
            action_id: action.id,
            kind: action.action_type,
        });
        Ok(DispatchReceipt::delivered(format!("dry-run:{}", action.id)))
    }
}
