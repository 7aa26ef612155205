use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use lifecycle_core::types::{ActionKind, Channel, PipelineStage, SideEffect};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TimelineError;
use crate::guard::ActionGuard;

/// A reusable, versioned action schedule for one pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineDefinition {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub stage: PipelineStage,
    pub duration_days: u32,
    pub active: bool,
    pub version: u32,
    pub actions: Vec<TimelineAction>,
    pub created_at: DateTime<Utc>,
}

impl TimelineDefinition {
    pub fn new(stage: PipelineStage, duration_days: u32, actions: Vec<TimelineAction>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: format!("Default {} Timeline", stage.label()),
            slug: format!("default-{}-timeline", stage),
            stage,
            duration_days,
            active: true,
            version: 1,
            actions,
            created_at: Utc::now(),
        }
    }

    /// Checks the authoring invariants: positive duration, every action day
    /// within `1..=duration_days`, unique action ids.
    pub fn validate(&self) -> Result<(), TimelineError> {
        if self.duration_days == 0 {
            return Err(TimelineError::InvalidDefinition(format!(
                "timeline {} has a zero-day duration",
                self.slug
            )));
        }
        let mut seen = HashSet::new();
        for action in &self.actions {
            if action.day_number == 0 || action.day_number > self.duration_days {
                return Err(TimelineError::InvalidDefinition(format!(
                    "action {} is scheduled on day {} outside 1..={}",
                    action.id, action.day_number, self.duration_days
                )));
            }
            if !seen.insert(action.id) {
                return Err(TimelineError::InvalidDefinition(format!(
                    "duplicate action id {}",
                    action.id
                )));
            }
        }
        Ok(())
    }

    /// Active actions for `day`, ordered by priority with insertion order
    /// breaking ties.
    pub fn actions_for_day(&self, day: u32) -> Vec<&TimelineAction> {
        let mut actions: Vec<&TimelineAction> = self
            .actions
            .iter()
            .filter(|a| a.active && a.day_number == day)
            .collect();
        // sort_by_key is stable, so equal priorities keep insertion order.
        actions.sort_by_key(|a| a.priority);
        actions
    }

    /// Smallest day after `day` that has at least one active action.
    pub fn next_defined_day(&self, day: u32) -> Option<u32> {
        self.actions
            .iter()
            .filter(|a| a.active && a.day_number > day)
            .map(|a| a.day_number)
            .min()
    }

    pub fn action(&self, id: &Uuid) -> Option<&TimelineAction> {
        self.actions.iter().find(|a| a.id == *id)
    }
}

/// One scheduled unit of work within a timeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineAction {
    pub id: Uuid,
    pub day_number: u32,
    pub channel: Channel,
    pub action_type: ActionKind,
    pub template: Option<String>,
    pub conditions: Option<ActionGuard>,
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Hours after the day opens before the action may be dispatched.
    #[serde(default)]
    pub delay_hours: u32,
    /// Lower values run first.
    #[serde(default)]
    pub priority: i32,
    pub active: bool,
    #[serde(default)]
    pub description: String,
}

impl TimelineAction {
    pub fn new(day_number: u32, channel: Channel, action_type: ActionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            day_number,
            channel,
            action_type,
            template: None,
            conditions: None,
            parameters: serde_json::Value::Null,
            delay_hours: 0,
            priority: 1,
            active: true,
            description: String::new(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_guard(mut self, guard: ActionGuard) -> Self {
        self.conditions = Some(guard);
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay_hours(mut self, hours: u32) -> Self {
        self.delay_hours = hours;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// The action as a side effect, with the template folded into the params.
    pub fn side_effect(&self) -> SideEffect {
        let mut params = match &self.parameters {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        if let Some(template) = &self.template {
            params
                .entry("template")
                .or_insert_with(|| serde_json::Value::String(template.clone()));
        }
        SideEffect::new(self.action_type, serde_json::Value::Object(params))
    }
}

/// Runtime status of a customer's progress through a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Active,
    Completed,
    Paused,
    Cancelled,
}

/// How a due action was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Completed,
    Skipped,
}

/// Per-(customer, timeline) cursor into a timeline definition.
///
/// Day `d` opens at `started_at + (d - 1)` days and closes at
/// `started_at + d` days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineProgress {
    pub customer_id: Uuid,
    pub timeline_id: Uuid,
    pub current_day: u32,
    pub status: ProgressStatus,
    pub started_at: DateTime<Utc>,
    pub completed_actions: BTreeSet<Uuid>,
    pub skipped_actions: BTreeSet<Uuid>,
    /// Failed dispatch attempts per still-unresolved action.
    #[serde(default)]
    pub dispatch_attempts: HashMap<Uuid, u32>,
    pub paused_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TimelineProgress {
    pub fn start(customer_id: Uuid, timeline_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            customer_id,
            timeline_id,
            current_day: 1,
            status: ProgressStatus::Active,
            started_at: now,
            completed_actions: BTreeSet::new(),
            skipped_actions: BTreeSet::new(),
            dispatch_attempts: HashMap::new(),
            paused_at: None,
            finished_at: None,
        }
    }

    pub fn key(&self) -> (Uuid, Uuid) {
        (self.customer_id, self.timeline_id)
    }

    pub fn is_active(&self) -> bool {
        self.status == ProgressStatus::Active
    }

    pub fn is_resolved(&self, action_id: &Uuid) -> bool {
        self.completed_actions.contains(action_id) || self.skipped_actions.contains(action_id)
    }

    /// Completed, or parked on the `duration_days + 1` sentinel day.
    pub fn is_finished(&self, duration_days: u32) -> bool {
        self.status == ProgressStatus::Completed || self.current_day > duration_days
    }

    pub fn day_opens_at(&self, day: u32) -> DateTime<Utc> {
        self.started_at + Duration::days(i64::from(day.saturating_sub(1)))
    }

    /// Earliest instant `try_advance_day` may leave the current day.
    pub fn current_day_closes_at(&self) -> DateTime<Utc> {
        self.started_at + Duration::days(i64::from(self.current_day))
    }

    /// When `action` becomes dispatchable on the current day.
    pub fn action_due_at(&self, action: &TimelineAction) -> DateTime<Utc> {
        self.day_opens_at(self.current_day) + Duration::hours(i64::from(action.delay_hours))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_definition() -> TimelineDefinition {
        TimelineDefinition::new(
            PipelineStage::Hook,
            10,
            vec![
                TimelineAction::new(1, Channel::Email, ActionKind::SendEmail).with_priority(2),
                TimelineAction::new(1, Channel::Sms, ActionKind::SendSms).with_priority(1),
                TimelineAction::new(1, Channel::Phone, ActionKind::MakeCall).with_priority(2),
                TimelineAction::new(4, Channel::System, ActionKind::CheckEngagement).inactive(),
                TimelineAction::new(6, Channel::Email, ActionKind::SendEmail),
            ],
        )
    }

    #[test]
    fn test_actions_for_day_orders_by_priority_then_insertion() {
        let def = make_definition();
        let kinds: Vec<ActionKind> = def.actions_for_day(1).iter().map(|a| a.action_type).collect();
        assert_eq!(
            kinds,
            vec![ActionKind::SendSms, ActionKind::SendEmail, ActionKind::MakeCall]
        );
    }

    #[test]
    fn test_next_defined_day_ignores_inactive_actions() {
        let def = make_definition();
        assert_eq!(def.next_defined_day(1), Some(6));
        assert_eq!(def.next_defined_day(6), None);
    }

    #[test]
    fn test_validate_rejects_out_of_range_day() {
        let def = TimelineDefinition::new(
            PipelineStage::Sales,
            5,
            vec![TimelineAction::new(6, Channel::Email, ActionKind::SendEmail)],
        );
        assert!(matches!(def.validate(), Err(TimelineError::InvalidDefinition(_))));
        assert!(make_definition().validate().is_ok());
    }

    #[test]
    fn test_day_windows() {
        let start = Utc::now();
        let mut progress = TimelineProgress::start(Uuid::new_v4(), Uuid::new_v4(), start);
        assert_eq!(progress.day_opens_at(1), start);
        assert_eq!(progress.current_day_closes_at(), start + Duration::days(1));
        progress.current_day = 3;
        assert_eq!(progress.day_opens_at(3), start + Duration::days(2));

        let action = TimelineAction::new(3, Channel::Email, ActionKind::SendEmail).with_delay_hours(6);
        assert_eq!(
            progress.action_due_at(&action),
            start + Duration::days(2) + Duration::hours(6)
        );
    }

    #[test]
    fn test_side_effect_carries_template() {
        let action = TimelineAction::new(1, Channel::Email, ActionKind::SendEmail)
            .with_template("welcome")
            .with_parameters(serde_json::json!({"sequence_id": "S-1"}));
        let effect = action.side_effect();
        assert_eq!(effect.kind, ActionKind::SendEmail);
        assert_eq!(effect.params["template"], "welcome");
        assert_eq!(effect.params["sequence_id"], "S-1");
    }
}
