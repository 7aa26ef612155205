//! Action guards: the `{if: ..., within_hours: ..., then: skip}` conditions
//! attached to timeline actions, as a closed tagged enum.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What to do with an action when its guard is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardDecision {
    Proceed,
    Skip,
}

impl GuardDecision {
    pub fn inverse(self) -> Self {
        match self {
            GuardDecision::Proceed => GuardDecision::Skip,
            GuardDecision::Skip => GuardDecision::Proceed,
        }
    }
}

/// Observable customer state a guard can test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "if", rename_all = "snake_case")]
pub enum GuardCondition {
    /// The customer opened an email within the last `within_hours`.
    EmailOpened { within_hours: u32 },
    /// The customer clicked an email link within the last `within_hours`.
    EmailClicked { within_hours: u32 },
    /// The customer replied on any channel within the last `within_hours`.
    Replied { within_hours: u32 },
    /// The current engagement score is at least `score`.
    ScoreAtLeast { score: u8 },
}

/// A condition plus the decision to apply when it holds. When the condition
/// does not hold the opposite decision applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionGuard {
    #[serde(flatten)]
    pub condition: GuardCondition,
    pub then: GuardDecision,
}

impl ActionGuard {
    pub fn skip_if(condition: GuardCondition) -> Self {
        Self {
            condition,
            then: GuardDecision::Skip,
        }
    }

    pub fn proceed_if(condition: GuardCondition) -> Self {
        Self {
            condition,
            then: GuardDecision::Proceed,
        }
    }

    /// Maps the truth of the condition onto a decision.
    pub fn decide(&self, condition_holds: bool) -> GuardDecision {
        if condition_holds {
            self.then
        } else {
            self.then.inverse()
        }
    }
}

/// Evaluates action guards against current customer state. Failures are
/// returned as errors; callers fail open.
pub trait GuardEvaluator: Send + Sync {
    fn evaluate(&self, guard: &ActionGuard, customer_id: &Uuid) -> anyhow::Result<GuardDecision>;
}

/// Evaluator that lets every action through.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysProceed;

impl GuardEvaluator for AlwaysProceed {
    fn evaluate(&self, _guard: &ActionGuard, _customer_id: &Uuid) -> anyhow::Result<GuardDecision> {
        Ok(GuardDecision::Proceed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_parses_seed_shape() {
        let guard: ActionGuard = serde_json::from_value(serde_json::json!({
            "if": "email_opened",
            "within_hours": 48,
            "then": "skip"
        }))
        .unwrap();
        assert_eq!(
            guard,
            ActionGuard::skip_if(GuardCondition::EmailOpened { within_hours: 48 })
        );
    }

    #[test]
    fn test_unknown_guard_kind_is_rejected() {
        let parsed = serde_json::from_value::<ActionGuard>(serde_json::json!({
            "if": "moon_phase",
            "then": "skip"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_decide_inverts_when_condition_fails() {
        let guard = ActionGuard::skip_if(GuardCondition::ScoreAtLeast { score: 50 });
        assert_eq!(guard.decide(true), GuardDecision::Skip);
        assert_eq!(guard.decide(false), GuardDecision::Proceed);

        let guard = ActionGuard::proceed_if(GuardCondition::Replied { within_hours: 24 });
        assert_eq!(guard.decide(false), GuardDecision::Skip);
    }
}
