//! Guard evaluation against recorded customer activity.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use lifecycle_core::clock::Clock;
use lifecycle_core::ports::{ActivityHistoryProvider, CustomerDirectory};
use lifecycle_engagement::EngagementScorer;
use lifecycle_timeline::{ActionGuard, GuardCondition, GuardDecision, GuardEvaluator};
use uuid::Uuid;

pub struct ActivityGuardEvaluator {
    activity: Arc<dyn ActivityHistoryProvider>,
    customers: Arc<dyn CustomerDirectory>,
    scorer: EngagementScorer,
    clock: Arc<dyn Clock>,
}

fn within(at: Option<DateTime<Utc>>, now: DateTime<Utc>, hours: u32) -> bool {
    at.is_some_and(|t| t <= now && now - t <= Duration::hours(i64::from(hours)))
}

impl ActivityGuardEvaluator {
    pub fn new(
        activity: Arc<dyn ActivityHistoryProvider>,
        customers: Arc<dyn CustomerDirectory>,
        scorer: EngagementScorer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            activity,
            customers,
            scorer,
            clock,
        }
    }
}

impl GuardEvaluator for ActivityGuardEvaluator {
    fn evaluate(&self, guard: &ActionGuard, customer_id: &Uuid) -> anyhow::Result<GuardDecision> {
        let history = self.activity.get(customer_id)?;
        let now = self.clock.now();

        let holds = match guard.condition {
            GuardCondition::EmailOpened { within_hours } => within(history.last_email_open, now, within_hours),
            GuardCondition::EmailClicked { within_hours } => within(history.last_email_click, now, within_hours),
            GuardCondition::Replied { within_hours } => within(history.last_reply, now, within_hours),
            GuardCondition::ScoreAtLeast { score } => {
                let customer = self
                    .customers
                    .get(customer_id)
                    .ok_or_else(|| anyhow::anyhow!("Customer {} not found", customer_id))?;
                self.scorer.score_customer(&customer, &history) >= score
            }
        };
        Ok(guard.decide(holds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryActivity, InMemoryCustomers};
    use lifecycle_core::clock::ManualClock;
    use lifecycle_core::config::EngagementConfig;
    use lifecycle_core::types::{ActivityHistory, Customer, PipelineStage};

    fn make_evaluator_with(customers: Vec<Customer>, history: ActivityHistory, now: DateTime<Utc>) -> ActivityGuardEvaluator {
        let activity = Arc::new(InMemoryActivity::new());
        activity.record(history);
        let directory = Arc::new(InMemoryCustomers::new());
        for customer in customers {
            directory.upsert(customer);
        }
        ActivityGuardEvaluator::new(
            activity,
            directory,
            EngagementScorer::new(&EngagementConfig::default()),
            Arc::new(ManualClock::new(now)),
        )
    }

    fn make_evaluator(history: ActivityHistory, now: DateTime<Utc>) -> ActivityGuardEvaluator {
        make_evaluator_with(Vec::new(), history, now)
    }

    #[test]
    fn test_recent_open_skips_follow_up() {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let evaluator = make_evaluator(
            ActivityHistory {
                customer_id: id,
                email_opens: 1,
                last_email_open: Some(now - Duration::hours(20)),
                ..Default::default()
            },
            now,
        );
        let guard = ActionGuard::skip_if(GuardCondition::EmailOpened { within_hours: 48 });
        assert_eq!(evaluator.evaluate(&guard, &id).unwrap(), GuardDecision::Skip);

        let stale = ActionGuard::skip_if(GuardCondition::EmailOpened { within_hours: 12 });
        assert_eq!(evaluator.evaluate(&stale, &id).unwrap(), GuardDecision::Proceed);
    }

    #[test]
    fn test_no_activity_proceeds() {
        let id = Uuid::new_v4();
        let evaluator = make_evaluator(ActivityHistory::default(), Utc::now());
        let guard = ActionGuard::skip_if(GuardCondition::Replied { within_hours: 72 });
        assert_eq!(evaluator.evaluate(&guard, &id).unwrap(), GuardDecision::Proceed);
    }

    #[test]
    fn test_score_guard() {
        let customer = Customer::new("Harbor Bakery", PipelineStage::Engagement, 4);
        let id = customer.id;
        let evaluator = make_evaluator_with(
            vec![customer],
            ActivityHistory {
                customer_id: id,
                purchases: 1,
                approvals: 2,
                ..Default::default()
            },
            Utc::now(),
        );
        // 25 + 20 + 1 for the business name
        let guard = ActionGuard::proceed_if(GuardCondition::ScoreAtLeast { score: 46 });
        assert_eq!(evaluator.evaluate(&guard, &id).unwrap(), GuardDecision::Proceed);
        let guard = ActionGuard::proceed_if(GuardCondition::ScoreAtLeast { score: 47 });
        assert_eq!(evaluator.evaluate(&guard, &id).unwrap(), GuardDecision::Skip);
    }

    #[test]
    fn test_score_guard_for_unknown_customer_errors() {
        let evaluator = make_evaluator(ActivityHistory::default(), Utc::now());
        let guard = ActionGuard::proceed_if(GuardCondition::ScoreAtLeast { score: 10 });
        assert!(evaluator.evaluate(&guard, &Uuid::new_v4()).is_err());
    }
}
