//! Engagement score: a capped weighted sum over observable activity signals.

use lifecycle_core::config::{EngagementConfig, SignalWeight};
use lifecycle_core::types::{ActivityHistory, Customer};
use tracing::debug;

use crate::completeness::customer_completeness;

/// Stateless scorer. The score is a pure function of the activity history and weights.
#[derive(Debug, Clone)]
pub struct EngagementScorer {
    weights: EngagementConfig,
}

fn signal_points(count: u32, weight: SignalWeight) -> u32 {
    count.saturating_mul(weight.points).min(weight.max_points)
}

impl EngagementScorer {
    pub fn new(config: &EngagementConfig) -> Self {
        Self {
            weights: config.clone(),
        }
    }

    /// Computes a score in `0..=100`. Every signal contributes
    /// `min(count * points, max_points)`; profile completeness contributes
    /// its percentage of `completeness_points`. The sum is capped at the
    /// configured ceiling and at 100.
    pub fn compute_score(&self, history: &ActivityHistory) -> u8 {
        let w = &self.weights;
        let completeness = u32::from(history.profile_completeness.min(100));

        let raw = [
            signal_points(history.email_opens, w.email_open),
            signal_points(history.email_clicks, w.email_click),
            signal_points(history.content_views, w.content_view),
            signal_points(history.approvals, w.approval),
            signal_points(history.purchases, w.purchase),
            signal_points(history.replies, w.reply),
            w.completeness_points.saturating_mul(completeness) / 100,
        ]
        .iter()
        .fold(0u32, |acc, p| acc.saturating_add(*p));

        let score = raw.min(w.ceiling).min(100) as u8;
        debug!(customer_id = %history.customer_id, raw, score, "Engagement score computed");
        score
    }

    /// Scores a customer, taking profile completeness from the customer
    /// record rather than from the activity history.
    pub fn score_customer(&self, customer: &Customer, history: &ActivityHistory) -> u8 {
        let history = ActivityHistory {
            profile_completeness: customer_completeness(customer),
            ..history.clone()
        };
        self.compute_score(&history)
    }

    /// Whether a score movement is large enough to report.
    pub fn is_significant_change(&self, old: u8, new: u8) -> bool {
        old.abs_diff(new) > self.weights.significant_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> EngagementScorer {
        EngagementScorer::new(&EngagementConfig::default())
    }

    #[test]
    fn test_empty_history_scores_zero() {
        assert_eq!(scorer().compute_score(&ActivityHistory::default()), 0);
    }

    #[test]
    fn test_weighted_sum() {
        let history = ActivityHistory {
            email_opens: 2,    // 10
            email_clicks: 1,   // 8
            content_views: 3,  // 6
            profile_completeness: 60, // 15 * 60% = 9
            ..Default::default()
        };
        assert_eq!(scorer().compute_score(&history), 33);
    }

    #[test]
    fn test_per_signal_cap_and_ceiling() {
        let history = ActivityHistory {
            email_opens: 1_000,
            email_clicks: 1_000,
            content_views: 1_000,
            approvals: 1_000,
            purchases: 1_000,
            replies: 1_000,
            profile_completeness: 100,
            ..Default::default()
        };
        assert_eq!(scorer().compute_score(&history), 100);

        let config = EngagementConfig {
            ceiling: 70,
            ..Default::default()
        };
        assert_eq!(EngagementScorer::new(&config).compute_score(&history), 70);
    }

    #[test]
    fn test_monotonic_in_each_signal() {
        let scorer = scorer();
        let base = ActivityHistory {
            email_opens: 1,
            approvals: 1,
            ..Default::default()
        };
        let before = scorer.compute_score(&base);
        let bumped = |f: &dyn Fn(&mut ActivityHistory)| {
            let mut more = base.clone();
            f(&mut more);
            scorer.compute_score(&more)
        };

        assert!(bumped(&|h| h.email_opens += 1) >= before);
        assert!(bumped(&|h| h.email_clicks += 1) >= before);
        assert!(bumped(&|h| h.content_views += 1) >= before);
        assert!(bumped(&|h| h.approvals += 1) >= before);
        assert!(bumped(&|h| h.purchases += 1) >= before);
        assert!(bumped(&|h| h.replies += 1) >= before);
        assert!(bumped(&|h| h.profile_completeness += 10) >= before);
    }

    #[test]
    fn test_customer_profile_drives_completeness() {
        use lifecycle_core::types::PipelineStage;

        let scorer = scorer();
        let mut customer = Customer::new("Harbor Bakery", PipelineStage::Hook, 4);
        let history = ActivityHistory {
            customer_id: customer.id,
            email_opens: 2, // 10
            profile_completeness: 100,
            ..Default::default()
        };
        // Only the business name is filled in: 15 * 10% = 1.
        assert_eq!(scorer.score_customer(&customer, &history), 11);

        customer.email = Some("owner@harborbakery.test".into());
        customer.phone = Some("555-0100".into());
        customer.profile.address_line1 = Some("1 Harbor Way".into());
        customer.profile.city = Some("Clearwater".into());
        customer.profile.state = Some("FL".into());
        customer.profile.industry_category = Some("food".into());
        customer.profile.business_description = Some("Neighbourhood bakery".into());
        customer.profile.products_services = Some("bread, cakes".into());
        assert_eq!(scorer.score_customer(&customer, &history), 25);
    }

    #[test]
    fn test_significant_change_threshold() {
        let scorer = scorer();
        assert!(!scorer.is_significant_change(40, 50));
        assert!(scorer.is_significant_change(40, 51));
        assert!(scorer.is_significant_change(60, 20));
    }
}
