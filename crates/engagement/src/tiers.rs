//! Tier transition engine: maps scores onto ordered threshold bands and
//! classifies tier moves as upgrades or downgrades.

use lifecycle_core::config::{TierBand, TierConfig};
use lifecycle_core::types::{ActionKind, EngagementProfile, SideEffect, Tier};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TierError {
    #[error("Tier configuration has no bands")]
    NoBands,

    #[error("Tier {0} is configured more than once")]
    DuplicateTier(Tier),

    #[error("Band for tier {better} must require a higher score than tier {worse}")]
    NonMonotonicBands { better: Tier, worse: Tier },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierDirection {
    /// Numerically lower (better) tier.
    Upgrade,
    Downgrade,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierChange {
    pub customer_id: Uuid,
    pub from: Tier,
    pub to: Tier,
    pub score: u8,
    pub direction: TierDirection,
}

impl TierChange {
    /// Follow-up sequence for this move: a welcome sequence on upgrade, a
    /// re-engagement sequence on downgrade.
    pub fn follow_up(&self) -> SideEffect {
        let sequence = match self.direction {
            TierDirection::Upgrade => "tier_welcome",
            TierDirection::Downgrade => "re_engagement",
        };
        SideEffect::new(
            ActionKind::StartSequence,
            serde_json::json!({
                "sequence": sequence,
                "from_tier": self.from,
                "to_tier": self.to,
            }),
        )
    }
}

#[derive(Debug, Clone)]
pub struct TierTransitionEngine {
    /// Sorted by `min_score` descending.
    bands: Vec<TierBand>,
}

impl TierTransitionEngine {
    pub fn new(config: &TierConfig) -> Result<Self, TierError> {
        if config.bands.is_empty() {
            return Err(TierError::NoBands);
        }
        let mut bands = config.bands.clone();
        bands.sort_by(|a, b| b.min_score.cmp(&a.min_score));

        for (i, band) in bands.iter().enumerate() {
            if bands[..i].iter().any(|b| b.tier == band.tier) {
                return Err(TierError::DuplicateTier(band.tier));
            }
        }
        for pair in bands.windows(2) {
            let (higher, lower) = (&pair[0], &pair[1]);
            if higher.tier >= lower.tier || higher.min_score == lower.min_score {
                return Err(TierError::NonMonotonicBands {
                    better: higher.tier.min(lower.tier),
                    worse: higher.tier.max(lower.tier),
                });
            }
        }

        info!(bands = bands.len(), "Tier transition engine initialized");
        Ok(Self { bands })
    }

    /// Tier for `score`. A score exactly on a band's `min_score` belongs to
    /// that band, i.e. boundaries resolve to the better tier. Scores below
    /// every band fall into the coldest tier.
    pub fn tier_for_score(&self, score: u8) -> Tier {
        self.bands
            .iter()
            .find(|band| score >= band.min_score)
            .map_or_else(|| self.coldest_tier(), |band| band.tier)
    }

    pub fn coldest_tier(&self) -> Tier {
        self.bands.iter().map(|b| b.tier).max().unwrap_or(Tier::MAX)
    }

    pub fn band_name(&self, tier: Tier) -> Option<&str> {
        self.bands
            .iter()
            .find(|b| b.tier == tier)
            .map(|b| b.name.as_str())
    }

    /// Classifies the move implied by `new_score`; `None` when the tier is
    /// unchanged. Executing the follow-up is left to the caller.
    pub fn evaluate_transition(&self, profile: &EngagementProfile, new_score: u8) -> Option<TierChange> {
        let to = self.tier_for_score(new_score);
        let from = profile.tier;
        if to == from {
            return None;
        }

        let direction = if to < from {
            metrics::counter!("engagement.tier_upgrades").increment(1);
            TierDirection::Upgrade
        } else {
            metrics::counter!("engagement.tier_downgrades").increment(1);
            TierDirection::Downgrade
        };

        info!(
            customer_id = %profile.customer_id,
            old = from,
            new = to,
            score = new_score,
            ?direction,
            "Tier transition"
        );

        Some(TierChange {
            customer_id: profile.customer_id,
            from,
            to,
            score: new_score,
            direction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TierTransitionEngine {
        TierTransitionEngine::new(&TierConfig::default()).unwrap()
    }

    fn profile(tier: Tier) -> EngagementProfile {
        EngagementProfile {
            customer_id: Uuid::new_v4(),
            score: 0,
            tier,
        }
    }

    #[test]
    fn test_boundaries_resolve_to_better_tier() {
        let engine = engine();
        assert_eq!(engine.tier_for_score(80), 1);
        assert_eq!(engine.tier_for_score(79), 2);
        assert_eq!(engine.tier_for_score(50), 2);
        assert_eq!(engine.tier_for_score(49), 3);
        assert_eq!(engine.tier_for_score(25), 3);
        assert_eq!(engine.tier_for_score(0), 4);
        assert_eq!(engine.band_name(1), Some("Premium"));
    }

    #[test]
    fn test_no_change_when_tier_matches() {
        assert!(engine().evaluate_transition(&profile(2), 65).is_none());
    }

    #[test]
    fn test_upgrade_and_downgrade_classification() {
        let engine = engine();

        let up = engine.evaluate_transition(&profile(4), 85).unwrap();
        assert_eq!((up.from, up.to, up.direction), (4, 1, TierDirection::Upgrade));
        assert_eq!(up.follow_up().params["sequence"], "tier_welcome");

        let down = engine.evaluate_transition(&profile(1), 30).unwrap();
        assert_eq!((down.from, down.to, down.direction), (1, 3, TierDirection::Downgrade));
        assert_eq!(down.follow_up().kind, ActionKind::StartSequence);
        assert_eq!(down.follow_up().params["sequence"], "re_engagement");
    }

    #[test]
    fn test_unsorted_config_is_accepted() {
        let config = TierConfig {
            bands: vec![
                TierBand { tier: 2, name: "Warm".into(), min_score: 40 },
                TierBand { tier: 3, name: "Cold".into(), min_score: 0 },
                TierBand { tier: 1, name: "Hot".into(), min_score: 75 },
            ],
        };
        let engine = TierTransitionEngine::new(&config).unwrap();
        assert_eq!(engine.tier_for_score(75), 1);
        assert_eq!(engine.tier_for_score(39), 3);
    }

    #[test]
    fn test_scores_below_every_band_are_coldest() {
        let config = TierConfig {
            bands: vec![
                TierBand { tier: 1, name: "Hot".into(), min_score: 60 },
                TierBand { tier: 2, name: "Warm".into(), min_score: 20 },
            ],
        };
        let engine = TierTransitionEngine::new(&config).unwrap();
        assert_eq!(engine.tier_for_score(5), 2);
    }

    #[test]
    fn test_rejects_inverted_bands() {
        let config = TierConfig {
            bands: vec![
                TierBand { tier: 3, name: "A".into(), min_score: 80 },
                TierBand { tier: 1, name: "B".into(), min_score: 10 },
            ],
        };
        assert_eq!(
            TierTransitionEngine::new(&config).unwrap_err(),
            TierError::NonMonotonicBands { better: 1, worse: 3 }
        );
        assert_eq!(
            TierTransitionEngine::new(&TierConfig { bands: vec![] }).unwrap_err(),
            TierError::NoBands
        );
    }
}
