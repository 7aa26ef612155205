//! Engagement scoring and tier transitions for small-business customers.

pub mod completeness;
pub mod scoring;
pub mod tiers;

pub use completeness::{customer_completeness, profile_completeness, BusinessProfile};
pub use scoring::EngagementScorer;
pub use tiers::{TierChange, TierDirection, TierError, TierTransitionEngine};
