use serde::Deserialize;

use crate::types::Tier;

/// Root application configuration. Loaded from environment variables
/// with the prefix `LIFECYCLE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub engagement: EngagementConfig,
    #[serde(default)]
    pub tiers: TierConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus exporter stays off unless enabled.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_host")]
    pub host: String,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_host() -> String {
    "0.0.0.0".to_string()
}
fn default_metrics_port() -> u16 { 9091 }

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_metrics_host(),
            port: default_metrics_port(),
        }
    }
}

// ─── Orchestrator Config ────────────────────────────────────────────────
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Customers handled per worker task.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Upper bound on chunks processed in parallel.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Failed dispatches after which an action is marked skipped.
    #[serde(default = "default_max_dispatch_attempts")]
    pub max_dispatch_attempts: u32,
    #[serde(default = "default_dispatch_interval_secs")]
    pub dispatch_interval_secs: u64,
    #[serde(default = "default_advance_interval_secs")]
    pub advance_interval_secs: u64,
    #[serde(default = "default_tier_interval_secs")]
    pub tier_interval_secs: u64,
}

fn default_node_id() -> String {
    "lifecycle-01".to_string()
}
fn default_chunk_size() -> usize { 100 }
fn default_max_workers() -> usize { 4 }
fn default_max_dispatch_attempts() -> u32 { 3 }
fn default_dispatch_interval_secs() -> u64 { 300 }
fn default_advance_interval_secs() -> u64 { 3600 }
fn default_tier_interval_secs() -> u64 { 21_600 }

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_workers: default_max_workers(),
            max_dispatch_attempts: default_max_dispatch_attempts(),
            dispatch_interval_secs: default_dispatch_interval_secs(),
            advance_interval_secs: default_advance_interval_secs(),
            tier_interval_secs: default_tier_interval_secs(),
        }
    }
}

// ─── Engagement Config ──────────────────────────────────────────────────

/// Points granted per occurrence of a signal, capped at `max_points`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct SignalWeight {
    pub points: u32,
    pub max_points: u32,
}

impl SignalWeight {
    pub const fn new(points: u32, max_points: u32) -> Self {
        Self { points, max_points }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngagementConfig {
    #[serde(default = "default_email_open")]
    pub email_open: SignalWeight,
    #[serde(default = "default_email_click")]
    pub email_click: SignalWeight,
    #[serde(default = "default_content_view")]
    pub content_view: SignalWeight,
    #[serde(default = "default_approval")]
    pub approval: SignalWeight,
    #[serde(default = "default_purchase")]
    pub purchase: SignalWeight,
    #[serde(default = "default_reply")]
    pub reply: SignalWeight,
    /// Points awarded for a fully complete business profile; scaled linearly.
    #[serde(default = "default_completeness_points")]
    pub completeness_points: u32,
    #[serde(default = "default_ceiling")]
    pub ceiling: u32,
    /// Score movement above which an engagement-changed event is emitted.
    #[serde(default = "default_significant_delta")]
    pub significant_delta: u8,
}

fn default_email_open() -> SignalWeight { SignalWeight::new(5, 20) }
fn default_email_click() -> SignalWeight { SignalWeight::new(8, 20) }
fn default_content_view() -> SignalWeight { SignalWeight::new(2, 10) }
fn default_approval() -> SignalWeight { SignalWeight::new(10, 20) }
fn default_purchase() -> SignalWeight { SignalWeight::new(25, 25) }
fn default_reply() -> SignalWeight { SignalWeight::new(5, 10) }
fn default_completeness_points() -> u32 { 15 }
fn default_ceiling() -> u32 { 100 }
fn default_significant_delta() -> u8 { 10 }

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            email_open: default_email_open(),
            email_click: default_email_click(),
            content_view: default_content_view(),
            approval: default_approval(),
            purchase: default_purchase(),
            reply: default_reply(),
            completeness_points: default_completeness_points(),
            ceiling: default_ceiling(),
            significant_delta: default_significant_delta(),
        }
    }
}

// ─── Tier Config ────────────────────────────────────────────────────────

/// A score band: customers scoring at least `min_score` qualify for `tier`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TierBand {
    pub tier: Tier,
    pub name: String,
    pub min_score: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TierConfig {
    #[serde(default = "default_bands")]
    pub bands: Vec<TierBand>,
}

fn default_bands() -> Vec<TierBand> {
    vec![
        TierBand { tier: 1, name: "Premium".into(), min_score: 80 },
        TierBand { tier: 2, name: "Engaged".into(), min_score: 50 },
        TierBand { tier: 3, name: "Active".into(), min_score: 25 },
        TierBand { tier: 4, name: "Passive".into(), min_score: 0 },
    ]
}

impl TierConfig {
    /// Numerically highest (least engaged) tier; where new customers start.
    pub fn coldest_tier(&self) -> Tier {
        self.bands.iter().map(|b| b.tier).max().unwrap_or(4)
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            bands: default_bands(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            orchestrator: OrchestratorConfig::default(),
            engagement: EngagementConfig::default(),
            tiers: TierConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("LIFECYCLE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.orchestrator.chunk_size, 100);
        assert_eq!(config.engagement.ceiling, 100);
        assert_eq!(config.tiers.coldest_tier(), 4);
    }

    #[test]
    fn test_partial_json_uses_field_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "orchestrator": { "chunk_size": 25 },
            "engagement": { "purchase": { "points": 30, "max_points": 30 } }
        }))
        .unwrap();
        assert_eq!(config.orchestrator.chunk_size, 25);
        assert_eq!(config.orchestrator.max_workers, 4);
        assert_eq!(config.engagement.purchase, SignalWeight::new(30, 30));
        assert_eq!(config.engagement.email_open, SignalWeight::new(5, 20));
        assert_eq!(config.tiers.bands.len(), 4);
    }
}
