use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Customer-lifecycle phase that selects which timeline and dialog trees apply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Trial / first contact.
    Hook,
    Engagement,
    Sales,
    Retention,
}

impl PipelineStage {
    pub fn all() -> [PipelineStage; 4] {
        [
            PipelineStage::Hook,
            PipelineStage::Engagement,
            PipelineStage::Sales,
            PipelineStage::Retention,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Hook => "hook",
            PipelineStage::Engagement => "engagement",
            PipelineStage::Sales => "sales",
            PipelineStage::Retention => "retention",
        }
    }

    /// Human-readable label used in generated timeline names.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStage::Hook => "Hook (Trial)",
            PipelineStage::Engagement => "Engagement",
            PipelineStage::Sales => "Sales",
            PipelineStage::Retention => "Retention",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PipelineStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hook" => Ok(PipelineStage::Hook),
            "engagement" => Ok(PipelineStage::Engagement),
            "sales" => Ok(PipelineStage::Sales),
            "retention" => Ok(PipelineStage::Retention),
            other => Err(format!(
                "invalid pipeline stage '{other}' (expected hook, engagement, sales or retention)"
            )),
        }
    }
}

/// Delivery channel of a scheduled timeline action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Phone,
    /// Internal checks that never leave the platform.
    System,
}

/// Closed set of side-effect / action types used by timeline actions, dialog
/// nodes, objection follow-ups and tier transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SendEmail,
    SendSms,
    MakeCall,
    ScheduleFollowup,
    ScheduleCallback,
    UpdateStage,
    UpdateCrm,
    CheckEngagement,
    SendNotification,
    SendInfo,
    StartSequence,
}

impl ActionKind {
    pub fn all() -> [ActionKind; 11] {
        [
            ActionKind::SendEmail,
            ActionKind::SendSms,
            ActionKind::MakeCall,
            ActionKind::ScheduleFollowup,
            ActionKind::ScheduleCallback,
            ActionKind::UpdateStage,
            ActionKind::UpdateCrm,
            ActionKind::CheckEngagement,
            ActionKind::SendNotification,
            ActionKind::SendInfo,
            ActionKind::StartSequence,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::SendEmail => "send_email",
            ActionKind::SendSms => "send_sms",
            ActionKind::MakeCall => "make_call",
            ActionKind::ScheduleFollowup => "schedule_followup",
            ActionKind::ScheduleCallback => "schedule_callback",
            ActionKind::UpdateStage => "update_stage",
            ActionKind::UpdateCrm => "update_crm",
            ActionKind::CheckEngagement => "check_engagement",
            ActionKind::SendNotification => "send_notification",
            ActionKind::SendInfo => "send_info",
            ActionKind::StartSequence => "start_sequence",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A side effect the caller must execute: an action kind plus its free-form
/// parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideEffect {
    pub kind: ActionKind,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl SideEffect {
    pub fn new(kind: ActionKind, params: serde_json::Value) -> Self {
        Self { kind, params }
    }

    /// Reads an integer parameter, falling back to `default` when absent or
    /// not a number.
    pub fn param_i64(&self, key: &str, default: i64) -> i64 {
        self.params
            .get(key)
            .and_then(|v| v.as_i64())
            .unwrap_or(default)
    }
}

/// Observable activity signals for a customer, supplied by the
/// `ActivityHistoryProvider`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityHistory {
    pub customer_id: Uuid,
    pub email_opens: u32,
    pub email_clicks: u32,
    pub content_views: u32,
    pub approvals: u32,
    pub purchases: u32,
    pub replies: u32,
    /// Data-quality score of the business profile, 0–100. Recomputed from the
    /// customer record whenever a customer is scored.
    pub profile_completeness: u8,
    pub last_email_open: Option<DateTime<Utc>>,
    pub last_email_click: Option<DateTime<Utc>>,
    pub last_reply: Option<DateTime<Utc>>,
}

/// Ordinal engagement classification. Lower value means more engaged.
pub type Tier = u8;

/// Score and tier currently persisted for a customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementProfile {
    pub customer_id: Uuid,
    pub score: u8,
    pub tier: Tier,
}

impl EngagementProfile {
    /// New customers start in the coldest tier with no score.
    pub fn new(customer_id: Uuid, coldest_tier: Tier) -> Self {
        Self {
            customer_id,
            score: 0,
            tier: coldest_tier,
        }
    }
}

/// Business-profile fields beyond the name and contact details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDetails {
    pub address_line1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub industry_category: Option<String>,
    pub business_description: Option<String>,
    pub products_services: Option<String>,
}

/// Small-business customer record as seen by the lifecycle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub business_name: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub stage: PipelineStage,
    pub engagement: EngagementProfile,
    #[serde(default)]
    pub profile: ProfileDetails,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl Customer {
    pub fn new(business_name: impl Into<String>, stage: PipelineStage, coldest_tier: Tier) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            business_name: business_name.into(),
            contact_name: None,
            email: None,
            phone: None,
            stage,
            engagement: EngagementProfile::new(id, coldest_tier),
            profile: ProfileDetails::default(),
            attributes: HashMap::new(),
        }
    }

    /// Placeholder values available to templated dialog and objection text.
    pub fn template_context(&self) -> HashMap<String, String> {
        let mut ctx = self.attributes.clone();
        ctx.insert("business_name".into(), self.business_name.clone());
        if let Some(name) = &self.contact_name {
            ctx.insert("customer_name".into(), name.clone());
        }
        if let Some(email) = &self.email {
            ctx.insert("email".into(), email.clone());
        }
        ctx.insert("stage".into(), self.stage.to_string());
        ctx
    }
}

/// Outcome reported by a channel dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReceipt {
    pub success: bool,
    pub external_ref: Option<String>,
    pub detail: Option<String>,
}

impl DispatchReceipt {
    pub fn delivered(external_ref: impl Into<String>) -> Self {
        Self {
            success: true,
            external_ref: Some(external_ref.into()),
            detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            external_ref: None,
            detail: Some(detail.into()),
        }
    }
}
