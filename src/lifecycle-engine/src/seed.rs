//! Default stage schedules and the account-manager call script.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use lifecycle_conversation::dialog::{DialogNode, DialogTree};
use lifecycle_conversation::{InMemoryCatalog, ObjectionHandler};
use lifecycle_core::error::{LifecycleError, LifecycleResult};
use lifecycle_core::types::{ActionKind, Channel, PipelineStage};
use lifecycle_timeline::{ActionGuard, GuardCondition, TimelineAction, TimelineDefinition, TimelineError, TimelineStore};
use serde_json::json;
use tracing::{info, warn};

fn email(day: u32, template: &str, description: &str) -> TimelineAction {
    TimelineAction::new(day, Channel::Email, ActionKind::SendEmail)
        .with_template(template)
        .with_description(description)
}

fn engagement_check(day: u32, threshold: u8, description: &str) -> TimelineAction {
    TimelineAction::new(day, Channel::System, ActionKind::CheckEngagement)
        .with_parameters(json!({ "threshold": threshold }))
        .with_description(description)
}

/// Built-in schedule for `stage`.
pub fn default_actions(stage: PipelineStage) -> Vec<TimelineAction> {
    match stage {
        PipelineStage::Hook => vec![
            email(1, "welcome", "Welcome email"),
            email(3, "follow_up", "Follow-up unless the welcome email was opened")
                .with_guard(ActionGuard::skip_if(GuardCondition::EmailOpened { within_hours: 48 })),
            email(7, "value_delivery", "Value delivery email"),
            engagement_check(14, 50, "Engagement threshold check"),
            email(30, "trial_checkin", "Mid-trial check-in"),
            email(60, "pre_conversion", "Pre-conversion email"),
            email(85, "trial_ending", "Trial ending reminder"),
        ],
        PipelineStage::Engagement => vec![
            email(1, "engagement_welcome", "Welcome to the engagement stage"),
            email(7, "weekly_value", "Weekly value delivery"),
            engagement_check(14, 80, "Sales readiness check"),
        ],
        PipelineStage::Sales => vec![
            email(1, "sales_welcome", "Welcome to the sales stage"),
            TimelineAction::new(3, Channel::Phone, ActionKind::MakeCall)
                .with_parameters(json!({ "script_id": "sales_intro" }))
                .with_description("Introductory sales call"),
        ],
        PipelineStage::Retention => vec![
            email(1, "retention_welcome", "Welcome to the retention stage"),
            email(30, "monthly_checkin", "Monthly check-in"),
        ],
    }
}

/// Default timeline for `stage` lasting `days`. Actions past the last day
/// are dropped.
pub fn default_timeline(stage: PipelineStage, days: u32) -> LifecycleResult<TimelineDefinition> {
    if days == 0 {
        return Err(LifecycleError::Config("timeline duration must be at least one day".into()));
    }
    let (actions, dropped): (Vec<_>, Vec<_>) = default_actions(stage)
        .into_iter()
        .partition(|a| a.day_number <= days);
    if !dropped.is_empty() {
        warn!(stage = %stage, days, dropped = dropped.len(), "Actions beyond the timeline duration were dropped");
    }
    Ok(TimelineDefinition::new(stage, days, actions))
}

/// Publishes the default timeline for `stage`. Without `force` an existing
/// active timeline for the stage is kept and reported as an error.
pub fn publish_default(
    store: &TimelineStore,
    stage: PipelineStage,
    days: u32,
    force: bool,
) -> LifecycleResult<Arc<TimelineDefinition>> {
    let definition = default_timeline(stage, days)?;
    let published = store.publish(definition, force).map_err(|e| match e {
        TimelineError::StageAlreadyActive(stage) => LifecycleError::Config(format!(
            "an active timeline for stage '{stage}' already exists, use --force to replace it"
        )),
        other => LifecycleError::DataIntegrity(other.to_string()),
    })?;
    info!(
        stage = %stage,
        timeline_id = %published.id,
        days,
        actions = published.actions.len(),
        "Seeded default timeline"
    );
    Ok(published)
}

/// Reads a store written by `save_store`; a missing file is an empty store.
pub fn load_store(path: &Path) -> LifecycleResult<TimelineStore> {
    let store = TimelineStore::new();
    if !path.exists() {
        return Ok(store);
    }
    let raw = std::fs::read_to_string(path).map_err(|e| LifecycleError::Internal(e.into()))?;
    let definitions: Vec<TimelineDefinition> = serde_json::from_str(&raw)?;
    store
        .restore(definitions)
        .map_err(|e| LifecycleError::DataIntegrity(format!("{}: {e}", path.display())))?;
    Ok(store)
}

pub fn save_store(store: &TimelineStore, path: &Path) -> LifecycleResult<()> {
    let definitions = store.list();
    let definitions: Vec<&TimelineDefinition> = definitions.iter().map(|d| d.as_ref()).collect();
    let raw = serde_json::to_string_pretty(&definitions)?;
    std::fs::write(path, raw).map_err(|e| LifecycleError::Internal(e.into()))?;
    info!(path = %path.display(), definitions = definitions.len(), "Saved timeline store");
    Ok(())
}

/// Scripted first call from an account manager to a new business.
pub fn initial_call_tree() -> DialogTree {
    DialogTree::new(
        "initial-call",
        "initial_call",
        vec![
            DialogNode::say(
                "start",
                "Hi, this is {am_name}. I'm calling because we came across {business_name} and have a new program for local businesses.",
                "ask_time",
            ),
            DialogNode::ask("ask_time", "Have you got a couple of minutes?", "explain_offer")
                .with_prompt("time_available")
                .with_branch(&["yes", "sure", "okay"], "explain_offer")
                .with_branch(&["no", "busy", "not now"], "schedule_callback"),
            DialogNode::say(
                "explain_offer",
                "We're offering a free 90-day trial of our marketing services: featured articles, event promotion and a customer service assistant for your website.",
                "ask_interest",
            ),
            DialogNode::ask("ask_interest", "Does that sound like something that could help {business_name}?", "collect_info")
                .with_prompt("interest_level")
                .with_branch(&["yes", "interested", "sounds good", "tell me more"], "collect_info")
                .with_branch(&["no", "not interested"], "handle_no"),
            DialogNode::ask("collect_info", "Great. Which email should the welcome package go to?", "confirm_trial")
                .with_prompt("email"),
            DialogNode::say(
                "confirm_trial",
                "Thanks! Everything you need is on its way, and your first article draft will follow within 48 hours.",
                "close_success",
            ),
            DialogNode::end("close_success", "Welcome aboard. I'm your account manager, so reach out any time.")
                .with_action(ActionKind::UpdateCrm, json!({ "fields": { "trial_started_at": "now" } })),
            DialogNode::ask("schedule_callback", "No problem. When would be a better time?", "confirm_callback")
                .with_prompt("callback_time"),
            DialogNode::end("confirm_callback", "I'll call you back then. Have a good day!")
                .with_action(ActionKind::ScheduleCallback, json!({ "delay_hours": 24 })),
            DialogNode::say(
                "handle_no",
                "Understood. What's your biggest marketing challenge right now? I may have some free resources for it.",
                "soft_close",
            ),
            DialogNode::end("soft_close", "Thanks for your time. I'll send a few resources over, no strings attached.")
                .with_action(ActionKind::SendEmail, json!({ "template": "resources" })),
        ],
    )
    .for_stage(PipelineStage::Hook)
}

pub fn objection_handlers() -> Vec<ObjectionHandler> {
    vec![
        ObjectionHandler::new(
            "price",
            "too expensive",
            &["expensive", "cost", "afford", "budget", "price", "money"],
            "I understand the budget concern, {customer_name}. The trial is free for 90 days, so you see the value before paying anything.",
            10,
        )
        .with_follow_up("Would you like to see what other local businesses have achieved?")
        .with_next_action(ActionKind::SendInfo, json!({ "template": "roi_examples" })),
        ObjectionHandler::new(
            "time",
            "too busy",
            &["busy", "time", "swamped", "overwhelmed", "later"],
            "Running a business is demanding. We handle the work; you just approve content, usually in under 15 minutes a week.",
            9,
        )
        .with_follow_up("Would it help if I showed you how simple the process is?")
        .with_next_action(ActionKind::ScheduleCallback, json!({ "delay_days": 3 })),
        ObjectionHandler::new(
            "need_to_think",
            "need to think about it",
            &["think about", "consider", "talk to", "partner", "spouse", "decide"],
            "Of course. I can send a short summary and a few success stories from similar businesses while you decide.",
            8,
        )
        .with_follow_up("When would be a good time to follow up?")
        .with_next_action(ActionKind::ScheduleCallback, json!({ "delay_days": 7 })),
        ObjectionHandler::new(
            "competitor",
            "using something else",
            &["already have", "using", "competitor", "another service", "yelp", "google ads"],
            "Good to hear you're already investing in marketing. We focus on local community engagement, so most businesses use us alongside their existing tools.",
            7,
        )
        .with_follow_up("What's working best for you right now?"),
        ObjectionHandler::new(
            "bad_timing",
            "bad time of year",
            &["slow season", "bad time", "end of year", "holidays", "seasonal"],
            "A slower period is a good time to build your presence, and the trial costs nothing in the meantime.",
            6,
        )
        .with_follow_up("When does your busy season usually start?")
        .with_next_action(ActionKind::ScheduleCallback, json!({ "delay_days": 14 })),
        ObjectionHandler::new(
            "not_interested",
            "not interested",
            &["not interested", "no thanks", "pass", "decline"],
            "No problem at all, {customer_name}. What marketing are you doing today? I might have a few free tips either way.",
            5,
        )
        .with_next_action(ActionKind::SendInfo, json!({ "template": "free_tips" })),
    ]
}

/// Placeholder values for the call script. Without a contact name the
/// customer is greeted generically.
pub fn call_context(business_name: String, contact_name: Option<String>, am_name: String) -> HashMap<String, String> {
    HashMap::from([
        ("business_name".to_string(), business_name),
        ("am_name".to_string(), am_name),
        ("customer_name".to_string(), contact_name.unwrap_or_else(|| "there".to_string())),
    ])
}

pub fn conversation_catalog() -> LifecycleResult<InMemoryCatalog> {
    let catalog = InMemoryCatalog::new();
    catalog
        .add_tree(initial_call_tree())
        .map_err(|e| LifecycleError::DataIntegrity(e.to_string()))?;
    catalog
        .set_handlers(objection_handlers())
        .map_err(|e| LifecycleError::DataIntegrity(e.to_string()))?;
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifecycle_conversation::{ConversationCatalog, Utterance};

    #[test]
    fn test_every_stage_schedule_validates() {
        for stage in PipelineStage::all() {
            default_timeline(stage, 90).unwrap().validate().unwrap();
        }
    }

    #[test]
    fn test_hook_schedule_days() {
        let days: Vec<u32> = default_actions(PipelineStage::Hook).iter().map(|a| a.day_number).collect();
        assert_eq!(days, vec![1, 3, 7, 14, 30, 60, 85]);
    }

    #[test]
    fn test_short_duration_drops_late_actions() {
        let timeline = default_timeline(PipelineStage::Hook, 30).unwrap();
        assert_eq!(timeline.actions.len(), 5);
        assert!(default_timeline(PipelineStage::Hook, 0).is_err());
    }

    #[test]
    fn test_publish_requires_force_to_replace() {
        let store = TimelineStore::new();
        publish_default(&store, PipelineStage::Sales, 30, false).unwrap();
        assert!(matches!(
            publish_default(&store, PipelineStage::Sales, 30, false),
            Err(LifecycleError::Config(_))
        ));
        let replaced = publish_default(&store, PipelineStage::Sales, 45, true).unwrap();
        assert_eq!(store.active_for_stage(PipelineStage::Sales).unwrap().id, replaced.id);
    }

    #[test]
    fn test_saved_store_requires_force_on_reseed() {
        let path = std::env::temp_dir().join(format!("lifecycle-timelines-{}.json", uuid::Uuid::new_v4()));

        let store = load_store(&path).unwrap();
        assert!(store.list().is_empty());
        let first = publish_default(&store, PipelineStage::Hook, 90, false).unwrap();
        save_store(&store, &path).unwrap();

        let store = load_store(&path).unwrap();
        assert_eq!(store.active_for_stage(PipelineStage::Hook).unwrap().id, first.id);
        assert!(matches!(
            publish_default(&store, PipelineStage::Hook, 90, false),
            Err(LifecycleError::Config(_))
        ));
        let second = publish_default(&store, PipelineStage::Hook, 60, true).unwrap();
        assert_eq!(second.version, 2);
        save_store(&store, &path).unwrap();

        let store = load_store(&path).unwrap();
        assert_eq!(store.list().len(), 2);
        assert_eq!(store.active_for_stage(PipelineStage::Hook).unwrap().id, second.id);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_catalog_loads_and_matches_price() {
        let catalog = conversation_catalog().unwrap();
        let tree = catalog.find_for_context("initial_call", Some(PipelineStage::Hook)).unwrap();
        assert_eq!(tree.nodes.len(), 11);

        let matcher = catalog.matcher().unwrap();
        let handler = matcher
            .match_utterance(&Utterance::new("this is too expensive for my budget"))
            .unwrap();
        assert_eq!(handler.objection_type, "price");
    }

    #[test]
    fn test_objection_reply_without_contact_name_is_rendered() {
        let matcher = conversation_catalog().unwrap().matcher().unwrap();
        let utterance = Utterance::new("we can't afford it");

        let context = call_context("Joe's Pizza".into(), None, "Sam".into());
        let reply = matcher.respond(&utterance, &context).unwrap();
        assert_eq!(
            reply.response,
            "I understand the budget concern, there. The trial is free for 90 days, so you see the value before paying anything."
        );
        assert!(!reply.response.contains('{'));

        let context = call_context("Joe's Pizza".into(), Some("Maria".into()), "Sam".into());
        let reply = matcher.respond(&utterance, &context).unwrap();
        assert!(reply.response.starts_with("I understand the budget concern, Maria."));
    }
}
