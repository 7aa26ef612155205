//! A live conversation: owns the dialog cursor and transcript, and routes
//! each customer utterance to a dialog branch or an objection handler.

use std::collections::HashMap;
use std::sync::Arc;

use lifecycle_core::event_bus::{make_event, noop_sink, EventSink, EventType};
use lifecycle_core::types::SideEffect;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::dialog::{DialogInterpreter, DialogTree, NodeKind, ENTRY_NODE};
use crate::error::ConversationError;
use crate::objection::ObjectionMatcher;
use crate::trigger::Utterance;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Agent,
    Customer,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    /// Node the line belongs to; `None` for objection replies.
    pub node_key: Option<String>,
}

/// What the agent says back, plus effects the caller must execute.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reply {
    pub lines: Vec<String>,
    pub prompt: Option<String>,
    pub objection_type: Option<String>,
    pub side_effects: Vec<SideEffect>,
    pub completed: bool,
}

impl Reply {
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }
}

pub struct ConversationSession {
    tree: Arc<DialogTree>,
    matcher: Arc<ObjectionMatcher>,
    interpreter: DialogInterpreter,
    context: HashMap<String, String>,
    customer_id: Option<Uuid>,
    events: Arc<dyn EventSink>,
    /// Ask node awaiting an answer; `None` once the dialog has ended.
    current: Option<String>,
    transcript: Vec<TranscriptEntry>,
}

impl ConversationSession {
    /// Starts at the entry node and speaks up to the first question.
    pub fn open(
        tree: Arc<DialogTree>,
        matcher: Arc<ObjectionMatcher>,
        context: HashMap<String, String>,
    ) -> Result<(Self, Reply), ConversationError> {
        let mut session = Self {
            tree,
            matcher,
            interpreter: DialogInterpreter::new(),
            context,
            customer_id: None,
            events: noop_sink(),
            current: None,
            transcript: Vec::new(),
        };
        let mut reply = Reply::default();
        session.advance_from(ENTRY_NODE.to_string(), &mut reply)?;
        info!(tree = %session.tree.slug, "Conversation opened");
        Ok((session, reply))
    }

    pub fn with_customer(mut self, customer_id: Uuid) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn current_node(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn is_completed(&self) -> bool {
        self.current.is_none()
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Handles one customer utterance. A branch of the pending question wins;
    /// otherwise a matching objection is answered without moving the cursor;
    /// otherwise the dialog follows its default path.
    pub fn respond(&mut self, text: &str) -> Result<Reply, ConversationError> {
        let current = self.current.clone().ok_or(ConversationError::SessionCompleted)?;
        let utterance = Utterance::new(text);
        self.transcript.push(TranscriptEntry {
            speaker: Speaker::Customer,
            text: utterance.raw().to_string(),
            node_key: Some(current.clone()),
        });

        let node = self.tree.node(&current)?;
        let branch_hit = self.interpreter.match_branch(node, &utterance).is_some();

        if !branch_hit {
            if let Some(objection) = self.matcher.respond(&utterance, &self.context) {
                self.events.emit(make_event(
                    EventType::ObjectionMatched,
                    objection.handler_id.to_string(),
                    self.customer_id,
                    serde_json::json!({
                        "objection_type": objection.objection_type,
                        "node": current,
                    }),
                ));
                let mut reply = Reply {
                    objection_type: Some(objection.objection_type.clone()),
                    side_effects: objection.side_effect.into_iter().collect(),
                    ..Default::default()
                };
                self.say(objection.response, None, &mut reply);
                if let Some(follow_up) = objection.follow_up {
                    self.say(follow_up, None, &mut reply);
                }
                return Ok(reply);
            }
        }

        let step = self.interpreter.step(&self.tree, &current, &utterance, &self.context)?;
        let mut reply = Reply::default();
        reply.side_effects.extend(step.side_effect);
        match step.next_node {
            Some(next) => self.advance_from(next, &mut reply)?,
            None => self.finish(&mut reply),
        }
        Ok(reply)
    }

    /// Speaks `key` and every say node after it, stopping at the next
    /// question or at the end of the dialog.
    fn advance_from(&mut self, mut key: String, reply: &mut Reply) -> Result<(), ConversationError> {
        let tree = Arc::clone(&self.tree);
        let no_input = Utterance::new("");

        for _ in 0..=tree.nodes.len() {
            let node = tree.node(&key)?;
            match node.kind {
                NodeKind::Ask => {
                    let text = self.interpreter.present(&tree, &key, &self.context)?;
                    self.say(text, Some(key.clone()), reply);
                    reply.prompt = node.prompt.clone();
                    self.current = Some(key);
                    return Ok(());
                }
                NodeKind::Say | NodeKind::End => {
                    let step = self.interpreter.step(&tree, &key, &no_input, &self.context)?;
                    self.say(step.rendered, Some(key.clone()), reply);
                    reply.side_effects.extend(step.side_effect);
                    match step.next_node {
                        Some(next) => key = next,
                        None => {
                            self.finish(reply);
                            return Ok(());
                        }
                    }
                }
            }
        }
        Err(ConversationError::CycleDetected {
            tree: tree.slug.clone(),
            key,
        })
    }

    fn say(&mut self, text: String, node_key: Option<String>, reply: &mut Reply) {
        self.transcript.push(TranscriptEntry {
            speaker: Speaker::Agent,
            text: text.clone(),
            node_key,
        });
        reply.lines.push(text);
    }

    fn finish(&mut self, reply: &mut Reply) {
        self.current = None;
        reply.completed = true;
        self.events.emit(make_event(
            EventType::DialogCompleted,
            self.tree.id.to_string(),
            self.customer_id,
            serde_json::json!({
                "tree": self.tree.slug,
                "turns": self.transcript.len(),
            }),
        ));
        info!(tree = %self.tree.slug, turns = self.transcript.len(), "Conversation completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::DialogNode;
    use crate::objection::ObjectionHandler;
    use lifecycle_core::event_bus::capture_sink;
    use lifecycle_core::types::ActionKind;
    use serde_json::json;

    fn make_tree() -> Arc<DialogTree> {
        Arc::new(DialogTree::new(
            "initial-call",
            "initial_call",
            vec![
                DialogNode::say("start", "Hi, this is {am_name} for {business_name}.", "ask_time"),
                DialogNode::ask("ask_time", "Do you have two minutes?", "explain_offer")
                    .with_branch(&["yes", "sure", "okay"], "explain_offer")
                    .with_branch(&["no", "busy", "not now"], "schedule_callback"),
                DialogNode::say("explain_offer", "We help local businesses get found.", "ask_interest"),
                DialogNode::ask("ask_interest", "Could that help {business_name}?", "collect_info")
                    .with_branch(&["yes", "interested"], "collect_info")
                    .with_branch(&["no", "not interested"], "soft_close"),
                DialogNode::ask("collect_info", "Best email?", "close_success").with_prompt("email"),
                DialogNode::end("close_success", "You're all set!")
                    .with_action(ActionKind::UpdateCrm, json!({"fields": {"trial_started_at": "now"}})),
                DialogNode::ask("schedule_callback", "When is better?", "confirm_callback"),
                DialogNode::end("confirm_callback", "Talk soon.")
                    .with_action(ActionKind::ScheduleCallback, json!({"delay_hours": 24})),
                DialogNode::end("soft_close", "I'll send some resources.")
                    .with_action(ActionKind::SendEmail, json!({"template": "resources"})),
            ],
        ))
    }

    fn make_matcher() -> Arc<ObjectionMatcher> {
        Arc::new(
            ObjectionMatcher::new(vec![ObjectionHandler::new(
                "price",
                "too expensive",
                &["expensive", "budget"],
                "The trial is free, {customer_name}.",
                10,
            )
            .with_next_action(ActionKind::SendInfo, json!({"template": "roi_examples"}))])
            .unwrap(),
        )
    }

    fn ctx() -> HashMap<String, String> {
        HashMap::from([
            ("business_name".to_string(), "Harbor Bakery".to_string()),
            ("am_name".to_string(), "Sarah".to_string()),
            ("customer_name".to_string(), "Dana".to_string()),
        ])
    }

    #[test]
    fn test_open_speaks_through_to_first_question() {
        let (session, reply) = ConversationSession::open(make_tree(), make_matcher(), ctx()).unwrap();
        assert_eq!(
            reply.lines,
            vec!["Hi, this is Sarah for Harbor Bakery.", "Do you have two minutes?"]
        );
        assert_eq!(session.current_node(), Some("ask_time"));
        assert!(!reply.completed);
    }

    #[test]
    fn test_happy_path_completes_with_crm_update() {
        let sink = capture_sink();
        let (session, _) = ConversationSession::open(make_tree(), make_matcher(), ctx()).unwrap();
        let mut session = session.with_events(sink.clone());

        let reply = session.respond("sure").unwrap();
        assert_eq!(reply.lines[0], "We help local businesses get found.");
        assert_eq!(session.current_node(), Some("ask_interest"));

        session.respond("yes I'm interested").unwrap();
        let reply = session.respond("dana@harborbakery.test").unwrap();

        assert!(reply.completed);
        assert!(session.is_completed());
        assert_eq!(reply.side_effects[0].kind, ActionKind::UpdateCrm);
        assert_eq!(sink.count_type(EventType::DialogCompleted), 1);
        assert_eq!(session.respond("hello?").unwrap_err(), ConversationError::SessionCompleted);
    }

    #[test]
    fn test_objection_keeps_cursor() {
        let sink = capture_sink();
        let (session, _) = ConversationSession::open(make_tree(), make_matcher(), ctx()).unwrap();
        let mut session = session.with_events(sink.clone());
        session.respond("okay").unwrap();

        let reply = session.respond("sounds expensive").unwrap();
        assert_eq!(reply.objection_type.as_deref(), Some("price"));
        assert_eq!(reply.text(), "The trial is free, Dana.");
        assert_eq!(reply.side_effects[0].kind, ActionKind::SendInfo);
        assert_eq!(session.current_node(), Some("ask_interest"));
        assert_eq!(sink.count_type(EventType::ObjectionMatched), 1);
    }

    #[test]
    fn test_branch_wins_over_objection() {
        let (mut session, _) = ConversationSession::open(make_tree(), make_matcher(), ctx()).unwrap();
        session.respond("yes").unwrap();
        // "no" is a branch trigger of ask_interest, "budget" an objection keyword.
        let reply = session.respond("no, no budget").unwrap();
        assert!(reply.objection_type.is_none());
        assert!(reply.completed);
        assert_eq!(reply.side_effects[0].params["template"], "resources");
    }

    #[test]
    fn test_say_cycle_is_detected() {
        let tree = Arc::new(DialogTree::new(
            "loop",
            "initial_call",
            vec![
                DialogNode::say("start", "a", "again"),
                DialogNode::say("again", "b", "start"),
            ],
        ));
        let err = ConversationSession::open(tree, make_matcher(), ctx()).err().unwrap();
        assert!(matches!(err, ConversationError::CycleDetected { .. }));
    }

    #[test]
    fn test_transcript_records_both_sides() {
        let (mut session, _) = ConversationSession::open(make_tree(), make_matcher(), ctx()).unwrap();
        session.respond("not now").unwrap();
        let speakers: Vec<_> = session.transcript().iter().map(|e| e.speaker).collect();
        assert_eq!(
            speakers,
            vec![Speaker::Agent, Speaker::Agent, Speaker::Customer, Speaker::Agent]
        );
        assert_eq!(session.current_node(), Some("schedule_callback"));
    }
}
