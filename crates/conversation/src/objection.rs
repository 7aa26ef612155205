//! Keyword-triggered objection handlers and the priority matcher over them.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use lifecycle_core::types::{ActionKind, SideEffect};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ConversationError;
use crate::render::render;
use crate::trigger::{best_match, Utterance};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectionHandler {
    pub id: Uuid,
    pub objection_type: String,
    /// Human-readable label, unique together with `objection_type`.
    pub trigger_phrase: String,
    pub trigger_keywords: Vec<String>,
    pub response: String,
    #[serde(default)]
    pub follow_up: Option<String>,
    #[serde(default)]
    pub next_action: Option<ActionKind>,
    #[serde(default)]
    pub next_action_params: serde_json::Value,
    /// Higher wins.
    pub priority: i32,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl ObjectionHandler {
    pub fn new(
        objection_type: impl Into<String>,
        trigger_phrase: impl Into<String>,
        keywords: &[&str],
        response: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            objection_type: objection_type.into(),
            trigger_phrase: trigger_phrase.into(),
            trigger_keywords: keywords.iter().map(|k| k.to_string()).collect(),
            response: response.into(),
            follow_up: None,
            next_action: None,
            next_action_params: serde_json::Value::Null,
            priority,
            active: true,
            updated_at: Utc::now(),
        }
    }

    pub fn with_follow_up(mut self, follow_up: impl Into<String>) -> Self {
        self.follow_up = Some(follow_up.into());
        self
    }

    pub fn with_next_action(mut self, kind: ActionKind, params: serde_json::Value) -> Self {
        self.next_action = Some(kind);
        self.next_action_params = params;
        self
    }

    pub fn updated(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = at;
        self
    }

    pub fn side_effect(&self) -> Option<SideEffect> {
        self.next_action
            .map(|kind| SideEffect::new(kind, self.next_action_params.clone()))
    }
}

/// Rendered reply to a detected objection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectionResponse {
    pub handler_id: Uuid,
    pub objection_type: String,
    pub response: String,
    pub follow_up: Option<String>,
    pub side_effect: Option<SideEffect>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectionMatcher {
    handlers: Vec<ObjectionHandler>,
}

impl ObjectionMatcher {
    /// Rejects duplicate `(objection_type, trigger_phrase)` pairs and
    /// handlers without a usable keyword.
    pub fn new(handlers: Vec<ObjectionHandler>) -> Result<Self, ConversationError> {
        let mut seen = HashSet::new();
        for handler in &handlers {
            if !seen.insert((handler.objection_type.as_str(), handler.trigger_phrase.as_str())) {
                return Err(ConversationError::DuplicateHandler {
                    objection_type: handler.objection_type.clone(),
                    trigger_phrase: handler.trigger_phrase.clone(),
                });
            }
            if handler.trigger_keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(ConversationError::MalformedHandler(handler.objection_type.clone()));
            }
        }
        info!(handlers = handlers.len(), "Objection matcher loaded");
        Ok(Self { handlers })
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Highest-priority active handler with a keyword in the utterance. Ties
    /// go to the most recently updated handler, then to the lexically
    /// smallest `(objection_type, trigger_phrase)`.
    pub fn match_utterance(&self, utterance: &Utterance) -> Option<&ObjectionHandler> {
        let candidates = self
            .handlers
            .iter()
            .filter(|h| h.active)
            .map(|h| (h.trigger_keywords.as_slice(), h));

        let matched = best_match(utterance, candidates, |h| {
            (
                h.priority,
                h.updated_at,
                Reverse((h.objection_type.clone(), h.trigger_phrase.clone())),
            )
        });

        if let Some(handler) = matched {
            metrics::counter!("conversation.objections_matched").increment(1);
            debug!(
                objection_type = %handler.objection_type,
                priority = handler.priority,
                "Objection matched"
            );
        }
        matched
    }

    /// Matches and renders the handler's response against `context`.
    pub fn respond(&self, utterance: &Utterance, context: &HashMap<String, String>) -> Option<ObjectionResponse> {
        self.match_utterance(utterance).map(|handler| ObjectionResponse {
            handler_id: handler.id,
            objection_type: handler.objection_type.clone(),
            response: render(&handler.response, context),
            follow_up: handler.follow_up.as_ref().map(|f| render(f, context)),
            side_effect: handler.side_effect(),
        })
    }
}
