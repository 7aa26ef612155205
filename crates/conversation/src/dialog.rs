//! Dialog tree model and the stateless interpreter that walks it.

use std::collections::{HashMap, HashSet};

use lifecycle_core::types::{ActionKind, PipelineStage, SideEffect};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::ConversationError;
use crate::render::render;
use crate::trigger::Utterance;

pub const ENTRY_NODE: &str = "start";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Say,
    Ask,
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Branch {
    pub triggers: Vec<String>,
    pub next_node: String,
}

impl Branch {
    pub fn new(triggers: &[&str], next_node: impl Into<String>) -> Self {
        Self {
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            next_node: next_node.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialogNode {
    pub key: String,
    pub kind: NodeKind,
    pub content: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub default_next: Option<String>,
    #[serde(default)]
    pub action_type: Option<ActionKind>,
    #[serde(default)]
    pub action_params: serde_json::Value,
}

impl DialogNode {
    fn new(key: impl Into<String>, kind: NodeKind, content: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind,
            content: content.into(),
            prompt: None,
            branches: Vec::new(),
            default_next: None,
            action_type: None,
            action_params: serde_json::Value::Null,
        }
    }

    pub fn say(key: impl Into<String>, content: impl Into<String>, next: impl Into<String>) -> Self {
        Self::new(key, NodeKind::Say, content).then(next)
    }

    pub fn ask(key: impl Into<String>, content: impl Into<String>, next: impl Into<String>) -> Self {
        Self::new(key, NodeKind::Ask, content).then(next)
    }

    pub fn end(key: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(key, NodeKind::End, content)
    }

    pub fn then(mut self, next: impl Into<String>) -> Self {
        self.default_next = Some(next.into());
        self
    }

    pub fn with_branch(mut self, triggers: &[&str], next: impl Into<String>) -> Self {
        self.branches.push(Branch::new(triggers, next));
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_action(mut self, kind: ActionKind, params: serde_json::Value) -> Self {
        self.action_type = Some(kind);
        self.action_params = params;
        self
    }

    pub fn side_effect(&self) -> Option<SideEffect> {
        self.action_type
            .map(|kind| SideEffect::new(kind, self.action_params.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogTree {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub trigger_type: String,
    #[serde(default)]
    pub stage: Option<PipelineStage>,
    pub active: bool,
    pub nodes: Vec<DialogNode>,
}

impl DialogTree {
    pub fn new(slug: impl Into<String>, trigger_type: impl Into<String>, nodes: Vec<DialogNode>) -> Self {
        let slug = slug.into();
        Self {
            id: Uuid::new_v4(),
            name: slug.replace('-', " "),
            slug,
            trigger_type: trigger_type.into(),
            stage: None,
            active: true,
            nodes,
        }
    }

    pub fn for_stage(mut self, stage: PipelineStage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn node(&self, key: &str) -> Result<&DialogNode, ConversationError> {
        self.nodes
            .iter()
            .find(|n| n.key == key)
            .ok_or_else(|| ConversationError::UnknownNodeKey {
                tree: self.slug.clone(),
                key: key.to_string(),
            })
    }

    pub fn entry(&self) -> Result<&DialogNode, ConversationError> {
        self.node(ENTRY_NODE)
    }

    /// Checks the authoring invariants: unique keys, an entry node, every
    /// non-end node has somewhere to go, and every reference resolves.
    pub fn validate(&self) -> Result<(), ConversationError> {
        let malformed = |reason: String| ConversationError::MalformedTree {
            tree: self.slug.clone(),
            reason,
        };

        let mut keys = HashSet::new();
        for node in &self.nodes {
            if !keys.insert(node.key.as_str()) {
                return Err(malformed(format!("duplicate node key '{}'", node.key)));
            }
        }
        if !keys.contains(ENTRY_NODE) {
            return Err(malformed(format!("missing entry node '{ENTRY_NODE}'")));
        }

        for node in &self.nodes {
            if node.kind == NodeKind::End {
                if node.default_next.is_some() || !node.branches.is_empty() {
                    return Err(malformed(format!("end node '{}' has transitions", node.key)));
                }
                continue;
            }
            let next = node.default_next.as_deref().ok_or_else(|| {
                malformed(format!("node '{}' has no default_next", node.key))
            })?;
            let targets = std::iter::once(next).chain(node.branches.iter().map(|b| b.next_node.as_str()));
            for target in targets {
                if !keys.contains(target) {
                    return Err(ConversationError::UnknownNodeKey {
                        tree: self.slug.clone(),
                        key: target.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Result of one interpreter step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DialogStep {
    pub node_key: String,
    pub rendered: String,
    pub prompt: Option<String>,
    /// `None` once an end node has been reached.
    pub next_node: Option<String>,
    pub matched_trigger: Option<String>,
    pub side_effect: Option<SideEffect>,
    pub completed: bool,
}

/// Stateless walker; the caller owns the current node key.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialogInterpreter;

impl DialogInterpreter {
    pub fn new() -> Self {
        Self
    }

    /// Renders `current_key` and decides where the conversation goes next.
    /// Ask nodes pick the first branch, in authored order, with a trigger in
    /// the utterance, falling back to `default_next`.
    pub fn step(
        &self,
        tree: &DialogTree,
        current_key: &str,
        utterance: &Utterance,
        context: &HashMap<String, String>,
    ) -> Result<DialogStep, ConversationError> {
        let node = tree.node(current_key)?;
        let rendered = render(&node.content, context);

        let (next_node, matched_trigger, completed) = match node.kind {
            NodeKind::End => (None, None, true),
            NodeKind::Ask if !node.branches.is_empty() => match self.match_branch(node, utterance) {
                Some((branch, trigger)) => (Some(branch.next_node.clone()), Some(trigger.to_string()), false),
                None => (node.default_next.clone(), None, false),
            },
            NodeKind::Ask | NodeKind::Say => (node.default_next.clone(), None, false),
        };

        if !completed {
            let next = next_node.as_deref().unwrap_or_default();
            tree.node(next)?;
        }

        debug!(
            tree = %tree.slug,
            node = %node.key,
            next = ?next_node,
            trigger = ?matched_trigger,
            "Dialog step"
        );

        Ok(DialogStep {
            node_key: node.key.clone(),
            rendered,
            prompt: node.prompt.clone(),
            next_node,
            matched_trigger,
            side_effect: node.side_effect(),
            completed,
        })
    }

    /// First branch of an ask node whose triggers appear in the utterance.
    pub fn match_branch<'a>(&self, node: &'a DialogNode, utterance: &Utterance) -> Option<(&'a Branch, &'a str)> {
        if node.kind != NodeKind::Ask {
            return None;
        }
        node.branches
            .iter()
            .find_map(|b| utterance.first_trigger(&b.triggers).map(|t| (b, t)))
    }

    /// Renders a node without transitioning, for presenting the current
    /// question to the customer.
    pub fn present(
        &self,
        tree: &DialogTree,
        key: &str,
        context: &HashMap<String, String>,
    ) -> Result<String, ConversationError> {
        tree.node(key).map(|node| render(&node.content, context))
    }
}
