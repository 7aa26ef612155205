//! Read-only source of dialog trees and objection handlers.

use dashmap::DashMap;
use lifecycle_core::types::PipelineStage;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

use crate::dialog::DialogTree;
use crate::error::ConversationError;
use crate::objection::{ObjectionHandler, ObjectionMatcher};

pub trait ConversationCatalog: Send + Sync {
    fn dialog_trees(&self) -> Vec<Arc<DialogTree>>;

    fn objection_handlers(&self) -> Vec<ObjectionHandler>;

    /// Active tree for a trigger type, preferring one bound to `stage` over a
    /// stage-agnostic one.
    fn find_for_context(&self, trigger_type: &str, stage: Option<PipelineStage>) -> Option<Arc<DialogTree>> {
        let candidates: Vec<_> = self
            .dialog_trees()
            .into_iter()
            .filter(|t| t.active && t.trigger_type == trigger_type)
            .collect();

        stage
            .and_then(|s| candidates.iter().find(|t| t.stage == Some(s)).cloned())
            .or_else(|| candidates.iter().find(|t| t.stage.is_none()).cloned())
    }

    fn matcher(&self) -> Result<ObjectionMatcher, ConversationError> {
        ObjectionMatcher::new(self.objection_handlers())
    }
}

/// Catalog held in memory, loaded from seed data or tests.
#[derive(Default)]
pub struct InMemoryCatalog {
    trees: DashMap<String, Arc<DialogTree>>,
    handlers: RwLock<Vec<ObjectionHandler>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores a tree, replacing any tree with the same slug.
    pub fn add_tree(&self, tree: DialogTree) -> Result<(), ConversationError> {
        tree.validate()?;
        info!(slug = %tree.slug, nodes = tree.nodes.len(), "Dialog tree registered");
        self.trees.insert(tree.slug.clone(), Arc::new(tree));
        Ok(())
    }

    /// Replaces the handler set; the whole set must form a valid matcher.
    pub fn set_handlers(&self, handlers: Vec<ObjectionHandler>) -> Result<(), ConversationError> {
        ObjectionMatcher::new(handlers.clone())?;
        *self.handlers.write() = handlers;
        Ok(())
    }
}

impl ConversationCatalog for InMemoryCatalog {
    fn dialog_trees(&self) -> Vec<Arc<DialogTree>> {
        let mut trees: Vec<_> = self.trees.iter().map(|e| e.value().clone()).collect();
        trees.sort_by(|a, b| a.slug.cmp(&b.slug));
        trees
    }

    fn objection_handlers(&self) -> Vec<ObjectionHandler> {
        self.handlers.read().clone()
    }
}
