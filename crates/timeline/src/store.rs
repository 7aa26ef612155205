use std::sync::Arc;

use dashmap::DashMap;
use lifecycle_core::types::PipelineStage;
use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::TimelineError;
use crate::types::TimelineDefinition;

/// Versioned timeline definitions. Published definitions are never edited:
/// a new revision for a stage is stored alongside the old one, which is only
/// deactivated so in-flight progress keeps reading the schedule it started on.
pub struct TimelineStore {
    definitions: DashMap<Uuid, Arc<TimelineDefinition>>,
    publish_lock: Mutex<()>,
}

impl std::fmt::Debug for TimelineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineStore")
            .field("definitions", &self.definitions.len())
            .finish()
    }
}

impl TimelineStore {
    pub fn new() -> Self {
        Self {
            definitions: DashMap::new(),
            publish_lock: Mutex::new(()),
        }
    }

    /// Validates and stores a definition, assigning the next version for its
    /// stage. An active definition replaces the stage's current active one
    /// only when `replace_active` is set.
    pub fn publish(
        &self,
        mut definition: TimelineDefinition,
        replace_active: bool,
    ) -> Result<Arc<TimelineDefinition>, TimelineError> {
        definition.validate()?;
        let _guard = self.publish_lock.lock();

        let stage = definition.stage;
        definition.version = self
            .definitions
            .iter()
            .filter(|d| d.stage == stage)
            .map(|d| d.version)
            .max()
            .map_or(1, |v| v + 1);

        if definition.active {
            if let Some(current) = self.active_for_stage(stage) {
                if !replace_active {
                    return Err(TimelineError::StageAlreadyActive(stage));
                }
                let mut retired = (*current).clone();
                retired.active = false;
                warn!(
                    timeline_id = %retired.id,
                    stage = %stage,
                    version = retired.version,
                    "Deactivating previous timeline"
                );
                self.definitions.insert(retired.id, Arc::new(retired));
            }
        }

        info!(
            timeline_id = %definition.id,
            stage = %stage,
            version = definition.version,
            actions = definition.actions.len(),
            "Published timeline"
        );
        let stored = Arc::new(definition);
        self.definitions.insert(stored.id, stored.clone());
        Ok(stored)
    }

    /// Loads previously published definitions unchanged, ids and versions
    /// included. At most one of them may be active per stage.
    pub fn restore(&self, definitions: Vec<TimelineDefinition>) -> Result<usize, TimelineError> {
        let _guard = self.publish_lock.lock();
        let count = definitions.len();
        for definition in definitions {
            definition.validate()?;
            if definition.active {
                if let Some(current) = self.active_for_stage(definition.stage) {
                    if current.id != definition.id {
                        return Err(TimelineError::StageAlreadyActive(definition.stage));
                    }
                }
            }
            self.definitions.insert(definition.id, Arc::new(definition));
        }
        info!(definitions = count, "Restored timelines");
        Ok(count)
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<TimelineDefinition>> {
        self.definitions.get(id).map(|r| r.value().clone())
    }

    pub fn active_for_stage(&self, stage: PipelineStage) -> Option<Arc<TimelineDefinition>> {
        self.definitions
            .iter()
            .find(|r| r.stage == stage && r.active)
            .map(|r| r.value().clone())
    }

    pub fn list(&self) -> Vec<Arc<TimelineDefinition>> {
        let mut all: Vec<_> = self.definitions.iter().map(|r| r.value().clone()).collect();
        all.sort_by_key(|d| (d.stage, d.version));
        all
    }
}

impl Default for TimelineStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimelineAction;
    use lifecycle_core::types::{ActionKind, Channel};

    fn make_definition(stage: PipelineStage) -> TimelineDefinition {
        TimelineDefinition::new(
            stage,
            30,
            vec![TimelineAction::new(1, Channel::Email, ActionKind::SendEmail)],
        )
    }

    #[test]
    fn test_one_active_definition_per_stage() {
        let store = TimelineStore::new();
        let first = store.publish(make_definition(PipelineStage::Hook), false).unwrap();
        assert_eq!(first.version, 1);

        let err = store.publish(make_definition(PipelineStage::Hook), false).unwrap_err();
        assert!(matches!(err, TimelineError::StageAlreadyActive(PipelineStage::Hook)));

        let second = store.publish(make_definition(PipelineStage::Hook), true).unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(store.active_for_stage(PipelineStage::Hook).unwrap().id, second.id);

        // Retired revision is still readable with its schedule intact.
        let retired = store.get(&first.id).unwrap();
        assert!(!retired.active);
        assert_eq!(retired.actions.len(), 1);
    }

    #[test]
    fn test_restore_keeps_versions_and_blocks_second_active() {
        let source = TimelineStore::new();
        source.publish(make_definition(PipelineStage::Hook), false).unwrap();
        let current = source.publish(make_definition(PipelineStage::Hook), true).unwrap();
        let saved: Vec<TimelineDefinition> = source.list().iter().map(|d| (**d).clone()).collect();

        let store = TimelineStore::new();
        assert_eq!(store.restore(saved).unwrap(), 2);
        let active = store.active_for_stage(PipelineStage::Hook).unwrap();
        assert_eq!((active.id, active.version), (current.id, 2));

        // The next publish continues the version sequence.
        let next = store.publish(make_definition(PipelineStage::Hook), true).unwrap();
        assert_eq!(next.version, 3);

        let conflicting = make_definition(PipelineStage::Hook);
        assert!(matches!(
            store.restore(vec![conflicting]),
            Err(TimelineError::StageAlreadyActive(PipelineStage::Hook))
        ));
    }

    #[test]
    fn test_stages_are_independent() {
        let store = TimelineStore::new();
        store.publish(make_definition(PipelineStage::Hook), false).unwrap();
        store.publish(make_definition(PipelineStage::Sales), false).unwrap();
        assert!(store.active_for_stage(PipelineStage::Retention).is_none());
        assert_eq!(store.list().len(), 2);
    }

    #[test]
    fn test_invalid_definition_is_not_stored() {
        let store = TimelineStore::new();
        let bad = TimelineDefinition::new(
            PipelineStage::Hook,
            3,
            vec![TimelineAction::new(9, Channel::Email, ActionKind::SendEmail)],
        );
        assert!(store.publish(bad, false).is_err());
        assert!(store.list().is_empty());
    }
}
