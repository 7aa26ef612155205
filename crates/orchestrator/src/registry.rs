//! Side-effect registry: maps each `ActionKind` to the handler that carries
//! it out.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use lifecycle_core::ports::{EffectContext, SideEffectExecutor};
use lifecycle_core::types::{ActionKind, SideEffect};
use serde_json::Value;
use tracing::info;

#[async_trait]
pub trait SideEffectHandler: Send + Sync {
    async fn handle(&self, effect: &SideEffect, ctx: &EffectContext) -> anyhow::Result<Value>;
}

pub struct SideEffectRegistry {
    handlers: HashMap<ActionKind, Arc<dyn SideEffectHandler>>,
}

impl SideEffectRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with `handler` bound to every action kind.
    pub fn uniform(handler: Arc<dyn SideEffectHandler>) -> Self {
        let mut registry = Self::new();
        for kind in ActionKind::all() {
            registry.register(kind, Arc::clone(&handler));
        }
        registry
    }

    pub fn register(&mut self, kind: ActionKind, handler: Arc<dyn SideEffectHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for SideEffectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SideEffectExecutor for SideEffectRegistry {
    async fn execute(&self, effect: &SideEffect, ctx: &EffectContext) -> anyhow::Result<Value> {
        let handler = self
            .handlers
            .get(&effect.kind)
            .ok_or_else(|| anyhow::anyhow!("No handler registered for {}", effect.kind))?;
        tracing::trace!(kind = %effect.kind, origin = %ctx.origin, "Executing side effect");
        handler.handle(effect, ctx).await
    }
}

/// Logs the effect and reports it as accepted.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl SideEffectHandler for LoggingHandler {
    async fn handle(&self, effect: &SideEffect, ctx: &EffectContext) -> anyhow::Result<Value> {
        info!(
            customer_id = %ctx.customer_id,
            kind = %effect.kind,
            origin = %ctx.origin,
            params = %effect.params,
            "Side effect accepted"
        );
        Ok(serde_json::json!({ "type": effect.kind, "accepted": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(ActionKind, String)>>,
    }

    #[async_trait]
    impl SideEffectHandler for Recorder {
        async fn handle(&self, effect: &SideEffect, ctx: &EffectContext) -> anyhow::Result<Value> {
            self.seen.lock().push((effect.kind, ctx.origin.clone()));
            Ok(json!({"ok": true}))
        }
    }

    #[tokio::test]
    async fn test_routes_by_kind() {
        let recorder = Arc::new(Recorder::default());
        let mut registry = SideEffectRegistry::new();
        registry.register(ActionKind::ScheduleCallback, recorder.clone());

        let ctx = EffectContext::new(Uuid::new_v4(), "dialog:initial-call/confirm_callback");
        let effect = SideEffect::new(ActionKind::ScheduleCallback, json!({"delay_hours": 24}));
        registry.execute(&effect, &ctx).await.unwrap();

        assert_eq!(
            recorder.seen.lock().clone(),
            vec![(ActionKind::ScheduleCallback, "dialog:initial-call/confirm_callback".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_an_error() {
        let registry = SideEffectRegistry::new();
        let ctx = EffectContext::new(Uuid::new_v4(), "test");
        let err = registry
            .execute(&SideEffect::new(ActionKind::UpdateCrm, Value::Null), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("update_crm"));
    }

    #[tokio::test]
    async fn test_uniform_covers_every_kind() {
        let registry = SideEffectRegistry::uniform(Arc::new(LoggingHandler));
        assert_eq!(registry.len(), ActionKind::all().len());
        let ctx = EffectContext::new(Uuid::new_v4(), "test");
        let out = registry
            .execute(&SideEffect::new(ActionKind::SendInfo, json!({"template": "free_tips"})), &ctx)
            .await
            .unwrap();
        assert_eq!(out["accepted"], true);
    }
}
