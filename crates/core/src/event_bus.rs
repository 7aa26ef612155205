//! Lifecycle event bus: a sink trait for events emitted by every engine.
//!
//! Engines accept an `Arc<dyn EventSink>` so the host can forward events to
//! whatever analytics or audit pipeline it runs.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Timeline events
    TimelineStarted,
    ActionCompleted,
    ActionSkipped,
    ActionDispatchFailed,
    DayAdvanced,
    TimelineCompleted,
    TimelinePaused,
    TimelineCancelled,
    // Engagement events
    EngagementChanged,
    TierUpgraded,
    TierDowngraded,
    // Conversation events
    ObjectionMatched,
    DialogCompleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    /// Entity the event is about (timeline, action, tree or handler id).
    pub subject: String,
    pub customer_id: Option<Uuid>,
    pub detail: serde_json::Value,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Trait for emitting lifecycle events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LifecycleEvent);
}

/// No-op sink for tests and engines that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: LifecycleEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: LifecycleEvent) {
        self.events.lock().push(event);
    }
}

/// Convenience builder for creating a `LifecycleEvent` with minimal boilerplate.
pub fn make_event(
    event_type: EventType,
    subject: impl Into<String>,
    customer_id: Option<Uuid>,
    detail: serde_json::Value,
) -> LifecycleEvent {
    LifecycleEvent {
        event_id: Uuid::new_v4(),
        event_type,
        subject: subject.into(),
        customer_id,
        detail,
        timestamp: Utc::now(),
    }
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        let customer = Uuid::new_v4();
        sink.emit(make_event(
            EventType::ActionCompleted,
            "action-1",
            Some(customer),
            serde_json::json!({"day": 1}),
        ));
        sink.emit(make_event(
            EventType::DayAdvanced,
            "timeline-1",
            Some(customer),
            serde_json::json!({"from": 1, "to": 3}),
        ));

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_type(EventType::ActionCompleted), 1);
        assert_eq!(sink.count_type(EventType::DayAdvanced), 1);

        let events = sink.events();
        assert_eq!(events[0].subject, "action-1");
        assert_eq!(events[1].detail["to"], 3);

        sink.clear();
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_noop_sink() {
        let sink = noop_sink();
        sink.emit(make_event(
            EventType::TimelineStarted,
            "timeline-1",
            None,
            serde_json::Value::Null,
        ));
    }
}
