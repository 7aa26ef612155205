use serde::{Deserialize, Serialize};

use crate::error::TimelineError;
use crate::types::ProgressStatus;

/// Describes a single valid status transition for timeline progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: ProgressStatus,
    pub to: ProgressStatus,
    pub trigger: &'static str,
}

/// Guards the progress lifecycle: only `Active` may move, and only forward.
#[derive(Debug, Clone)]
pub struct ProgressStateMachine {
    transitions: Vec<StatusTransition>,
}

impl ProgressStateMachine {
    pub fn new() -> Self {
        let transitions = vec![
            StatusTransition {
                from: ProgressStatus::Active,
                to: ProgressStatus::Completed,
                trigger: "final_day_closed",
            },
            StatusTransition {
                from: ProgressStatus::Active,
                to: ProgressStatus::Paused,
                trigger: "pause",
            },
            StatusTransition {
                from: ProgressStatus::Active,
                to: ProgressStatus::Cancelled,
                trigger: "cancel",
            },
        ];
        Self { transitions }
    }

    pub fn can_transition(&self, from: ProgressStatus, to: ProgressStatus) -> bool {
        self.transitions.iter().any(|t| t.from == from && t.to == to)
    }

    /// Moves `status` to `to`, or fails without touching it.
    pub fn transition(
        &self,
        status: &mut ProgressStatus,
        to: ProgressStatus,
    ) -> Result<(), TimelineError> {
        if self.can_transition(*status, to) {
            *status = to;
            Ok(())
        } else {
            Err(TimelineError::InvalidTransition { from: *status, to })
        }
    }
}

impl Default for ProgressStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_from_active() {
        let sm = ProgressStateMachine::new();
        for to in [
            ProgressStatus::Completed,
            ProgressStatus::Paused,
            ProgressStatus::Cancelled,
        ] {
            let mut status = ProgressStatus::Active;
            sm.transition(&mut status, to).unwrap();
            assert_eq!(status, to);
        }
    }

    #[test]
    fn test_no_backward_transitions() {
        let sm = ProgressStateMachine::new();
        let mut status = ProgressStatus::Paused;
        let err = sm.transition(&mut status, ProgressStatus::Active).unwrap_err();
        assert!(matches!(err, TimelineError::InvalidTransition { .. }));
        assert_eq!(status, ProgressStatus::Paused);

        assert!(!sm.can_transition(ProgressStatus::Completed, ProgressStatus::Active));
        assert!(!sm.can_transition(ProgressStatus::Cancelled, ProgressStatus::Paused));
    }
}
