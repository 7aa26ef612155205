//! Day-advancement algorithm for a customer's timeline progress.
//!
//! Every function here is a synchronous transition over explicit inputs and is
//! safe to re-run: resolution is set-based and advancement is gated on both
//! resolution and elapsed wall-clock time, so redelivered sweeps never
//! double-apply.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TimelineError;
use crate::guard::{GuardDecision, GuardEvaluator};
use crate::state_machine::ProgressStateMachine;
use crate::types::{ActionOutcome, ProgressStatus, TimelineAction, TimelineDefinition, TimelineProgress};

/// Result of `resolve_action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Recorded,
    /// The action was already completed or skipped; nothing changed.
    AlreadyResolved,
}

/// Result of `try_advance_day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Unresolved actions remain or the day has not closed yet.
    NotReady,
    Advanced { from: u32, to: u32 },
    Completed,
    /// Progress is paused, cancelled or already completed.
    Inactive,
}

fn ensure_same_timeline(
    progress: &TimelineProgress,
    definition: &TimelineDefinition,
) -> Result<(), TimelineError> {
    if progress.timeline_id != definition.id {
        return Err(TimelineError::TimelineMismatch {
            expected: progress.timeline_id,
            found: definition.id,
        });
    }
    Ok(())
}

/// Records `action_id` as completed or skipped.
///
/// The action must belong to the current day's active action set. Resolving
/// an action twice is a no-op that reports `AlreadyResolved`; an action never
/// moves between the completed and skipped sets.
pub fn resolve_action(
    progress: &mut TimelineProgress,
    definition: &TimelineDefinition,
    action_id: Uuid,
    outcome: ActionOutcome,
) -> Result<ResolveOutcome, TimelineError> {
    ensure_same_timeline(progress, definition)?;

    let scheduled_today = definition
        .actions_for_day(progress.current_day)
        .iter()
        .any(|a| a.id == action_id);
    if !scheduled_today {
        return Err(TimelineError::UnknownAction {
            action_id,
            timeline_id: definition.id,
            day: progress.current_day,
        });
    }

    if progress.is_resolved(&action_id) {
        debug!(
            customer_id = %progress.customer_id,
            action_id = %action_id,
            "Action already resolved"
        );
        return Ok(ResolveOutcome::AlreadyResolved);
    }

    match outcome {
        ActionOutcome::Completed => {
            progress.completed_actions.insert(action_id);
            metrics::counter!("timeline.actions_completed").increment(1);
        }
        ActionOutcome::Skipped => {
            progress.skipped_actions.insert(action_id);
            metrics::counter!("timeline.actions_skipped").increment(1);
        }
    }
    progress.dispatch_attempts.remove(&action_id);

    debug!(
        customer_id = %progress.customer_id,
        action_id = %action_id,
        ?outcome,
        day = progress.current_day,
        "Action resolved"
    );
    Ok(ResolveOutcome::Recorded)
}

/// Actions still owed on the current day, in execution order.
///
/// Returns nothing unless the progress is active. Actions whose guard says
/// skip are recorded as skipped and left out. A guard that fails to evaluate
/// is treated as proceed.
pub fn actions_due_today(
    progress: &mut TimelineProgress,
    definition: &TimelineDefinition,
    guard: &dyn GuardEvaluator,
) -> Result<Vec<TimelineAction>, TimelineError> {
    ensure_same_timeline(progress, definition)?;

    if !progress.is_active() || progress.is_finished(definition.duration_days) {
        return Ok(Vec::new());
    }

    let mut due = Vec::new();
    for action in definition.actions_for_day(progress.current_day) {
        if progress.is_resolved(&action.id) {
            continue;
        }

        let decision = match &action.conditions {
            None => GuardDecision::Proceed,
            Some(condition) => match guard.evaluate(condition, &progress.customer_id) {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(
                        customer_id = %progress.customer_id,
                        action_id = %action.id,
                        error = %e,
                        "Guard evaluation failed, proceeding with action"
                    );
                    GuardDecision::Proceed
                }
            },
        };

        if decision == GuardDecision::Skip {
            progress.skipped_actions.insert(action.id);
            progress.dispatch_attempts.remove(&action.id);
            metrics::counter!("timeline.actions_skipped").increment(1);
            info!(
                customer_id = %progress.customer_id,
                action_id = %action.id,
                day = progress.current_day,
                "Action skipped by guard"
            );
            continue;
        }

        due.push(action.clone());
    }

    Ok(due)
}

/// Moves the cursor past the current day once every active action on it is
/// resolved and the day has closed (`now >= started_at + current_day days`).
///
/// The cursor jumps to the next day that has actions, or to the final day
/// when none remain; leaving the final day completes the timeline.
pub fn try_advance_day(
    progress: &mut TimelineProgress,
    definition: &TimelineDefinition,
    now: DateTime<Utc>,
) -> Result<Advance, TimelineError> {
    ensure_same_timeline(progress, definition)?;

    if !progress.is_active() {
        return Ok(Advance::Inactive);
    }

    let duration = definition.duration_days;
    if progress.current_day > duration {
        complete(progress, now)?;
        return Ok(Advance::Completed);
    }

    let all_resolved = definition
        .actions_for_day(progress.current_day)
        .iter()
        .all(|a| progress.is_resolved(&a.id));
    if !all_resolved || now < progress.current_day_closes_at() {
        return Ok(Advance::NotReady);
    }

    if progress.current_day >= duration {
        complete(progress, now)?;
        return Ok(Advance::Completed);
    }

    let from = progress.current_day;
    let to = definition
        .next_defined_day(from)
        .map_or(duration, |day| day.min(duration));
    progress.current_day = to;
    metrics::counter!("timeline.day_advances").increment(1);
    info!(
        customer_id = %progress.customer_id,
        timeline_id = %progress.timeline_id,
        from,
        to,
        "Advanced timeline day"
    );
    Ok(Advance::Advanced { from, to })
}

fn complete(progress: &mut TimelineProgress, now: DateTime<Utc>) -> Result<(), TimelineError> {
    ProgressStateMachine::new().transition(&mut progress.status, ProgressStatus::Completed)?;
    progress.finished_at = Some(now);
    metrics::counter!("timeline.completions").increment(1);
    info!(
        customer_id = %progress.customer_id,
        timeline_id = %progress.timeline_id,
        day = progress.current_day,
        "Timeline completed"
    );
    Ok(())
}

pub fn pause(progress: &mut TimelineProgress, now: DateTime<Utc>) -> Result<(), TimelineError> {
    ProgressStateMachine::new().transition(&mut progress.status, ProgressStatus::Paused)?;
    progress.paused_at = Some(now);
    info!(customer_id = %progress.customer_id, timeline_id = %progress.timeline_id, "Timeline paused");
    Ok(())
}

pub fn cancel(progress: &mut TimelineProgress, now: DateTime<Utc>) -> Result<(), TimelineError> {
    ProgressStateMachine::new().transition(&mut progress.status, ProgressStatus::Cancelled)?;
    progress.finished_at = Some(now);
    info!(customer_id = %progress.customer_id, timeline_id = %progress.timeline_id, "Timeline cancelled");
    Ok(())
}

/// Counts a failed dispatch of an unresolved action and returns the total.
pub fn record_dispatch_failure(progress: &mut TimelineProgress, action_id: Uuid) -> u32 {
    let attempts = progress.dispatch_attempts.entry(action_id).or_insert(0);
    *attempts += 1;
    *attempts
}
