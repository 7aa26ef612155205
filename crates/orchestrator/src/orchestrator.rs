use std::sync::Arc;

use lifecycle_core::clock::Clock;
use lifecycle_core::config::{AppConfig, OrchestratorConfig};
use lifecycle_core::event_bus::{make_event, noop_sink, EventSink, EventType};
use lifecycle_core::ports::{ActivityHistoryProvider, CustomerDirectory, EffectContext, SideEffectExecutor};
use lifecycle_core::types::{ActionKind, Customer, EngagementProfile};
use lifecycle_engagement::{EngagementScorer, TierChange, TierDirection, TierTransitionEngine};
use lifecycle_timeline::progress::{self, record_dispatch_failure};
use lifecycle_timeline::{
    actions_due_today, resolve_action, try_advance_day, ActionOutcome, Advance, GuardEvaluator,
    TimelineAction, TimelineDefinition, TimelineProgress, TimelineStore,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::guard::ActivityGuardEvaluator;
use crate::locks::{CustomerLease, CustomerLocks};
use crate::ports::{ChannelDispatcher, ProgressRepository};
use crate::sweeps::SweepReport;

/// Everything the orchestrator reads from or hands work to.
pub struct Collaborators {
    pub timelines: Arc<TimelineStore>,
    pub progress: Arc<dyn ProgressRepository>,
    pub customers: Arc<dyn CustomerDirectory>,
    pub activity: Arc<dyn ActivityHistoryProvider>,
    pub dispatcher: Arc<dyn ChannelDispatcher>,
    pub effects: Arc<dyn SideEffectExecutor>,
    pub clock: Arc<dyn Clock>,
}

/// Drives customer timelines and engagement tiers. Cheap to clone; clones
/// share collaborators and the per-customer lock table.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) config: OrchestratorConfig,
    timelines: Arc<TimelineStore>,
    pub(crate) progress: Arc<dyn ProgressRepository>,
    pub(crate) customers: Arc<dyn CustomerDirectory>,
    activity: Arc<dyn ActivityHistoryProvider>,
    dispatcher: Arc<dyn ChannelDispatcher>,
    effects: Arc<dyn SideEffectExecutor>,
    guard: Arc<dyn GuardEvaluator>,
    clock: Arc<dyn Clock>,
    scorer: EngagementScorer,
    tiers: Arc<TierTransitionEngine>,
    locks: CustomerLocks,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("timelines", &self.timelines)
            .field("held_customers", &self.locks.held_count())
            .finish()
    }
}

/// Dispatched through a channel rather than the side-effect executor.
fn is_channel_send(kind: ActionKind) -> bool {
    matches!(kind, ActionKind::SendEmail | ActionKind::SendSms | ActionKind::MakeCall)
}

impl Orchestrator {
    pub fn new(config: &AppConfig, deps: Collaborators) -> Result<Self, OrchestratorError> {
        let scorer = EngagementScorer::new(&config.engagement);
        let tiers = TierTransitionEngine::new(&config.tiers)?;
        let guard = Arc::new(ActivityGuardEvaluator::new(
            Arc::clone(&deps.activity),
            Arc::clone(&deps.customers),
            scorer.clone(),
            Arc::clone(&deps.clock),
        ));

        info!(
            chunk_size = config.orchestrator.chunk_size,
            max_workers = config.orchestrator.max_workers,
            "Lifecycle orchestrator initialized"
        );

        Ok(Self {
            config: config.orchestrator.clone(),
            timelines: deps.timelines,
            progress: deps.progress,
            customers: deps.customers,
            activity: deps.activity,
            dispatcher: deps.dispatcher,
            effects: deps.effects,
            guard,
            clock: deps.clock,
            scorer,
            tiers: Arc::new(tiers),
            locks: CustomerLocks::new(),
            event_sink: noop_sink(),
        })
    }

    /// Attach an event sink for emitting lifecycle events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Replace the activity-backed guard evaluator.
    pub fn with_guard(mut self, guard: Arc<dyn GuardEvaluator>) -> Self {
        self.guard = guard;
        self
    }

    pub fn locks(&self) -> &CustomerLocks {
        &self.locks
    }

    pub fn timelines(&self) -> &TimelineStore {
        &self.timelines
    }

    pub(crate) fn emit(&self, event_type: EventType, subject: impl Into<String>, customer_id: Uuid, detail: Value) {
        self.event_sink
            .emit(make_event(event_type, subject, Some(customer_id), detail));
    }

    fn lease(&self, customer_id: Uuid) -> Result<CustomerLease, OrchestratorError> {
        self.locks
            .try_acquire(customer_id)
            .ok_or(OrchestratorError::CustomerBusy(customer_id))
    }

    fn customer(&self, customer_id: Uuid) -> Result<Customer, OrchestratorError> {
        self.customers
            .get(&customer_id)
            .ok_or(OrchestratorError::CustomerNotFound(customer_id))
    }

    fn definition(&self, timeline_id: Uuid) -> Result<Arc<TimelineDefinition>, OrchestratorError> {
        self.timelines
            .get(&timeline_id)
            .ok_or(OrchestratorError::TimelineNotFound(timeline_id))
    }

    pub fn progress(&self, customer_id: Uuid, timeline_id: Uuid) -> Result<Option<TimelineProgress>, OrchestratorError> {
        Ok(self.progress.get(&customer_id, &timeline_id)?)
    }

    // ─── Timeline assignment ────────────────────────────────────────────

    /// Puts a customer on a timeline at day 1. Returns the existing progress
    /// unchanged when the customer is already active on it; a finished or
    /// cancelled run is replaced by a fresh one.
    pub fn start_timeline(&self, customer_id: Uuid, timeline_id: Uuid) -> Result<TimelineProgress, OrchestratorError> {
        let _lease = self.lease(customer_id)?;
        self.customer(customer_id)?;
        let definition = self.definition(timeline_id)?;
        if !definition.active {
            return Err(OrchestratorError::TimelineInactive(timeline_id));
        }

        if let Some(existing) = self.progress.get(&customer_id, &timeline_id)? {
            if existing.is_active() {
                debug!(customer_id = %customer_id, timeline_id = %timeline_id, "Customer already on timeline");
                return Ok(existing);
            }
        }

        let progress = TimelineProgress::start(customer_id, timeline_id, self.clock.now());
        self.progress.save(&progress)?;
        self.emit(
            EventType::TimelineStarted,
            timeline_id.to_string(),
            customer_id,
            json!({ "stage": definition.stage, "version": definition.version }),
        );
        info!(
            customer_id = %customer_id,
            timeline = %definition.name,
            stage = %definition.stage,
            "Started customer on timeline"
        );
        Ok(progress)
    }

    /// Starts the active timeline for the customer's current stage. `None`
    /// when the stage has no active timeline.
    pub fn assign_timeline_for_stage(&self, customer_id: Uuid) -> Result<Option<TimelineProgress>, OrchestratorError> {
        let customer = self.customer(customer_id)?;
        match self.timelines.active_for_stage(customer.stage) {
            Some(definition) => self.start_timeline(customer_id, definition.id).map(Some),
            None => {
                warn!(stage = %customer.stage, customer_id = %customer_id, "No active timeline found for stage");
                Ok(None)
            }
        }
    }

    pub fn pause(&self, customer_id: Uuid, timeline_id: Uuid) -> Result<TimelineProgress, OrchestratorError> {
        self.stop(customer_id, timeline_id, EventType::TimelinePaused)
    }

    pub fn cancel(&self, customer_id: Uuid, timeline_id: Uuid) -> Result<TimelineProgress, OrchestratorError> {
        self.stop(customer_id, timeline_id, EventType::TimelineCancelled)
    }

    fn stop(&self, customer_id: Uuid, timeline_id: Uuid, event_type: EventType) -> Result<TimelineProgress, OrchestratorError> {
        let _lease = self.lease(customer_id)?;
        let mut progress = self
            .progress
            .get(&customer_id, &timeline_id)?
            .ok_or(OrchestratorError::ProgressNotFound { customer_id, timeline_id })?;

        let now = self.clock.now();
        if event_type == EventType::TimelinePaused {
            progress::pause(&mut progress, now)?;
        } else {
            progress::cancel(&mut progress, now)?;
        }
        self.progress.save(&progress)?;
        self.emit(
            event_type,
            timeline_id.to_string(),
            customer_id,
            json!({ "day": progress.current_day }),
        );
        Ok(progress)
    }

    // ─── Per-customer sweep work ────────────────────────────────────────

    /// Executes every due action of the customer's active timelines whose
    /// delay has elapsed. Failed dispatches stay unresolved for the next
    /// sweep until the attempt cap, after which they are skipped.
    pub(crate) async fn dispatch_for_customer(&self, customer_id: Uuid) -> Result<SweepReport, OrchestratorError> {
        let mut report = SweepReport::default();
        let Some(_lease) = self.locks.try_acquire(customer_id) else {
            report.busy += 1;
            return Ok(report);
        };
        let customer = self.customer(customer_id)?;
        let now = self.clock.now();

        for mut progress in self.progress.for_customer(&customer_id)? {
            if !progress.is_active() {
                continue;
            }
            let definition = self.definition(progress.timeline_id)?;

            let skipped_before = progress.skipped_actions.clone();
            let due = actions_due_today(&mut progress, &definition, self.guard.as_ref())?;
            for action_id in progress.skipped_actions.difference(&skipped_before) {
                report.skipped += 1;
                self.emit(
                    EventType::ActionSkipped,
                    action_id.to_string(),
                    customer_id,
                    json!({ "reason": "guard", "day": progress.current_day }),
                );
            }

            for action in due {
                if now < progress.action_due_at(&action) {
                    report.waiting += 1;
                    continue;
                }
                match self.execute_action(&action, &customer, &progress).await {
                    Ok(result) => {
                        resolve_action(&mut progress, &definition, action.id, ActionOutcome::Completed)?;
                        report.dispatched += 1;
                        self.emit(
                            EventType::ActionCompleted,
                            action.id.to_string(),
                            customer_id,
                            json!({ "kind": action.action_type, "day": action.day_number, "result": result }),
                        );
                    }
                    Err(e) => {
                        let attempts = record_dispatch_failure(&mut progress, action.id);
                        report.failed += 1;
                        metrics::counter!("orchestrator.dispatch_failures").increment(1);
                        warn!(
                            customer_id = %customer_id,
                            action_id = %action.id,
                            kind = %action.action_type,
                            attempts,
                            error = %e,
                            "Action dispatch failed"
                        );
                        self.emit(
                            EventType::ActionDispatchFailed,
                            action.id.to_string(),
                            customer_id,
                            json!({ "attempts": attempts, "error": e.to_string() }),
                        );

                        if attempts >= self.config.max_dispatch_attempts {
                            resolve_action(&mut progress, &definition, action.id, ActionOutcome::Skipped)?;
                            report.skipped += 1;
                            self.emit(
                                EventType::ActionSkipped,
                                action.id.to_string(),
                                customer_id,
                                json!({ "reason": "max_attempts", "attempts": attempts }),
                            );
                        }
                    }
                }
            }

            self.progress.save(&progress)?;
        }
        Ok(report)
    }

    async fn execute_action(
        &self,
        action: &TimelineAction,
        customer: &Customer,
        progress: &TimelineProgress,
    ) -> anyhow::Result<Value> {
        let effect = action.side_effect();

        if action.action_type == ActionKind::CheckEngagement {
            let threshold = effect.param_i64("threshold", 50);
            let (score, _) = self.reevaluate_locked(customer).await?;
            return Ok(json!({
                "type": "engagement_check",
                "score": score,
                "threshold": threshold,
                "meets_threshold": i64::from(score) >= threshold,
            }));
        }

        if is_channel_send(action.action_type) {
            let receipt = self.dispatcher.dispatch(action, customer).await?;
            if !receipt.success {
                anyhow::bail!(receipt.detail.unwrap_or_else(|| "delivery failed".to_string()));
            }
            return Ok(json!({ "external_ref": receipt.external_ref }));
        }

        let mut ctx = EffectContext::new(
            customer.id,
            format!("timeline:{}/day-{}", progress.timeline_id, action.day_number),
        );
        ctx.extra = json!({ "action_id": action.id });
        self.effects.execute(&effect, &ctx).await
    }

    /// Closes out finished days on the customer's active timelines.
    pub(crate) fn advance_for_customer(&self, customer_id: Uuid) -> Result<SweepReport, OrchestratorError> {
        let mut report = SweepReport::default();
        let Some(_lease) = self.locks.try_acquire(customer_id) else {
            report.busy += 1;
            return Ok(report);
        };
        let now = self.clock.now();

        for mut progress in self.progress.for_customer(&customer_id)? {
            if !progress.is_active() {
                continue;
            }
            let definition = self.definition(progress.timeline_id)?;
            match try_advance_day(&mut progress, &definition, now)? {
                Advance::Advanced { from, to } => {
                    report.advanced += 1;
                    self.emit(
                        EventType::DayAdvanced,
                        definition.id.to_string(),
                        customer_id,
                        json!({ "from": from, "to": to }),
                    );
                }
                Advance::Completed => {
                    report.completed += 1;
                    self.emit(
                        EventType::TimelineCompleted,
                        definition.id.to_string(),
                        customer_id,
                        json!({ "stage": definition.stage, "day": progress.current_day }),
                    );
                }
                Advance::NotReady | Advance::Inactive => continue,
            }
            self.progress.save(&progress)?;
        }
        Ok(report)
    }

    // ─── Engagement ─────────────────────────────────────────────────────

    /// Recomputes the customer's score and tier, persists the profile and
    /// runs the tier follow-up.
    pub async fn reevaluate_customer(&self, customer_id: Uuid) -> Result<Option<TierChange>, OrchestratorError> {
        let _lease = self.lease(customer_id)?;
        let customer = self.customer(customer_id)?;
        let (_, change) = self.reevaluate_locked(&customer).await?;
        Ok(change)
    }

    pub(crate) async fn reevaluate_for_sweep(&self, customer_id: Uuid) -> Result<SweepReport, OrchestratorError> {
        let mut report = SweepReport::default();
        let Some(_lease) = self.locks.try_acquire(customer_id) else {
            report.busy += 1;
            return Ok(report);
        };
        let customer = self.customer(customer_id)?;
        let (_, change) = self.reevaluate_locked(&customer).await?;
        if change.is_some() {
            report.tier_changes += 1;
        }
        Ok(report)
    }

    /// Caller must hold the customer's lease. A tier change is only stored
    /// once its follow-up has run; when the follow-up fails the new score is
    /// saved under the old tier so the next sweep retries the transition.
    async fn reevaluate_locked(&self, customer: &Customer) -> Result<(u8, Option<TierChange>), OrchestratorError> {
        let history = self.activity.get(&customer.id)?;
        let score = self.scorer.score_customer(customer, &history);
        let current = &customer.engagement;

        if self.scorer.is_significant_change(current.score, score) {
            self.emit(
                EventType::EngagementChanged,
                customer.id.to_string(),
                customer.id,
                json!({ "old_score": current.score, "new_score": score }),
            );
        }

        let mut applied = None;
        if let Some(change) = self.tiers.evaluate_transition(current, score) {
            let ctx = EffectContext::new(customer.id, "tier_transition");
            match self.effects.execute(&change.follow_up(), &ctx).await {
                Ok(_) => {
                    let event_type = match change.direction {
                        TierDirection::Upgrade => EventType::TierUpgraded,
                        TierDirection::Downgrade => EventType::TierDowngraded,
                    };
                    self.emit(
                        event_type,
                        customer.id.to_string(),
                        customer.id,
                        json!({ "from": change.from, "to": change.to, "score": score }),
                    );
                    applied = Some(change);
                }
                Err(e) => {
                    warn!(
                        customer_id = %customer.id,
                        from = change.from,
                        to = change.to,
                        error = %e,
                        "Tier follow-up failed, keeping current tier"
                    );
                }
            }
        }

        self.customers.save_engagement(EngagementProfile {
            customer_id: customer.id,
            score,
            tier: applied.as_ref().map_or(current.tier, |c| c.to),
        })?;
        Ok((score, applied))
    }
}
