//! Periodic drivers. Each sweep splits its customers into chunks, runs up to
//! `max_workers` chunks at once, and is safe to overlap with itself or with
//! the other sweeps: a customer held by another worker is left for the next
//! run.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub customers: usize,
    /// Held by another worker; retried next sweep.
    pub busy: usize,
    pub errors: usize,
    pub dispatched: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Due today but still inside their `delay_hours`.
    pub waiting: usize,
    pub advanced: usize,
    pub completed: usize,
    pub tier_changes: usize,
}

impl SweepReport {
    fn absorb(&mut self, other: SweepReport) {
        self.customers += other.customers;
        self.busy += other.busy;
        self.errors += other.errors;
        self.dispatched += other.dispatched;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.waiting += other.waiting;
        self.advanced += other.advanced;
        self.completed += other.completed;
        self.tier_changes += other.tier_changes;
    }
}

impl Orchestrator {
    /// Dispatches due actions for every customer with an active timeline.
    pub async fn dispatch_due_actions(&self) -> Result<SweepReport, OrchestratorError> {
        let customers = self.progress.customers_with_active_progress()?;
        Ok(self
            .run_sweep("dispatch", customers, |orch, id| async move {
                orch.dispatch_for_customer(id).await
            })
            .await)
    }

    /// Advances every active timeline whose current day has closed.
    pub async fn advance_days(&self) -> Result<SweepReport, OrchestratorError> {
        let customers = self.progress.customers_with_active_progress()?;
        Ok(self
            .run_sweep("advance", customers, |orch, id| async move {
                orch.advance_for_customer(id)
            })
            .await)
    }

    /// Rescores every known customer and applies tier transitions.
    pub async fn reevaluate_tiers(&self) -> Result<SweepReport, OrchestratorError> {
        let customers: Vec<Uuid> = self.customers.list().into_iter().map(|c| c.id).collect();
        Ok(self
            .run_sweep("tiers", customers, |orch, id| async move {
                orch.reevaluate_for_sweep(id).await
            })
            .await)
    }

    async fn run_sweep<F, Fut>(&self, sweep: &'static str, customers: Vec<Uuid>, work: F) -> SweepReport
    where
        F: Fn(Orchestrator, Uuid) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<SweepReport, OrchestratorError>> + Send + 'static,
    {
        let started = Instant::now();
        let work = Arc::new(work);
        let permits = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut tasks = JoinSet::new();

        for chunk in customers.chunks(self.config.chunk_size.max(1)) {
            let chunk = chunk.to_vec();
            let orch = self.clone();
            let work = Arc::clone(&work);
            let permits = Arc::clone(&permits);

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let mut report = SweepReport::default();
                for customer_id in chunk {
                    report.customers += 1;
                    match (work.as_ref())(orch.clone(), customer_id).await {
                        Ok(partial) => report.absorb(partial),
                        Err(e) => {
                            report.errors += 1;
                            warn!(sweep, customer_id = %customer_id, error = %e, "Customer failed during sweep");
                        }
                    }
                }
                report
            });
        }

        let mut total = SweepReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => total.absorb(report),
                Err(e) => {
                    total.errors += 1;
                    error!(sweep, error = %e, "Sweep worker aborted");
                }
            }
        }

        metrics::counter!("orchestrator.sweeps", "sweep" => sweep).increment(1);
        info!(
            sweep,
            customers = total.customers,
            busy = total.busy,
            errors = total.errors,
            dispatched = total.dispatched,
            advanced = total.advanced,
            completed = total.completed,
            tier_changes = total.tier_changes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sweep finished"
        );
        total
    }
}
