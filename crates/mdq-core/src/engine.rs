//! Engine facade used by front ends.
//!
//! Wires the job store, cancellation registry, supervisor and scheduler
//! together. Every operation that can create pending work (enqueue, retry,
//! reload) calls `submit_pending` itself before returning.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::MdqConfig;
use crate::control::JobControl;
use crate::error::{Error, Result};
use crate::intake::{self, IncomingJob};
use crate::job_db::db::unix_timestamp;
use crate::job_db::{Job, JobDb, JobId, JobStatus, NewJob};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::scheduler::Scheduler;
use crate::store::{JobEvent, JobSnapshot, JobStore, LiveEntry};
use crate::supervisor::{Supervisor, SupervisorSettings};

#[derive(Debug)]
pub struct Engine {
    store: JobStore,
    control: Arc<JobControl>,
    scheduler: Scheduler,
    max_concurrency: usize,
    live_window_secs: i64,
    startup: ReconcileReport,
}

impl Engine {
    /// Loads every job, reconciles orphans from a previous process and submits
    /// the pending ones.
    pub async fn start(cfg: &MdqConfig, db: JobDb) -> Result<Self> {
        let cfg = cfg.clone().normalized();
        let store = JobStore::load(db).await?;
        let startup = reconcile(&store).await?;

        let control = Arc::new(JobControl::new());
        let supervisor = Supervisor::new(
            store.clone(),
            Arc::clone(&control),
            SupervisorSettings::from_config(&cfg),
        );
        let scheduler = Scheduler::new(
            store.clone(),
            Arc::clone(&control),
            supervisor,
            cfg.default_concurrency,
        );
        let engine = Self {
            store,
            control,
            scheduler,
            max_concurrency: cfg.max_concurrency,
            live_window_secs: cfg.live_window_secs,
            startup,
        };
        let submitted = engine.scheduler.submit_pending().await?;
        tracing::info!(
            submitted = submitted.len(),
            concurrency = engine.scheduler.concurrency(),
            "engine started"
        );
        Ok(engine)
    }

    /// What reconciliation did at startup.
    pub fn startup_report(&self) -> &ReconcileReport {
        &self.startup
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Validates and persists a batch, then submits it. All or nothing.
    pub async fn enqueue(&self, items: &[IncomingJob]) -> Result<Vec<Job>> {
        let jobs = intake::prepare(items)?;
        self.enqueue_prepared(&jobs).await
    }

    /// Persists already-validated records, then submits them.
    pub async fn enqueue_prepared(&self, jobs: &[NewJob]) -> Result<Vec<Job>> {
        let stored = self.store.insert_many(jobs).await?;
        tracing::info!(count = stored.len(), "jobs enqueued");
        self.scheduler.submit_pending().await?;
        Ok(stored)
    }

    /// Cancels a queued or running job. Returns whether a run was signalled.
    pub fn cancel(&self, id: JobId) -> Result<bool> {
        if self.store.get(id).is_none() {
            return Err(Error::NotFound(id));
        }
        Ok(self.scheduler.cancel(id))
    }

    /// Deletes a job in any status, cancelling and awaiting its run first.
    pub async fn delete(&self, id: JobId) -> Result<()> {
        if self.store.get(id).is_none() {
            return Err(Error::NotFound(id));
        }
        self.scheduler.cancel(id);
        self.store.wait_until_settled(id).await;
        self.store.remove(id).await
    }

    /// Resets a failed job to `pending` and submits it again under the same id.
    pub async fn retry(&self, id: JobId) -> Result<Job> {
        let job = self
            .store
            .update_status(id, JobStatus::Pending, None)
            .await?;
        tracing::info!(job_id = id, "job reset for retry");
        self.scheduler.submit_pending().await?;
        Ok(self.store.get(id).map(|s| s.job).unwrap_or(job))
    }

    /// Sets the concurrency limit, capped to `max_concurrency`. Returns the
    /// applied value.
    pub fn set_concurrency(&self, n: usize) -> usize {
        self.scheduler.set_concurrency(n.min(self.max_concurrency))
    }

    pub fn concurrency(&self) -> usize {
        self.scheduler.concurrency()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn set_paused(&self, paused: bool) {
        self.scheduler.set_paused(paused);
    }

    pub fn is_paused(&self) -> bool {
        self.scheduler.is_paused()
    }

    pub fn jobs(&self) -> Vec<JobSnapshot> {
        self.store.list_all()
    }

    pub fn job(&self, id: JobId) -> Option<JobSnapshot> {
        self.store.get(id)
    }

    /// Active jobs plus those finished within the live window.
    pub fn live(&self) -> Vec<LiveEntry> {
        self.store.live_view(unix_timestamp(), self.live_window_secs)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.store.subscribe()
    }

    /// Whether the registry holds a token for the job.
    pub fn is_live(&self, id: JobId) -> bool {
        self.control.is_registered(id)
    }

    /// Resolves once nothing is queued or running.
    pub async fn wait_idle(&self) {
        self.scheduler.wait_idle().await
    }

    /// Picks up jobs another process inserted into the database and submits them.
    pub async fn reload(&self) -> Result<Vec<JobId>> {
        let added = self.store.sync_from_db().await?;
        if !added.is_empty() {
            tracing::info!(count = added.len(), "picked up new jobs");
        }
        self.scheduler.submit_pending().await?;
        Ok(added)
    }

    /// Cancels every queued and running job and waits for the runs to end.
    pub async fn shutdown(&self) {
        let cancelled = self.scheduler.cancel_all();
        tracing::info!(cancelled, "engine shutting down");
        self.scheduler.wait_idle().await;
    }
}
