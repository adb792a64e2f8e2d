//! Bounded job scheduler.
//!
//! `submit_pending` moves pending jobs to `queued`, registers a cancellation
//! token for each and spawns one run task per job. A run task waits at the
//! admission gate (limit + pause) before handing the job to the supervisor, so
//! pausing or lowering the limit holds queued work instead of dropping it.

mod admission;

pub use admission::{Admission, AdmissionState, Permit};

use std::sync::Arc;

use tokio::sync::watch;
use crate::control::{JobControl, RunToken};
use crate::error::{Error, Result};
use crate::job_db::{JobId, JobStatus};
use crate::store::JobStore;
use crate::supervisor::{RunOutcome, Supervisor, CANCELLED_MESSAGE};

/// Counts spawned run tasks; decremented when the guard drops.
#[derive(Debug)]
struct InFlight(Arc<watch::Sender<usize>>);

impl InFlight {
    fn enter(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[derive(Debug)]
pub struct Scheduler {
    store: JobStore,
    control: Arc<JobControl>,
    supervisor: Arc<Supervisor>,
    admission: Arc<Admission>,
    in_flight: Arc<watch::Sender<usize>>,
}

impl Scheduler {
    pub fn new(
        store: JobStore,
        control: Arc<JobControl>,
        supervisor: Supervisor,
        concurrency: usize,
    ) -> Self {
        let (in_flight, _) = watch::channel(0usize);
        Self {
            store,
            control,
            supervisor: Arc::new(supervisor),
            admission: Arc::new(Admission::new(concurrency)),
            in_flight: Arc::new(in_flight),
        }
    }

    /// Changes the limit for future admissions. Clamped to at least 1; runs in
    /// progress are never preempted. Returns the applied limit.
    pub fn set_concurrency(&self, n: usize) -> usize {
        let applied = self.admission.set_limit(n);
        tracing::info!(concurrency = applied, "concurrency changed");
        applied
    }

    pub fn concurrency(&self) -> usize {
        self.admission.snapshot().limit
    }

    /// While paused no queued job starts; running jobs continue.
    pub fn set_paused(&self, paused: bool) {
        self.admission.set_paused(paused);
        tracing::info!(paused, "scheduler pause changed");
    }

    pub fn is_paused(&self) -> bool {
        self.admission.snapshot().paused
    }

    /// Runs currently holding an admission slot.
    pub fn running(&self) -> usize {
        self.admission.snapshot().running
    }

    /// Spawned run tasks that have not finished (queued + running).
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Requests cancellation of a queued or running job. No-op for other jobs.
    pub fn cancel(&self, id: JobId) -> bool {
        self.control.cancel(id)
    }

    /// Cancels every live run.
    pub fn cancel_all(&self) -> usize {
        self.control.cancel_all()
    }

    /// Queues every pending job and spawns its run task. Returns the ids queued
    /// by this call.
    ///
    /// Safe to call repeatedly and concurrently: a job is queued only by the
    /// caller that wins both the registration and the `pending -> queued` claim.
    pub async fn submit_pending(&self) -> Result<Vec<JobId>> {
        let mut submitted = Vec::new();
        for job in self.store.list_by_status(JobStatus::Pending) {
            let id = job.id;
            let token = match self.control.register(id) {
                Ok(token) => token,
                Err(Error::AlreadyRunning(_)) => {
                    tracing::debug!(job_id = id, "already being submitted");
                    continue;
                }
                Err(e) => return Err(e),
            };
            match self.store.claim_pending(id).await {
                Ok(true) => {}
                Ok(false) | Err(Error::NotFound(_)) => {
                    self.control.release(id, &token);
                    continue;
                }
                Err(e) => {
                    self.control.release(id, &token);
                    return Err(e);
                }
            }
            tracing::info!(job_id = id, "job queued");
            self.spawn_run(id, token);
            submitted.push(id);
        }
        Ok(submitted)
    }

    fn spawn_run(&self, id: JobId, token: RunToken) {
        let guard = InFlight::enter(&self.in_flight);
        let store = self.store.clone();
        let control = Arc::clone(&self.control);
        let supervisor = Arc::clone(&self.supervisor);
        let admission = Arc::clone(&self.admission);
        tokio::spawn(async move {
            let _guard = guard;
            run_task(id, token, store, control, supervisor, admission).await;
        });
    }

    /// Resolves once no run task is queued or running.
    pub async fn wait_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

async fn run_task(
    id: JobId,
    token: RunToken,
    store: JobStore,
    control: Arc<JobControl>,
    supervisor: Arc<Supervisor>,
    admission: Arc<Admission>,
) -> Option<RunOutcome> {
    let Some(_permit) = admission.acquire(token.token()).await else {
        control.release(id, &token);
        tracing::info!(job_id = id, "cancelled before start");
        if let Err(e) = store
            .update_status(id, JobStatus::Error, Some(CANCELLED_MESSAGE.to_string()))
            .await
        {
            tracing::warn!(job_id = id, "could not record cancellation: {e}");
        }
        return None;
    };

    let Some(snapshot) = store.get(id) else {
        control.release(id, &token);
        tracing::warn!(job_id = id, "job vanished before start");
        return None;
    };
    Some(supervisor.run(&snapshot.job, token).await)
}
