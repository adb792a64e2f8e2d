//! Authoritative in-memory job view, kept in step with the job database.
//!
//! All job mutation goes through [`JobStore`]. Status writes are serialized by
//! a single writer lock that is held across the database write and the view
//! update, so a read issued after a write returns always sees the new state.
//! Progress is held in memory only and never touches the database.
//!
//! Every change is published on a broadcast channel while the view lock is
//! held, which keeps one job's events in commit order for subscribers.

mod live;
mod transition;

pub use live::{live_entries, LiveEntry};
pub use transition::is_allowed;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{broadcast, Mutex};

use crate::error::{Error, Result};
use crate::job_db::db::unix_timestamp;
use crate::job_db::{Job, JobDb, JobId, JobStatus, NewJob, Progress};

const EVENT_CAPACITY: usize = 1024;

/// Change notification published by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Added(Job),
    Status {
        id: JobId,
        status: JobStatus,
        error_message: Option<String>,
    },
    Progress {
        id: JobId,
        progress: Progress,
    },
    Renamed {
        id: JobId,
        display_name: String,
    },
    Removed(JobId),
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Added(job) => job.id,
            JobEvent::Status { id, .. }
            | JobEvent::Progress { id, .. }
            | JobEvent::Renamed { id, .. } => *id,
            JobEvent::Removed(id) => *id,
        }
    }
}

/// A job together with its transient progress.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub job: Job,
    /// Last progress sample; stale unless `job.status == Downloading`.
    pub progress: Option<Progress>,
}

struct Inner {
    db: JobDb,
    writer: Mutex<()>,
    view: RwLock<HashMap<JobId, JobSnapshot>>,
    events: broadcast::Sender<JobEvent>,
}

/// Cheaply cloneable handle to the job store.
#[derive(Clone)]
pub struct JobStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for JobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore")
            .field("jobs", &self.read_view().len())
            .finish()
    }
}

impl JobStore {
    /// Builds the view from every persisted job.
    pub async fn load(db: JobDb) -> Result<Self> {
        let jobs = db.select_all().await?;
        let view = jobs
            .into_iter()
            .map(|job| (job.id, JobSnapshot { job, progress: None }))
            .collect();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                db,
                writer: Mutex::new(()),
                view: RwLock::new(view),
                events,
            }),
        })
    }

    fn read_view(&self) -> RwLockReadGuard<'_, HashMap<JobId, JobSnapshot>> {
        self.inner.view.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_view(&self) -> RwLockWriteGuard<'_, HashMap<JobId, JobSnapshot>> {
        self.inner.view.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: JobEvent) {
        // No subscribers is not an error.
        let _ = self.inner.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    pub async fn insert(&self, job: &NewJob) -> Result<Job> {
        let mut stored = self.insert_many(std::slice::from_ref(job)).await?;
        stored.pop().ok_or_else(|| Error::Invalid("insert returned no job".to_string()))
    }

    /// Persists a batch in `pending`. A duplicate URL rejects the whole batch.
    pub async fn insert_many(&self, jobs: &[NewJob]) -> Result<Vec<Job>> {
        let _w = self.inner.writer.lock().await;
        let stored = self.inner.db.insert_many(jobs).await?;
        let mut view = self.write_view();
        for job in &stored {
            view.insert(
                job.id,
                JobSnapshot {
                    job: job.clone(),
                    progress: None,
                },
            );
            self.publish(JobEvent::Added(job.clone()));
        }
        tracing::debug!(count = stored.len(), "jobs inserted");
        Ok(stored)
    }

    /// Validates and applies a status transition.
    ///
    /// `error_message` is kept only for `Error` and cleared on every other status;
    /// `finished_at` is set only for `Finished`.
    pub async fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<Job> {
        let _w = self.inner.writer.lock().await;
        let current = self.current(id)?;
        self.commit_status(&current, status, error_message).await
    }

    /// Moves a job from `pending` to `queued` if it is still pending.
    ///
    /// Returns `false` when another caller already claimed it, so concurrent
    /// submitters never queue the same job twice.
    pub async fn claim_pending(&self, id: JobId) -> Result<bool> {
        let _w = self.inner.writer.lock().await;
        let current = self.current(id)?;
        if current.status != JobStatus::Pending {
            return Ok(false);
        }
        self.commit_status(&current, JobStatus::Queued, None).await?;
        Ok(true)
    }

    fn current(&self, id: JobId) -> Result<Job> {
        self.read_view()
            .get(&id)
            .map(|s| s.job.clone())
            .ok_or(Error::NotFound(id))
    }

    /// Caller must hold the writer lock.
    async fn commit_status(
        &self,
        current: &Job,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<Job> {
        let id = current.id;
        if let Err(e) = transition::check(id, current.status, status) {
            tracing::error!(job_id = id, "{e}");
            return Err(e);
        }

        let now = unix_timestamp();
        let finished_at = (status == JobStatus::Finished).then_some(now);
        let error_message = match status {
            JobStatus::Error => Some(error_message.unwrap_or_else(|| "unknown error".to_string())),
            _ => None,
        };

        self.inner
            .db
            .update_status(id, status, error_message.as_deref(), now, finished_at)
            .await?;

        let mut view = self.write_view();
        let snapshot = view.get_mut(&id).ok_or(Error::NotFound(id))?;
        snapshot.job.status = status;
        snapshot.job.error_message = error_message.clone();
        snapshot.job.updated_at = now;
        snapshot.job.finished_at = finished_at;
        if status == JobStatus::Downloading {
            snapshot.progress = None;
        }
        let job = snapshot.job.clone();
        self.publish(JobEvent::Status {
            id,
            status,
            error_message,
        });
        tracing::debug!(job_id = id, from = %current.status, to = %status, "status updated");
        Ok(job)
    }

    /// Records a progress sample. In-memory only; never fails.
    ///
    /// Samples for jobs that are not downloading (or no longer exist) are dropped.
    pub fn update_progress(&self, id: JobId, progress: Progress) {
        let mut view = self.write_view();
        match view.get_mut(&id) {
            Some(s) if s.job.status == JobStatus::Downloading => {
                s.progress = Some(progress.clone());
                self.publish(JobEvent::Progress { id, progress });
            }
            _ => tracing::trace!(job_id = id, "dropping progress for inactive job"),
        }
    }

    /// Sets the display name if it is still empty. Returns whether it was set.
    pub async fn fill_display_name(&self, id: JobId, name: &str) -> Result<bool> {
        let _w = self.inner.writer.lock().await;
        let current = self.current(id)?;
        if current.display_name.as_deref().is_some_and(|n| !n.is_empty()) {
            return Ok(false);
        }
        self.inner.db.update_display_name(id, name).await?;
        let mut view = self.write_view();
        if let Some(s) = view.get_mut(&id) {
            s.job.display_name = Some(name.to_string());
        }
        self.publish(JobEvent::Renamed {
            id,
            display_name: name.to_string(),
        });
        Ok(true)
    }

    /// Deletes a job. Fails with `Conflict` while it is downloading.
    pub async fn remove(&self, id: JobId) -> Result<()> {
        let _w = self.inner.writer.lock().await;
        let current = self.current(id)?;
        if current.status == JobStatus::Downloading {
            return Err(Error::Conflict(id));
        }
        self.inner.db.delete(id).await?;
        let mut view = self.write_view();
        view.remove(&id);
        self.publish(JobEvent::Removed(id));
        tracing::info!(job_id = id, "job removed");
        Ok(())
    }

    /// Pulls rows inserted into the database by another process into the view.
    /// Returns the ids that were added.
    pub async fn sync_from_db(&self) -> Result<Vec<JobId>> {
        let _w = self.inner.writer.lock().await;
        let rows = self.inner.db.select_all().await?;
        let mut view = self.write_view();
        let mut added = Vec::new();
        for job in rows {
            if view.contains_key(&job.id) {
                continue;
            }
            added.push(job.id);
            view.insert(
                job.id,
                JobSnapshot {
                    job: job.clone(),
                    progress: None,
                },
            );
            self.publish(JobEvent::Added(job));
        }
        Ok(added)
    }

    pub fn get(&self, id: JobId) -> Option<JobSnapshot> {
        self.read_view().get(&id).cloned()
    }

    /// All jobs ordered by id.
    pub fn list_all(&self) -> Vec<JobSnapshot> {
        let mut out: Vec<JobSnapshot> = self.read_view().values().cloned().collect();
        out.sort_by_key(|s| s.job.id);
        out
    }

    /// Jobs with the given status, ordered by id.
    pub fn list_by_status(&self, status: JobStatus) -> Vec<Job> {
        let mut out: Vec<Job> = self
            .read_view()
            .values()
            .filter(|s| s.job.status == status)
            .map(|s| s.job.clone())
            .collect();
        out.sort_by_key(|j| j.id);
        out
    }

    pub fn live_view(&self, now: i64, window_secs: i64) -> Vec<LiveEntry> {
        live_entries(&self.list_all(), now, window_secs)
    }

    /// Waits until the job is neither queued nor downloading (or is gone).
    pub async fn wait_until_settled(&self, id: JobId) {
        let mut rx = self.subscribe();
        loop {
            let settled = match self.get(id) {
                None => true,
                Some(s) => !matches!(s.job.status, JobStatus::Queued | JobStatus::Downloading),
            };
            if settled {
                return;
            }
            loop {
                match rx.recv().await {
                    Ok(ev) if ev.job_id() == id => break,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => break,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }
}
