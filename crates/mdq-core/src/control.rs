//! Job control for cancellation: one token per live run.
//!
//! The scheduler registers a token when it queues a job and passes it down
//! into the supervisor. A cancel request removes the mapping before signalling,
//! and the supervisor's `release` reports whether it still owned the mapping,
//! so exactly one side decides how the run ends. Each registration carries its
//! own generation, so a stale holder can never release a newer run's mapping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::{Error, Result};
use crate::job_db::JobId;

/// Cancellation token of one registration.
#[derive(Debug, Clone)]
pub struct RunToken {
    generation: u64,
    token: CancellationToken,
}

impl RunToken {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

/// Shared registry of job id -> cancellation token.
#[derive(Debug, Default)]
pub struct JobControl {
    jobs: Mutex<HashMap<JobId, RunToken>>,
    next_generation: AtomicU64,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, RunToken>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a run; returns the token to thread through the run.
    /// Never overwrites: a second registration for a live id fails.
    pub fn register(&self, job_id: JobId) -> Result<RunToken> {
        let mut jobs = self.jobs();
        if jobs.contains_key(&job_id) {
            return Err(Error::AlreadyRunning(job_id));
        }
        let run = RunToken {
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        jobs.insert(job_id, run.clone());
        Ok(run)
    }

    /// Request cancellation. No-op if the job has no live run.
    /// Returns whether a token was signalled.
    pub fn cancel(&self, job_id: JobId) -> bool {
        let run = self.jobs().remove(&job_id);
        match run {
            Some(run) => {
                run.token.cancel();
                tracing::info!(job_id, "cancellation requested");
                true
            }
            None => {
                tracing::debug!(job_id, "cancel ignored: no live run");
                false
            }
        }
    }

    /// Drop the caller's mapping when its run ends. Returns `false` if a cancel
    /// already took it; a newer registration for the same id is left in place.
    pub fn release(&self, job_id: JobId, run: &RunToken) -> bool {
        let mut jobs = self.jobs();
        match jobs.get(&job_id) {
            Some(current) if current.generation == run.generation => {
                jobs.remove(&job_id);
                true
            }
            _ => false,
        }
    }

    pub fn is_registered(&self, job_id: JobId) -> bool {
        self.jobs().contains_key(&job_id)
    }

    /// Cancel every live run (shutdown).
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<(JobId, RunToken)> = self.jobs().drain().collect();
        for (_, run) in &drained {
            run.token.cancel();
        }
        drained.len()
    }
}

/// Default path for the control socket (same XDG state dir as the DB).
pub fn default_control_socket_path() -> std::io::Result<std::path::PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("mdq")?.get_state_home();
    Ok(dir.join("control.sock"))
}
