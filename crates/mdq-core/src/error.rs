//! Engine error taxonomy.

use crate::job_db::{JobId, JobStatus};

/// Errors surfaced by the job store, registry and engine facade.
///
/// Subprocess failures and cancellations are not represented here: they never
/// escape a run and are recorded as the job's terminal `error` status instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A job for this source URL already exists.
    #[error("a job for {0} already exists")]
    DuplicateUrl(String),

    #[error("job {0} not found")]
    NotFound(JobId),

    /// Caller input rejected before any job was created.
    #[error("{0}")]
    Invalid(String),

    /// State machine misuse; indicates an integration defect.
    #[error("job {id}: illegal transition {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    /// The job is downloading and must be cancelled first.
    #[error("job {0} is downloading; cancel it first")]
    Conflict(JobId),

    /// A cancellation token is already registered for this job.
    #[error("job {0} already has a live run")]
    AlreadyRunning(JobId),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
