//! Startup reconciliation.
//!
//! A fresh process has no live runs, so any job persisted as `queued` or
//! `downloading` was orphaned by a crash or restart and is failed. `pending`
//! jobs were never started and are left for the scheduler to pick up.

use crate::error::Result;
use crate::job_db::{JobId, JobStatus};
use crate::store::JobStore;

pub const RESTART_MESSAGE: &str = "terminated by restart/crash";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Jobs moved to `error`.
    pub failed: Vec<JobId>,
    /// Jobs left `pending`.
    pub resumable: usize,
}

/// Must run before the first `submit_pending` of a process.
pub async fn reconcile(store: &JobStore) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();
    for snapshot in store.list_all() {
        let job = snapshot.job;
        match job.status {
            JobStatus::Queued | JobStatus::Downloading => {
                store
                    .update_status(job.id, JobStatus::Error, Some(RESTART_MESSAGE.to_string()))
                    .await?;
                tracing::warn!(job_id = job.id, was = %job.status, "orphaned job failed");
                report.failed.push(job.id);
            }
            JobStatus::Pending => report.resumable += 1,
            JobStatus::Finished | JobStatus::Error => {}
        }
    }
    tracing::info!(
        failed = report.failed.len(),
        resumable = report.resumable,
        "reconciliation done"
    );
    Ok(report)
}
