//! Live feed for progress consumers (status line, event stream, UI).

use crate::job_db::{Fragment, JobId, JobStatus};

use super::JobSnapshot;

/// One row of the live feed.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveEntry {
    pub id: JobId,
    pub display_name: Option<String>,
    pub status: JobStatus,
    pub percent: f64,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub size: Option<String>,
    pub fragment: Option<Fragment>,
}

/// Active jobs plus jobs that finished within the last `window_secs` of `now`.
pub fn live_entries(jobs: &[JobSnapshot], now: i64, window_secs: i64) -> Vec<LiveEntry> {
    jobs.iter()
        .filter(|s| match s.job.status {
            JobStatus::Pending | JobStatus::Queued | JobStatus::Downloading => true,
            JobStatus::Finished => s
                .job
                .finished_at
                .is_some_and(|t| now.saturating_sub(t) <= window_secs),
            JobStatus::Error => false,
        })
        .map(|s| {
            // Progress is only meaningful while downloading; a finished job reads as complete.
            let progress = match s.job.status {
                JobStatus::Downloading => s.progress.clone(),
                _ => None,
            };
            let percent = match (s.job.status, &progress) {
                (JobStatus::Finished, _) => 100.0,
                (_, Some(p)) => p.percent,
                (_, None) => 0.0,
            };
            let progress = progress.unwrap_or_default();
            LiveEntry {
                id: s.job.id,
                display_name: s.job.display_name.clone(),
                status: s.job.status,
                percent,
                speed: progress.speed,
                eta: progress.eta,
                size: progress.size,
                fragment: progress.fragment,
            }
        })
        .collect()
}
