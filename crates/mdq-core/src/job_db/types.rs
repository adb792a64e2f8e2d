//! Types used by the job database and the in-memory store.

use std::fmt;

use crate::quality::Quality;

/// Job identifier.
pub type JobId = i64;

/// Lifecycle status stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Queued,
    Downloading,
    Finished,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Finished => "finished",
            JobStatus::Error => "error",
        }
    }

    /// Unknown values map to `Error` so a corrupt row is never silently re-run.
    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => JobStatus::Pending,
            "queued" => JobStatus::Queued,
            "downloading" => JobStatus::Downloading,
            "finished" => JobStatus::Finished,
            _ => JobStatus::Error,
        }
    }

    /// `finished` and `error` end a run attempt.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job accepted by intake, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub source_url: String,
    /// `None` means the downloader's title template is used and the name is
    /// filled in after a successful run.
    pub display_name: Option<String>,
    pub quality: Quality,
    pub append_title: bool,
}

impl NewJob {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            display_name: None,
            quality: Quality::Highest,
            append_title: false,
        }
    }
}

/// Full job record as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub source_url: String,
    pub display_name: Option<String>,
    pub quality: Quality,
    pub append_title: bool,
    pub status: JobStatus,
    /// Set only while `status == Error`.
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Set only on the transition to `Finished`.
    pub finished_at: Option<i64>,
}

/// Segment counter reported by the downloader for fragmented streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub current: u32,
    pub total: u32,
}

/// Transient progress of a downloading job. Never persisted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Progress {
    /// Percentage complete in [0.0, 100.0].
    pub percent: f64,
    pub size: Option<String>,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub fragment: Option<Fragment>,
}
