//! Job status state machine.
//!
//! ```text
//! pending -> queued -> downloading -> finished
//!    \          \            \
//!     +----------+------------+--> error -> pending (retry)
//! ```

use crate::error::{Error, Result};
use crate::job_db::{JobId, JobStatus};

/// Whether `from -> to` is a legal edge.
pub fn is_allowed(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        (Pending, Queued)
            | (Queued, Downloading)
            | (Downloading, Finished)
            | (Pending | Queued | Downloading, Error)
            | (Error, Pending)
    )
}

pub(crate) fn check(id: JobId, from: JobStatus, to: JobStatus) -> Result<()> {
    if is_allowed(from, to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition { id, from, to })
    }
}
