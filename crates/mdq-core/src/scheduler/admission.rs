//! Admission gate shared by all run tasks.
//!
//! Holds the concurrency limit, the pause flag and the number of runs holding
//! a slot. A run reserves a slot before it may start and gives it back when its
//! [`Permit`] drops. Waiters sleep on the watch channel and re-check whenever
//! the limit, the pause flag or the running count changes, so a limit change or
//! an unpause wakes them without polling.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionState {
    pub limit: usize,
    pub paused: bool,
    pub running: usize,
}

impl AdmissionState {
    fn has_slot(&self) -> bool {
        !self.paused && self.running < self.limit
    }
}

#[derive(Debug)]
pub struct Admission {
    state: watch::Sender<AdmissionState>,
}

impl Admission {
    pub fn new(limit: usize) -> Self {
        let (state, _) = watch::channel(AdmissionState {
            limit: limit.max(1),
            paused: false,
            running: 0,
        });
        Self { state }
    }

    pub fn snapshot(&self) -> AdmissionState {
        *self.state.borrow()
    }

    /// Sets the limit for future admissions (at least 1). Runs already holding a
    /// slot are not affected when the limit goes down. Returns the applied value.
    pub fn set_limit(&self, limit: usize) -> usize {
        let limit = limit.max(1);
        self.state.send_if_modified(|s| {
            if s.limit == limit {
                return false;
            }
            s.limit = limit;
            true
        });
        limit
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.send_if_modified(|s| {
            if s.paused == paused {
                return false;
            }
            s.paused = paused;
            true
        });
    }

    fn try_take(&self) -> bool {
        self.state.send_if_modified(|s| {
            if !s.has_slot() {
                return false;
            }
            s.running += 1;
            true
        })
    }

    /// Waits for a free slot while unpaused. Returns `None` if `token` fires first.
    pub async fn acquire(self: &Arc<Self>, token: &CancellationToken) -> Option<Permit> {
        let mut rx = self.state.subscribe();
        loop {
            if token.is_cancelled() {
                return None;
            }
            let _ = rx.borrow_and_update();
            if self.try_take() {
                return Some(Permit {
                    admission: Arc::clone(self),
                });
            }
            tokio::select! {
                _ = token.cancelled() => return None,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }
}

/// A reserved run slot; released on drop.
#[derive(Debug)]
pub struct Permit {
    admission: Arc<Admission>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.admission
            .state
            .send_modify(|s| s.running = s.running.saturating_sub(1));
    }
}
