//! Cancellable handle to a session's pending cleanup task.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::AbortHandle;

/// Source of cleanup generations. Global so that a generation identifies
/// one armed timer across every session, even when a key is deleted and
/// re-created.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Handle to the reaper task currently armed for a session.
///
/// A session holds at most one of these. The `generation` lets a timer
/// that is already running check whether it is still the one the session
/// expects, so a timer that lost a race with resolution (or with a newer
/// timer) stands down instead of acting twice.
#[derive(Debug)]
pub struct CleanupHandle {
    generation: u64,
    task: AbortHandle,
}

impl CleanupHandle {
    /// Reserves a generation for a timer that is about to be spawned.
    pub fn next_generation() -> u64 {
        NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
    }

    pub fn new(generation: u64, task: AbortHandle) -> Self {
        Self { generation, task }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancels the task.
    ///
    /// Idempotent: aborting a task that already finished, or was already
    /// aborted, does nothing.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Returns `true` if the task has completed or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
