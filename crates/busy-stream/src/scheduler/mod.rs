#![forbid(unsafe_code)]

//! Execution contexts for deferred and delayed work.
//!
//! - [`SerialQueue`]: a dedicated thread running tasks one at a time, in
//!   submission order, with deadline-ordered timers. This is the single
//!   writer domain the busy coordinator serializes its mutations on.
//! - [`VirtualScheduler`]: a manually advanced clock for deterministic tests.
//!
//! Delayed work returns a [`TimerHandle`]; cancelling it guarantees the task
//! body does not run if it has not started yet.

mod serial_queue;
mod virtual_time;

pub use serial_queue::SerialQueue;
pub use virtual_time::VirtualScheduler;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use web_time::{Duration, Instant};

/// A unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to any scheduler.
pub type SharedScheduler = Arc<dyn Scheduler>;

/// Somewhere work can be run, now or after a delay.
pub trait Scheduler: Send + Sync + 'static {
    /// Current time as seen by this scheduler.
    fn now(&self) -> Instant;

    /// Run `task` as soon as possible, after previously scheduled tasks.
    fn schedule(&self, task: Task);

    /// Run `task` once `delay` has elapsed.
    fn schedule_after(&self, delay: Duration, task: Task) -> TimerHandle;
}

/// Cancellation handle for delayed work.
#[derive(Clone, Default)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prevent the task from running. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Wrap `task` so it becomes a no-op once this handle is cancelled.
    #[must_use]
    pub fn guard(&self, task: Task) -> Task {
        let cancelled = Arc::clone(&self.cancelled);
        Box::new(move || {
            if !cancelled.load(Ordering::Acquire) {
                task();
            }
        })
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn guarded_task_skips_after_cancel() {
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = TimerHandle::new();
        let runs_in = runs.clone();
        let task = handle.guard(Box::new(move || {
            runs_in.fetch_add(1, Ordering::SeqCst);
        }));
        handle.cancel();
        handle.cancel();
        task();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn guarded_task_runs_when_live() {
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = TimerHandle::new();
        let runs_in = runs.clone();
        handle.guard(Box::new(move || {
            runs_in.fetch_add(1, Ordering::SeqCst);
        }))();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
