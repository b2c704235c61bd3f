#![forbid(unsafe_code)]

//! Manually advanced scheduler for deterministic tests.
//!
//! Time only moves when [`VirtualScheduler::advance`] is called. Tasks due at
//! or before the target time run in (due time, submission) order on the
//! calling thread, and the clock reads each task's due time while it runs.
//!
//! # Invariants
//!
//! - The clock never moves backwards.
//! - Tasks scheduled by a running task are eligible within the same
//!   `advance` call if they fall due before the target.
//! - Task bodies run with no internal lock held.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;

use parking_lot::Mutex;
use web_time::{Duration, Instant};

use super::{Scheduler, Task, TimerHandle};

struct Pending {
    due: Duration,
    seq: u64,
    task: Task,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

#[derive(Default)]
struct VirtualState {
    /// Offset from the epoch.
    elapsed: Duration,
    next_seq: u64,
    queue: BinaryHeap<Reverse<Pending>>,
}

/// A scheduler whose clock is advanced by hand.
pub struct VirtualScheduler {
    epoch: Instant,
    state: Mutex<VirtualState>,
}

impl VirtualScheduler {
    /// Create a scheduler whose clock starts at `Instant::now()`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            state: Mutex::new(VirtualState::default()),
        }
    }

    /// Time elapsed on the virtual clock since creation.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    /// Number of tasks not yet run (cancelled timers included).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Move the clock forward by `delta`, running every task that falls due.
    pub fn advance(&self, delta: Duration) {
        let target = self.elapsed().saturating_add(delta);
        self.advance_to(target);
    }

    /// Move the clock to `elapsed` since creation. Targets in the past only
    /// run tasks that are already due.
    pub fn advance_to(&self, elapsed: Duration) {
        loop {
            let task = {
                let mut state = self.state.lock();
                let target = elapsed.max(state.elapsed);
                let due_now = state
                    .queue
                    .peek()
                    .is_some_and(|Reverse(next)| next.due <= target);
                if due_now && let Some(Reverse(next)) = state.queue.pop() {
                    state.elapsed = state.elapsed.max(next.due);
                    next.task
                } else {
                    state.elapsed = target;
                    return;
                }
            };
            task();
        }
    }

    /// Run everything due at the current time without moving the clock.
    pub fn run_until_idle(&self) {
        self.advance(Duration::ZERO);
    }

    fn push(&self, delay: Duration, task: Task) {
        let mut state = self.state.lock();
        // Delays past the end of the clock never come due.
        let due = state.elapsed.saturating_add(delay);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(Reverse(Pending { due, seq, task }));
    }
}

impl Default for VirtualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for VirtualScheduler {
    fn now(&self) -> Instant {
        self.epoch + self.elapsed()
    }

    fn schedule(&self, task: Task) {
        self.push(Duration::ZERO, task);
    }

    fn schedule_after(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        self.push(delay, handle.guard(task));
        handle
    }
}

impl fmt::Debug for VirtualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("VirtualScheduler")
            .field("elapsed", &state.elapsed)
            .field("pending", &state.queue.len())
            .finish()
    }
}
