#![forbid(unsafe_code)]

//! Dedicated serial execution thread.
//!
//! A [`SerialQueue`] owns one OS thread. Tasks submitted with
//! [`Scheduler::schedule`] run in submission order; delayed tasks run in
//! deadline order (ties broken by submission order) interleaved with them.
//! Being the only thread that runs queued work, it is the natural single
//! writer for shared state.
//!
//! # Shutdown
//!
//! [`SerialQueue::shutdown`] lets already submitted immediate tasks finish,
//! discards pending timers, then joins the thread. Dropping the queue does the
//! same on a best-effort basis. When the last handle is dropped from the
//! queue's own thread, the thread is told to stop but not joined.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use tracing::debug;
use web_time::{Duration, Instant};

use super::{Scheduler, Task, TimerHandle};

enum Job {
    Run(Task),
    RunAt { deadline: Instant, task: Task },
    Shutdown,
}

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

/// Handle to a running serial queue thread.
pub struct SerialQueue {
    label: String,
    // Unbounded: tasks running on the queue enqueue follow-up work and must
    // never block on their own thread.
    sender: mpsc::Sender<Job>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl SerialQueue {
    /// Spawn the queue thread.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses to spawn a thread; use [`SerialQueue::try_new`]
    /// to handle that case.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self::try_new(label).expect("failed to spawn serial queue thread")
    }

    /// Spawn the queue thread, reporting spawn failures.
    pub fn try_new(label: impl Into<String>) -> io::Result<Self> {
        let label = label.into();
        let (tx, rx) = mpsc::channel::<Job>();
        let loop_label = label.clone();
        let handle = thread::Builder::new()
            .name(format!("busy-serial-{label}"))
            .spawn(move || run_loop(&loop_label, rx))?;
        let thread_id = handle.thread().id();
        debug!(queue = %label, "serial queue started");
        Ok(Self {
            label,
            sender: tx,
            handle: Mutex::new(Some(handle)),
            thread_id,
        })
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the caller is running on this queue's thread.
    #[must_use]
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Stop the thread after already submitted tasks, then join it.
    pub fn shutdown(&self) {
        let _ = self.sender.send(Job::Shutdown);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle
            && !self.is_current()
        {
            let _ = handle.join();
        }
    }
}

impl Scheduler for SerialQueue {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule(&self, task: Task) {
        if self.sender.send(Job::Run(task)).is_err() {
            debug!(queue = %self.label, "task dropped: serial queue stopped");
        }
    }

    fn schedule_after(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let Some(deadline) = Instant::now().checked_add(delay) else {
            debug!(queue = %self.label, ?delay, "timer dropped: deadline out of range");
            return handle;
        };
        let job = Job::RunAt {
            deadline,
            task: handle.guard(task),
        };
        if self.sender.send(job).is_err() {
            debug!(queue = %self.label, "timer dropped: serial queue stopped");
        }
        handle
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialQueue")
            .field("label", &self.label)
            .field("running", &self.handle.lock().is_some())
            .finish()
    }
}

/// The queue thread's main loop.
///
/// Runs due timers, then blocks until the next message or the next timer
/// deadline, whichever comes first.
fn run_loop(label: &str, rx: mpsc::Receiver<Job>) {
    let mut timers: BinaryHeap<Reverse<TimerEntry>> = BinaryHeap::new();
    let mut seq: u64 = 0;

    loop {
        let now = Instant::now();
        while timers
            .peek()
            .is_some_and(|Reverse(entry)| entry.deadline <= now)
        {
            if let Some(Reverse(entry)) = timers.pop() {
                (entry.task)();
            }
        }

        let job = match timers.peek() {
            Some(Reverse(next)) => {
                let wait = next.deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(wait) {
                    Ok(job) => job,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(job) => job,
                Err(_) => break,
            },
        };

        match job {
            Job::Run(task) => task(),
            Job::RunAt { deadline, task } => {
                seq += 1;
                timers.push(Reverse(TimerEntry { deadline, seq, task }));
            }
            Job::Shutdown => break,
        }
    }

    debug!(queue = %label, pending_timers = timers.len(), "serial queue stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc::channel;

    #[test]
    fn runs_tasks_in_order() {
        let queue = SerialQueue::new("order");
        let (tx, rx) = channel();
        for i in 0..50 {
            let tx = tx.clone();
            queue.schedule(Box::new(move || {
                let _ = tx.send(i);
            }));
        }
        queue.shutdown();
        let seen: Vec<i32> = rx.try_iter().collect();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn tasks_run_on_queue_thread() {
        let queue = Arc::new(SerialQueue::new("thread"));
        let (tx, rx) = channel();
        let q = queue.clone();
        queue.schedule(Box::new(move || {
            let _ = tx.send(q.is_current());
        }));
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        assert!(!queue.is_current());
    }

    #[test]
    fn delayed_task_runs_after_delay() {
        let queue = SerialQueue::new("delay");
        let (tx, rx) = channel();
        let start = Instant::now();
        let _timer = queue.schedule_after(
            Duration::from_millis(30),
            Box::new(move || {
                let _ = tx.send(Instant::now());
            }),
        );
        let fired = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(fired.duration_since(start) >= Duration::from_millis(30));
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let queue = SerialQueue::new("deadline");
        let (tx, rx) = channel();
        for (delay, tag) in [(40u64, 'c'), (10, 'a'), (25, 'b')] {
            let tx = tx.clone();
            let _ = queue.schedule_after(
                Duration::from_millis(delay),
                Box::new(move || {
                    let _ = tx.send(tag);
                }),
            );
        }
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        }
        assert_eq!(seen, vec!['a', 'b', 'c']);
    }

    #[test]
    fn cancelled_timer_does_not_fire() {
        let queue = SerialQueue::new("cancel");
        let (tx, rx) = channel::<()>();
        let timer = queue.schedule_after(
            Duration::from_millis(20),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        timer.cancel();
        assert!(rx.recv_timeout(Duration::from_millis(80)).is_err());
    }

    #[test]
    fn schedule_after_shutdown_is_silent() {
        let queue = SerialQueue::new("stopped");
        queue.shutdown();
        queue.schedule(Box::new(|| {}));
        let _ = queue.schedule_after(Duration::from_millis(1), Box::new(|| {}));
    }

    #[test]
    fn out_of_range_delay_is_dropped() {
        let queue = SerialQueue::new("far");
        let (tx, rx) = channel::<()>();
        let _timer = queue.schedule_after(
            Duration::MAX,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        // The task was discarded, so the sender is gone.
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(50)),
            Err(RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn drop_from_own_thread_does_not_hang() {
        let queue = Arc::new(SerialQueue::new("self-drop"));
        let (tx, rx) = channel();
        let (go_tx, go_rx) = channel::<()>();
        let carried = queue.clone();
        queue.schedule(Box::new(move || {
            let _ = go_rx.recv_timeout(Duration::from_secs(2));
            // Last handle, released on the queue thread itself.
            drop(carried);
            let _ = tx.send(());
        }));
        drop(queue);
        let _ = go_tx.send(());
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }
}
