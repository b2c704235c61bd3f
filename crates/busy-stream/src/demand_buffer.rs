#![forbid(unsafe_code)]

//! Demand-reconciling FIFO between an upstream producer and one downstream
//! subscriber.
//!
//! # Design
//!
//! Values pushed by the upstream are queued and released to the downstream
//! only while it has outstanding demand. Completion is recorded once and
//! relayed after the queue has been drained, so buffered values always reach
//! the subscriber before the terminal event.
//!
//! Every operation runs under one [`ReentrantMutex`]. The state cell is never
//! borrowed while the subscriber is being called, so a subscriber may call
//! back into the buffer (request more, push, complete) from its own
//! `receive`. A nested flush on the draining thread only records the new
//! demand; the outer drain loop picks it up.
//!
//! # Invariants
//!
//! 1. Values delivered never exceed cumulative requested demand.
//! 2. Once completion is recorded no value may be pushed, and completion may
//!    not be recorded again. Both are programming errors and panic.
//! 3. The completion is delivered exactly once, after the last buffered
//!    value, and resets the demand counters.
//! 4. The demand returned by [`push`](DemandBuffer::push),
//!    [`complete`](DemandBuffer::complete) and
//!    [`request_more`](DemandBuffer::request_more) is what the caller still
//!    owes its own upstream: `requested - sent`, after which `sent` catches
//!    up.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tracing::trace;

use crate::demand::{Demand, DemandState};
use crate::publisher::{BoxSubscriber, Completion};

struct BufferState<T, E> {
    queue: VecDeque<T>,
    completion: Option<Completion<E>>,
    /// Set by the first `complete`; never cleared.
    completed: bool,
    /// Set once the completion has been delivered.
    terminated: bool,
    /// A drain loop is running on the lock-holding thread.
    draining: bool,
    demand: DemandState,
}

type Guard<'a, T, E> = ReentrantMutexGuard<'a, RefCell<BufferState<T, E>>>;

/// Buffers values for a downstream subscriber according to its demand.
pub struct DemandBuffer<T, E> {
    state: ReentrantMutex<RefCell<BufferState<T, E>>>,
    subscriber: BoxSubscriber<T, E>,
}

impl<T, E> DemandBuffer<T, E>
where
    T: Send,
    E: Send,
{
    pub fn new(subscriber: BoxSubscriber<T, E>) -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(BufferState {
                queue: VecDeque::new(),
                completion: None,
                completed: false,
                terminated: false,
                draining: false,
                demand: DemandState::default(),
            })),
            subscriber,
        }
    }

    /// Buffer an upstream value, delivering whatever current demand allows.
    ///
    /// With unlimited demand and nothing queued the value is delivered
    /// directly and the subscriber's returned demand is passed back.
    ///
    /// # Panics
    ///
    /// Panics if completion was already recorded.
    pub fn push(&self, value: T) -> Demand {
        match self.push_inner(value) {
            Some(owed) => owed,
            None => panic!("DemandBuffer::push called after completion was recorded"),
        }
    }

    /// Like [`push`](DemandBuffer::push), but returns `None` and drops the
    /// value when completion was already recorded.
    ///
    /// For values an operator produces on its own (timers), which may race
    /// the upstream's terminal event.
    pub fn try_push(&self, value: T) -> Option<Demand> {
        self.push_inner(value)
    }

    fn push_inner(&self, value: T) -> Option<Demand> {
        let guard = self.state.lock();
        let deliver_now = {
            let state = guard.borrow();
            if state.completed {
                return None;
            }
            state.demand.requested.is_unlimited() && state.queue.is_empty() && !state.draining
        };
        if deliver_now {
            return Some(self.subscriber.receive(value));
        }
        guard.borrow_mut().queue.push_back(value);
        Some(self.flush(&guard, None))
    }

    /// Record the terminal event and flush.
    ///
    /// # Panics
    ///
    /// Panics if completion was already recorded.
    pub fn complete(&self, completion: Completion<E>) -> Demand {
        let guard = self.state.lock();
        {
            let mut state = guard.borrow_mut();
            assert!(!state.completed, "DemandBuffer::complete called twice");
            state.completed = true;
            state.completion = Some(completion);
        }
        self.flush(&guard, None)
    }

    /// Add downstream demand and flush. Returns the demand now owed upstream.
    pub fn request_more(&self, demand: Demand) -> Demand {
        let guard = self.state.lock();
        self.flush(&guard, Some(demand))
    }

    /// Snapshot of the demand ledger.
    #[must_use]
    pub fn demand_state(&self) -> DemandState {
        self.state.lock().borrow().demand
    }

    /// Number of values waiting for demand.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.state.lock().borrow().queue.len()
    }

    /// Whether the completion has been delivered downstream.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state.lock().borrow().terminated
    }

    fn flush(&self, guard: &Guard<'_, T, E>, adding: Option<Demand>) -> Demand {
        {
            let mut state = guard.borrow_mut();
            if state.terminated {
                return Demand::NONE;
            }
            if let Some(demand) = adding {
                state.demand.requested += demand;
            }
            if state.draining {
                return Demand::NONE;
            }
            state.draining = true;
        }

        loop {
            let next = {
                let mut state = guard.borrow_mut();
                if state.demand.can_deliver() {
                    let value = state.queue.pop_front();
                    if value.is_some() {
                        state.demand.processed += 1;
                    }
                    value
                } else {
                    None
                }
            };
            let Some(value) = next else { break };
            let more = self.subscriber.receive(value);
            guard.borrow_mut().demand.requested += more;
        }

        let completion = {
            let mut state = guard.borrow_mut();
            state.draining = false;
            if state.queue.is_empty() {
                state.completion.take()
            } else {
                None
            }
        };

        if let Some(completion) = completion {
            {
                let mut state = guard.borrow_mut();
                state.terminated = true;
                state.demand.reset();
            }
            self.subscriber.receive_completion(completion);
            return Demand::NONE;
        }

        let mut state = guard.borrow_mut();
        let owed = state.demand.take_unsent();
        trace!(
            requested = %state.demand.requested,
            processed = %state.demand.processed,
            buffered = state.queue.len(),
            owed = %owed,
            "demand buffer flushed"
        );
        owed
    }
}

impl<T, E> fmt::Debug for DemandBuffer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.state.lock();
        match guard.try_borrow() {
            Ok(state) => f
                .debug_struct("DemandBuffer")
                .field("buffered", &state.queue.len())
                .field("demand", &state.demand)
                .field("completed", &state.completed)
                .finish(),
            Err(_) => f.debug_struct("DemandBuffer").finish_non_exhaustive(),
        }
    }
}
