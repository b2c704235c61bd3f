#![forbid(unsafe_code)]

//! Hot, multi-subscriber publishers that values are pushed into.
//!
//! - [`PassthroughSubject`]: forwards each value to every subscriber that has
//!   outstanding demand; subscribers without demand miss it.
//! - [`CurrentValueSubject`]: holds a current value. Each new subscriber gets
//!   it on first demand, and a subscriber without demand keeps only the
//!   latest value it missed.
//!
//! # Architecture
//!
//! Each subscriber is attached through a conduit that tracks its demand. The
//! subject lock is only held to snapshot the conduit list; values are
//! delivered outside every lock, so subscribers may send, subscribe or cancel
//! re-entrantly.
//!
//! # Invariants
//!
//! 1. Subscribers are offered values in attachment order.
//! 2. A conduit never delivers more than its subscriber requested.
//! 3. After completion no value is delivered; late subscribers receive the
//!    recorded completion immediately.
//! 4. A cancelled conduit is detached before `cancel` returns.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::demand::Demand;
use crate::publisher::{BoxSubscriber, Completion, Never, Publisher, Subscription};

// ─── Shared core ─────────────────────────────────────────────────────────────

struct SubjectState<T, E> {
    conduits: Vec<Arc<Conduit<T, E>>>,
    current: Option<T>,
    completion: Option<Completion<E>>,
}

struct SubjectInner<T, E> {
    state: Mutex<SubjectState<T, E>>,
    next_id: AtomicU64,
    replay: bool,
}

impl<T, E> SubjectInner<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn new(current: Option<T>) -> Arc<Self> {
        Arc::new(Self {
            replay: current.is_some(),
            state: Mutex::new(SubjectState {
                conduits: Vec::new(),
                current,
                completion: None,
            }),
            next_id: AtomicU64::new(1),
        })
    }

    fn subscribe(self: &Arc<Self>, subscriber: BoxSubscriber<T, E>) {
        let conduit = {
            let mut state = self.state.lock();
            let completion = state.completion.clone();
            if let Some(completion) = completion {
                drop(state);
                subscriber.receive_subscription(Arc::new(EmptySubscription));
                subscriber.receive_completion(completion);
                return;
            }
            let conduit = Arc::new(Conduit {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                subject: Arc::downgrade(self),
                replay: self.replay,
                state: Mutex::new(ConduitState {
                    subscriber: Some(subscriber.clone()),
                    demand: Demand::NONE,
                    pending: state.current.clone(),
                }),
            });
            state.conduits.push(conduit.clone());
            conduit
        };
        subscriber.receive_subscription(conduit);
    }

    fn send(&self, value: T) {
        let conduits = {
            let mut state = self.state.lock();
            if state.completion.is_some() {
                return;
            }
            if self.replay {
                state.current = Some(value.clone());
            }
            state.conduits.clone()
        };
        for conduit in conduits {
            conduit.offer(value.clone());
        }
    }

    fn send_completion(&self, completion: Completion<E>) {
        let conduits = {
            let mut state = self.state.lock();
            if state.completion.is_some() {
                return;
            }
            state.completion = Some(completion.clone());
            std::mem::take(&mut state.conduits)
        };
        for conduit in conduits {
            conduit.finish(completion.clone());
        }
    }

    fn detach(&self, id: u64) {
        self.state.lock().conduits.retain(|c| c.id != id);
    }

    fn subscriber_count(&self) -> usize {
        self.state.lock().conduits.len()
    }
}

// ─── Conduit ─────────────────────────────────────────────────────────────────

struct ConduitState<T, E> {
    subscriber: Option<BoxSubscriber<T, E>>,
    demand: Demand,
    /// Latest value not yet delivered (replaying subjects only).
    pending: Option<T>,
}

struct Conduit<T, E> {
    id: u64,
    subject: Weak<SubjectInner<T, E>>,
    replay: bool,
    state: Mutex<ConduitState<T, E>>,
}

impl<T, E> Conduit<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn offer(&self, value: T) {
        let subscriber = {
            let mut state = self.state.lock();
            let Some(subscriber) = state.subscriber.clone() else {
                return;
            };
            if state.demand.is_none() {
                if self.replay {
                    state.pending = Some(value);
                }
                return;
            }
            state.pending = None;
            state.demand -= Demand::max(1);
            subscriber
        };
        self.deliver(&subscriber, value);
    }

    fn deliver(&self, subscriber: &BoxSubscriber<T, E>, value: T) {
        let more = subscriber.receive(value);
        if more.is_some() {
            let mut state = self.state.lock();
            if state.subscriber.is_some() {
                state.demand += more;
            }
        }
    }

    fn finish(&self, completion: Completion<E>) {
        let subscriber = {
            let mut state = self.state.lock();
            state.pending = None;
            state.subscriber.take()
        };
        if let Some(subscriber) = subscriber {
            subscriber.receive_completion(completion);
        }
    }
}

impl<T, E> Subscription for Conduit<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn request(&self, demand: Demand) {
        let delivery = {
            let mut state = self.state.lock();
            let Some(subscriber) = state.subscriber.clone() else {
                return;
            };
            state.demand += demand;
            if state.demand.is_none() {
                return;
            }
            match state.pending.take() {
                Some(value) => {
                    state.demand -= Demand::max(1);
                    Some((subscriber, value))
                }
                None => None,
            }
        };
        if let Some((subscriber, value)) = delivery {
            self.deliver(&subscriber, value);
        }
    }

    fn cancel(&self) {
        {
            let mut state = self.state.lock();
            state.subscriber = None;
            state.pending = None;
        }
        if let Some(subject) = self.subject.upgrade() {
            subject.detach(self.id);
        }
    }
}

struct EmptySubscription;

impl Subscription for EmptySubscription {
    fn request(&self, _demand: Demand) {}

    fn cancel(&self) {}
}

// ─── PassthroughSubject ──────────────────────────────────────────────────────

/// Broadcasts values to current subscribers without keeping any of them.
pub struct PassthroughSubject<T, E = Never> {
    inner: Arc<SubjectInner<T, E>>,
}

impl<T, E> PassthroughSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: SubjectInner::new(None),
        }
    }

    pub fn send(&self, value: T) {
        self.inner.send(value);
    }

    pub fn send_completion(&self, completion: Completion<E>) {
        self.inner.send_completion(completion);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }
}

impl<T, E> Default for PassthroughSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for PassthroughSubject<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for PassthroughSubject<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassthroughSubject")
            .field("subscribers", &self.inner.state.lock().conduits.len())
            .finish()
    }
}

impl<T, E> Publisher for PassthroughSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = T;
    type Failure = E;

    fn subscribe(&self, subscriber: BoxSubscriber<T, E>) {
        self.inner.subscribe(subscriber);
    }
}

// ─── CurrentValueSubject ─────────────────────────────────────────────────────

/// Holds a current value and replays it to new subscribers.
pub struct CurrentValueSubject<T, E = Never> {
    inner: Arc<SubjectInner<T, E>>,
}

impl<T, E> CurrentValueSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            inner: SubjectInner::new(Some(initial)),
        }
    }

    /// The current value.
    #[must_use]
    pub fn value(&self) -> T {
        self.inner
            .state
            .lock()
            .current
            .clone()
            .expect("current-value subject always holds a value")
    }

    /// Replace the current value and broadcast it.
    pub fn send(&self, value: T) {
        self.inner.send(value);
    }

    pub fn send_completion(&self, completion: Completion<E>) {
        self.inner.send_completion(completion);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }
}

impl<T, E> CurrentValueSubject<T, E>
where
    T: Clone + PartialEq + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Send only if `value` differs from the current value.
    ///
    /// Returns `true` when the value was sent.
    pub fn send_if_changed(&self, value: T) -> bool {
        if self.inner.state.lock().current.as_ref() == Some(&value) {
            return false;
        }
        self.inner.send(value);
        true
    }
}

impl<T, E> Clone for CurrentValueSubject<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug, E> fmt::Debug for CurrentValueSubject<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CurrentValueSubject")
            .field("value", &state.current)
            .field("subscribers", &state.conduits.len())
            .finish()
    }
}

impl<T, E> Publisher for CurrentValueSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = T;
    type Failure = E;

    fn subscribe(&self, subscriber: BoxSubscriber<T, E>) {
        self.inner.subscribe(subscriber);
    }
}
