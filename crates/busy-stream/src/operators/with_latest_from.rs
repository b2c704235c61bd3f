#![forbid(unsafe_code)]

//! Sample the latest value of a secondary publisher on every primary value.
//!
//! # Design
//!
//! Subscribing attaches to the secondary immediately, with unlimited demand,
//! through a subscriber that only holds a weak reference to the operator
//! state. The primary is left alone until the secondary produces its first
//! value; only then is a [`Sink`] created over the primary and any demand
//! requested by the downstream in the meantime forwarded to it.
//!
//! # Invariants
//!
//! - The primary is never subscribed before a secondary value exists, so
//!   every emitted value pairs a primary value with a real secondary value.
//! - Primary values arriving while no secondary value exists are dropped,
//!   never buffered.
//! - Downstream demand requested before the first secondary value is
//!   accumulated, not lost.
//! - Cancellation runs once: it cancels the primary (through the sink) and
//!   the secondary subscription.
//!
//! # Failure Modes
//!
//! - **Secondary completes**: ignored; the last value stays in use.
//! - **Secondary never emits**: the downstream never receives anything, and
//!   the primary is never subscribed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::demand::Demand;
use crate::publisher::{AnySubscriber, BoxSubscriber, Publisher, Subscription};
use crate::sink::Sink;

/// Combines a primary value with the latest secondary value.
pub type Selector<A, B, R> = Arc<dyn Fn(A, B) -> R + Send + Sync>;

type DynPublisher<T, E> = Arc<dyn Publisher<Output = T, Failure = E>>;

/// See [`PublisherExt::with_latest_from`](super::PublisherExt::with_latest_from).
pub struct WithLatestFrom<P, S, R>
where
    P: Publisher,
    S: Publisher,
{
    upstream: Arc<P>,
    other: S,
    selector: Selector<P::Output, S::Output, R>,
}

impl<P, S, R> WithLatestFrom<P, S, R>
where
    P: Publisher,
    S: Publisher<Failure = P::Failure>,
    S::Output: Clone,
    R: Send + 'static,
{
    pub fn new(
        upstream: P,
        other: S,
        selector: impl Fn(P::Output, S::Output) -> R + Send + Sync + 'static,
    ) -> Self {
        Self {
            upstream: Arc::new(upstream),
            other,
            selector: Arc::new(selector),
        }
    }
}

impl<P, S, R> Publisher for WithLatestFrom<P, S, R>
where
    P: Publisher,
    S: Publisher<Failure = P::Failure>,
    S::Output: Clone,
    R: Send + 'static,
{
    type Output = R;
    type Failure = P::Failure;

    fn subscribe(&self, downstream: BoxSubscriber<R, P::Failure>) {
        let upstream: DynPublisher<P::Output, P::Failure> = self.upstream.clone();
        let inner = Arc::new(Inner {
            upstream,
            selector: Arc::clone(&self.selector),
            downstream: Arc::clone(&downstream),
            state: Mutex::new(InnerState {
                latest: None,
                sink: None,
                pre_initial_demand: Demand::NONE,
                other: None,
            }),
            cancelled: AtomicBool::new(false),
        });
        inner.track_latest_from_other(&self.other);
        downstream.receive_subscription(Arc::new(WithLatestFromSubscription { inner }));
    }
}

type PrimarySink<A, R, E> = Sink<A, E, R, E>;

struct InnerState<A, B, R, E> {
    latest: Option<B>,
    sink: Option<Arc<PrimarySink<A, R, E>>>,
    pre_initial_demand: Demand,
    other: Option<Arc<dyn Subscription>>,
}

struct Inner<A, B, R, E> {
    upstream: DynPublisher<A, E>,
    selector: Selector<A, B, R>,
    downstream: BoxSubscriber<R, E>,
    state: Mutex<InnerState<A, B, R, E>>,
    cancelled: AtomicBool,
}

impl<A, B, R, E> Inner<A, B, R, E>
where
    A: Send + 'static,
    B: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn track_latest_from_other<S>(self: &Arc<Self>, other: &S)
    where
        S: Publisher<Output = B, Failure = E> + ?Sized,
    {
        let on_subscription = Arc::downgrade(self);
        let on_value = Arc::downgrade(self);
        let subscriber = AnySubscriber::new(
            move |subscription: Arc<dyn Subscription>| {
                let Some(inner) = on_subscription.upgrade() else {
                    subscription.cancel();
                    return;
                };
                {
                    let mut state = inner.state.lock();
                    if inner.is_cancelled() {
                        drop(state);
                        subscription.cancel();
                        return;
                    }
                    state.other = Some(Arc::clone(&subscription));
                }
                subscription.request(Demand::Unlimited);
            },
            move |value: B| {
                if let Some(inner) = on_value.upgrade() {
                    inner.receive_latest(value);
                }
                Demand::NONE
            },
        );
        other.subscribe(Arc::new(subscriber));
    }

    fn receive_latest(self: &Arc<Self>, value: B) {
        let first = {
            let mut state = self.state.lock();
            let first = state.latest.is_none();
            state.latest = Some(value);
            first
        };
        if first && !self.is_cancelled() {
            self.start_primary();
        }
    }

    fn start_primary(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let selector = Arc::clone(&self.selector);
        let sink = Sink::new(
            Arc::clone(&self.downstream),
            Some(Box::new(move |value: A| {
                let inner = weak.upgrade()?;
                let latest = inner.state.lock().latest.clone()?;
                Some(selector(value, latest))
            })),
            Some(Box::new(|error: E| Some(error))),
        );
        let pre_initial_demand = {
            let mut state = self.state.lock();
            if self.is_cancelled() {
                return;
            }
            state.sink = Some(Arc::clone(&sink));
            std::mem::take(&mut state.pre_initial_demand)
        };
        self.upstream.subscribe(sink.subscriber());
        sink.demand(pre_initial_demand);
    }

    fn request(&self, demand: Demand) {
        let sink = {
            let mut state = self.state.lock();
            match &state.sink {
                Some(sink) => Arc::clone(sink),
                None => {
                    state.pre_initial_demand += demand;
                    return;
                }
            }
        };
        sink.demand(demand);
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let (sink, other) = {
            let mut state = self.state.lock();
            (state.sink.take(), state.other.take())
        };
        if let Some(sink) = sink {
            sink.cancel_upstream();
        }
        if let Some(other) = other {
            other.cancel();
        }
    }
}

impl<A, B, R, E> Drop for Inner<A, B, R, E> {
    fn drop(&mut self) {
        if *self.cancelled.get_mut() {
            return;
        }
        if let Some(other) = self.state.get_mut().other.take() {
            other.cancel();
        }
    }
}

struct WithLatestFromSubscription<A, B, R, E> {
    inner: Arc<Inner<A, B, R, E>>,
}

impl<A, B, R, E> Subscription for WithLatestFromSubscription<A, B, R, E>
where
    A: Send + 'static,
    B: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    fn request(&self, demand: Demand) {
        self.inner.request(demand);
    }

    fn cancel(&self) {
        self.inner.cancel();
    }
}
