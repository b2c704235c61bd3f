#![forbid(unsafe_code)]

//! The publisher / subscriber / subscription protocol.
//!
//! A [`Publisher`] hands each [`Subscriber`] exactly one [`Subscription`].
//! The subscriber pulls values by calling [`Subscription::request`] and may
//! return additional [`Demand`] from every [`Subscriber::receive`]. A
//! publisher never delivers more values than were requested.
//!
//! Everything is `Send + Sync` and shared through `Arc`: subscribers are
//! called through `&self` and keep their own interior state, so a subscriber
//! may request more demand or cancel from inside its own `receive`.
//!
//! # Invariants
//!
//! 1. A subscriber receives one subscription, then values, then at most one
//!    [`Completion`].
//! 2. After [`Subscription::cancel`] returns, no further value or completion
//!    is delivered through that subscription.
//! 3. `cancel` is idempotent.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::demand::Demand;

// ─── Terminal events ─────────────────────────────────────────────────────────

/// Terminal event of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<E> {
    /// The stream ended normally.
    Finished,
    /// The stream ended with an error.
    Failure(E),
}

impl<E> Completion<E> {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Map the failure payload, keeping `Finished` as is.
    pub fn map_failure<F>(self, f: impl FnOnce(E) -> F) -> Completion<F> {
        match self {
            Self::Finished => Completion::Finished,
            Self::Failure(e) => Completion::Failure(f(e)),
        }
    }
}

/// Failure type of streams that cannot fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Never {}

impl fmt::Display for Never {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

impl std::error::Error for Never {}

// ─── Protocol traits ─────────────────────────────────────────────────────────

/// The link between one publisher and one subscriber.
pub trait Subscription: Send + Sync {
    /// Allow up to `demand` more values to be delivered.
    fn request(&self, demand: Demand);

    /// Stop delivery and release upstream resources.
    fn cancel(&self);

    /// Request only when `demand` is non-zero.
    fn request_if_needed(&self, demand: Demand) {
        if demand.is_some() {
            self.request(demand);
        }
    }
}

/// A consumer of values.
pub trait Subscriber: Send + Sync {
    type Input;
    type Failure;

    /// Called once, before any value.
    fn receive_subscription(&self, subscription: Arc<dyn Subscription>);

    /// Called per value. Returns demand to add on top of what is outstanding.
    fn receive(&self, input: Self::Input) -> Demand;

    /// Called at most once, after the last value.
    fn receive_completion(&self, completion: Completion<Self::Failure>);
}

/// Shared, type-erased subscriber.
pub type BoxSubscriber<T, E> = Arc<dyn Subscriber<Input = T, Failure = E>>;

/// A source of values.
pub trait Publisher: Send + Sync + 'static {
    type Output: Send + 'static;
    type Failure: Send + 'static;

    /// Attach `subscriber`; it receives its subscription before this returns
    /// or later, depending on the publisher.
    fn subscribe(&self, subscriber: BoxSubscriber<Self::Output, Self::Failure>);
}

// ─── AnyPublisher ────────────────────────────────────────────────────────────

/// Type-erased, cheaply cloneable publisher.
pub struct AnyPublisher<T, E> {
    inner: Arc<dyn Publisher<Output = T, Failure = E>>,
}

impl<T, E> AnyPublisher<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new<P>(publisher: P) -> Self
    where
        P: Publisher<Output = T, Failure = E>,
    {
        Self {
            inner: Arc::new(publisher),
        }
    }
}

impl<T, E> Clone for AnyPublisher<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for AnyPublisher<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyPublisher").finish_non_exhaustive()
    }
}

impl<T, E> Publisher for AnyPublisher<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Output = T;
    type Failure = E;

    fn subscribe(&self, subscriber: BoxSubscriber<T, E>) {
        self.inner.subscribe(subscriber);
    }
}

// ─── AnyCancellable ──────────────────────────────────────────────────────────

/// RAII guard that cancels its subscription when dropped.
///
/// Call [`AnyCancellable::cancel`] to cancel early; dropping afterwards is a
/// no-op.
#[must_use = "dropping an AnyCancellable cancels the subscription immediately"]
pub struct AnyCancellable {
    on_cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl AnyCancellable {
    pub fn new(on_cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    /// Guard that cancels `subscription`.
    pub fn from_subscription(subscription: Arc<dyn Subscription>) -> Self {
        Self::new(move || subscription.cancel())
    }

    pub fn cancel(mut self) {
        self.run();
    }

    /// Add this guard to a collection that owns it.
    pub fn store_in(self, bag: &mut Vec<AnyCancellable>) {
        bag.push(self);
    }

    fn run(&mut self) {
        if let Some(on_cancel) = self.on_cancel.take() {
            on_cancel();
        }
    }
}

impl Drop for AnyCancellable {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for AnyCancellable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyCancellable")
            .field("armed", &self.on_cancel.is_some())
            .finish()
    }
}

// ─── AnySubscriber ───────────────────────────────────────────────────────────

type OnSubscription = Box<dyn Fn(Arc<dyn Subscription>) + Send + Sync>;
type OnValue<T> = Box<dyn Fn(T) -> Demand + Send + Sync>;
type OnCompletion<E> = Box<dyn Fn(Completion<E>) + Send + Sync>;

/// Subscriber assembled from closures.
pub struct AnySubscriber<T, E> {
    on_subscription: OnSubscription,
    on_value: OnValue<T>,
    on_completion: Option<OnCompletion<E>>,
}

impl<T, E> AnySubscriber<T, E> {
    pub fn new(
        on_subscription: impl Fn(Arc<dyn Subscription>) + Send + Sync + 'static,
        on_value: impl Fn(T) -> Demand + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_subscription: Box::new(on_subscription),
            on_value: Box::new(on_value),
            on_completion: None,
        }
    }

    #[must_use]
    pub fn on_completion(
        mut self,
        on_completion: impl Fn(Completion<E>) + Send + Sync + 'static,
    ) -> Self {
        self.on_completion = Some(Box::new(on_completion));
        self
    }
}

impl<T, E> Subscriber for AnySubscriber<T, E> {
    type Input = T;
    type Failure = E;

    fn receive_subscription(&self, subscription: Arc<dyn Subscription>) {
        (self.on_subscription)(subscription);
    }

    fn receive(&self, input: T) -> Demand {
        (self.on_value)(input)
    }

    fn receive_completion(&self, completion: Completion<E>) {
        if let Some(on_completion) = &self.on_completion {
            on_completion(completion);
        }
    }
}

// ─── ForEach ─────────────────────────────────────────────────────────────────

/// Terminal subscriber: requests unlimited demand and calls a closure per
/// value. Created by [`PublisherExt::for_each`](crate::operators::PublisherExt::for_each).
pub struct ForEach<T, E> {
    on_value: Box<dyn Fn(T) + Send + Sync>,
    on_completion: Option<Box<dyn Fn(Completion<E>) + Send + Sync>>,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    cancelled: AtomicBool,
}

impl<T, E> ForEach<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Subscribe to `publisher` and return the guard owning the subscription.
    pub fn attach<P>(
        publisher: &P,
        on_value: impl Fn(T) + Send + Sync + 'static,
        on_completion: Option<Box<dyn Fn(Completion<E>) + Send + Sync>>,
    ) -> AnyCancellable
    where
        P: Publisher<Output = T, Failure = E> + ?Sized,
    {
        let this = Arc::new(Self {
            on_value: Box::new(on_value),
            on_completion,
            subscription: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        });
        publisher.subscribe(this.clone());
        AnyCancellable::new(move || this.cancel())
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscription = self.subscription.lock().take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }
}

impl<T, E> Subscriber for ForEach<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Input = T;
    type Failure = E;

    fn receive_subscription(&self, subscription: Arc<dyn Subscription>) {
        if self.cancelled.load(Ordering::Acquire) {
            subscription.cancel();
            return;
        }
        *self.subscription.lock() = Some(subscription.clone());
        subscription.request(Demand::Unlimited);
    }

    fn receive(&self, input: T) -> Demand {
        if !self.cancelled.load(Ordering::Acquire) {
            (self.on_value)(input);
        }
        Demand::NONE
    }

    fn receive_completion(&self, completion: Completion<E>) {
        self.subscription.lock().take();
        if !self.cancelled.load(Ordering::Acquire)
            && let Some(on_completion) = &self.on_completion
        {
            on_completion(completion);
        }
    }
}

// ─── Just ────────────────────────────────────────────────────────────────────

/// Emits a single value to each subscriber on first demand, then finishes.
#[derive(Debug, Clone)]
pub struct Just<T> {
    value: T,
}

impl<T> Just<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> Publisher for Just<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = T;
    type Failure = Never;

    fn subscribe(&self, subscriber: BoxSubscriber<T, Never>) {
        let subscription = Arc::new(JustSubscription {
            pending: Mutex::new(Some((self.value.clone(), subscriber.clone()))),
        });
        subscriber.receive_subscription(subscription);
    }
}

struct JustSubscription<T> {
    pending: Mutex<Option<(T, BoxSubscriber<T, Never>)>>,
}

impl<T: Send> Subscription for JustSubscription<T> {
    fn request(&self, demand: Demand) {
        if demand.is_none() {
            return;
        }
        let pending = self.pending.lock().take();
        if let Some((value, subscriber)) = pending {
            subscriber.receive(value);
            subscriber.receive_completion(Completion::Finished);
        }
    }

    fn cancel(&self) {
        self.pending.lock().take();
    }
}
