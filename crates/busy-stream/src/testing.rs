#![forbid(unsafe_code)]

//! Test helpers: a recording subscriber with scriptable demand.
//!
//! Enabled for this crate's own tests and, for downstream crates, through the
//! `test-helpers` feature.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::demand::Demand;
use crate::publisher::{Completion, Subscriber, Subscription};

/// One observed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T, E> {
    Value(T),
    Completion(Completion<E>),
}

type Hook<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Subscriber that records everything it receives.
///
/// Requests `initial` demand as soon as it is subscribed and returns
/// `per_value` demand from every `receive`.
pub struct Recorder<T, E> {
    events: Mutex<Vec<Event<T, E>>>,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    initial: Demand,
    per_value: Mutex<Demand>,
    hook: Mutex<Option<Arc<Hook<T>>>>,
}

impl<T, E> Recorder<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    #[must_use]
    pub fn new(initial: Demand) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
            initial,
            per_value: Mutex::new(Demand::NONE),
            hook: Mutex::new(None),
        })
    }

    /// Subscriber requesting unlimited demand up front.
    #[must_use]
    pub fn unlimited() -> Arc<Self> {
        Self::new(Demand::Unlimited)
    }

    /// Demand returned from each `receive`.
    #[must_use]
    pub fn with_per_value(self: Arc<Self>, demand: Demand) -> Arc<Self> {
        *self.per_value.lock() = demand;
        self
    }

    /// Run `hook` for every received value, after it has been recorded.
    pub fn on_value(&self, hook: impl Fn(&T) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Arc::new(Box::new(hook)));
    }

    pub fn request(&self, demand: Demand) {
        let subscription = self.subscription.lock().clone();
        if let Some(subscription) = subscription {
            subscription.request(demand);
        }
    }

    pub fn cancel(&self) {
        let subscription = self.subscription.lock().take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    /// Let go of the subscription without cancelling it.
    pub fn release(&self) {
        drop(self.subscription.lock().take());
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription.lock().is_some()
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event<T, E>> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn values(&self) -> Vec<T> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Value(v) => Some(v.clone()),
                Event::Completion(_) => None,
            })
            .collect()
    }

    #[must_use]
    pub fn completion(&self) -> Option<Completion<E>> {
        self.events.lock().iter().find_map(|event| match event {
            Event::Completion(c) => Some(c.clone()),
            Event::Value(_) => None,
        })
    }
}

impl<T, E> Subscriber for Recorder<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Input = T;
    type Failure = E;

    fn receive_subscription(&self, subscription: Arc<dyn Subscription>) {
        *self.subscription.lock() = Some(subscription.clone());
        subscription.request_if_needed(self.initial);
    }

    fn receive(&self, input: T) -> Demand {
        self.events.lock().push(Event::Value(input.clone()));
        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(&input);
        }
        *self.per_value.lock()
    }

    fn receive_completion(&self, completion: Completion<E>) {
        self.events.lock().push(Event::Completion(completion));
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Recorder<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("events", &*self.events.lock())
            .field("initial", &self.initial)
            .finish()
    }
}
