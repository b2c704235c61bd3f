#![forbid(unsafe_code)]

//! Re-deliver values and completion on a [`Scheduler`].
//!
//! The subscription handshake and demand requests stay synchronous; only
//! downstream deliveries hop onto the scheduler, one task per event, in
//! upstream order. Demand returned by the downstream from a scheduled
//! delivery is forwarded upstream from that task.
//!
//! # Failure Modes
//!
//! - **Cancelled before a scheduled delivery runs**: the delivery is skipped.
//! - **Subscription dropped without `cancel`**: treated as a cancel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::demand::Demand;
use crate::publisher::{BoxSubscriber, Completion, Publisher, Subscriber, Subscription};
use crate::scheduler::SharedScheduler;

/// See [`PublisherExt::receive_on`](super::PublisherExt::receive_on).
pub struct ReceiveOn<P> {
    upstream: P,
    scheduler: SharedScheduler,
}

impl<P> ReceiveOn<P> {
    pub fn new(upstream: P, scheduler: SharedScheduler) -> Self {
        Self {
            upstream,
            scheduler,
        }
    }
}

impl<P> Publisher for ReceiveOn<P>
where
    P: Publisher,
{
    type Output = P::Output;
    type Failure = P::Failure;

    fn subscribe(&self, downstream: BoxSubscriber<P::Output, P::Failure>) {
        let shared = Arc::new(Shared {
            downstream,
            scheduler: Arc::clone(&self.scheduler),
            upstream: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        });
        self.upstream.subscribe(Arc::new(ReceiveOnSubscriber { shared }));
    }
}

struct Shared<T, E> {
    downstream: BoxSubscriber<T, E>,
    scheduler: SharedScheduler,
    upstream: Mutex<Option<Arc<dyn Subscription>>>,
    cancelled: AtomicBool,
}

impl<T, E> Shared<T, E> {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn request_upstream(&self, demand: Demand) {
        if demand.is_none() {
            return;
        }
        let upstream = self.upstream.lock().clone();
        if let Some(upstream) = upstream {
            upstream.request(demand);
        }
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let upstream = self.upstream.lock().take();
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }

    fn deliver(&self, value: T) {
        if self.is_cancelled() {
            return;
        }
        let more = self.downstream.receive(value);
        self.request_upstream(more);
    }
}

struct ReceiveOnSubscriber<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Subscriber for ReceiveOnSubscriber<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Input = T;
    type Failure = E;

    fn receive_subscription(&self, subscription: Arc<dyn Subscription>) {
        if self.shared.is_cancelled() {
            subscription.cancel();
            return;
        }
        *self.shared.upstream.lock() = Some(subscription);
        self.shared
            .downstream
            .receive_subscription(Arc::new(ReceiveOnSubscription {
                shared: Arc::clone(&self.shared),
            }));
    }

    fn receive(&self, input: T) -> Demand {
        let shared = Arc::clone(&self.shared);
        self.shared
            .scheduler
            .schedule(Box::new(move || shared.deliver(input)));
        Demand::NONE
    }

    fn receive_completion(&self, completion: Completion<E>) {
        self.shared.upstream.lock().take();
        let shared = Arc::clone(&self.shared);
        self.shared.scheduler.schedule(Box::new(move || {
            if !shared.is_cancelled() {
                shared.downstream.receive_completion(completion);
            }
        }));
    }
}

struct ReceiveOnSubscription<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Subscription for ReceiveOnSubscription<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn request(&self, demand: Demand) {
        self.shared.request_upstream(demand);
    }

    fn cancel(&self) {
        self.shared.cancel();
    }
}

impl<T, E> Drop for ReceiveOnSubscription<T, E> {
    fn drop(&mut self) {
        self.shared.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::Never;
    use crate::scheduler::VirtualScheduler;
    use crate::subject::PassthroughSubject;
    use crate::testing::Recorder;

    fn setup() -> (
        Arc<VirtualScheduler>,
        PassthroughSubject<u32, Never>,
        Arc<Recorder<u32, Never>>,
    ) {
        let sched = Arc::new(VirtualScheduler::new());
        let subject = PassthroughSubject::new();
        let rec = Recorder::unlimited();
        ReceiveOn::new(subject.clone(), sched.clone()).subscribe(rec.clone());
        (sched, subject, rec)
    }

    #[test]
    fn delivery_waits_for_scheduler() {
        let (sched, subject, rec) = setup();
        subject.send(1);
        subject.send(2);
        assert!(rec.values().is_empty());
        sched.run_until_idle();
        assert_eq!(rec.values(), vec![1, 2]);
    }

    #[test]
    fn completion_follows_values() {
        let (sched, subject, rec) = setup();
        subject.send(1);
        subject.send_completion(Completion::Finished);
        sched.run_until_idle();
        assert_eq!(
            rec.events(),
            vec![
                crate::testing::Event::Value(1),
                crate::testing::Event::Completion(Completion::Finished)
            ]
        );
    }

    #[test]
    fn cancel_skips_scheduled_deliveries() {
        let (sched, subject, rec) = setup();
        subject.send(1);
        rec.cancel();
        sched.run_until_idle();
        assert!(rec.values().is_empty());
        assert_eq!(subject.subscriber_count(), 0);
    }

    #[test]
    fn dropping_subscription_detaches_upstream() {
        let (sched, subject, rec) = setup();
        subject.send(1);
        rec.release();
        assert_eq!(subject.subscriber_count(), 0);
        sched.run_until_idle();
        assert!(rec.values().is_empty());
    }

    #[test]
    fn returned_demand_reaches_upstream() {
        let sched = Arc::new(VirtualScheduler::new());
        let subject = PassthroughSubject::<u32, Never>::new();
        let rec = Recorder::<u32, Never>::new(Demand::max(1)).with_per_value(Demand::max(1));
        ReceiveOn::new(subject.clone(), sched.clone()).subscribe(rec.clone());
        subject.send(1);
        sched.run_until_idle();
        subject.send(2);
        sched.run_until_idle();
        assert_eq!(rec.values(), vec![1, 2]);
    }
}
