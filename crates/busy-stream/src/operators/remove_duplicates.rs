#![forbid(unsafe_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use crate::demand::Demand;
use crate::publisher::{BoxSubscriber, Completion, Publisher, Subscriber, Subscription};

/// Suppresses values equal to the previous one.
///
/// A suppressed value still consumed one unit of upstream demand; it is
/// refunded by returning `max(1)` so the downstream's budget is not eroded.
pub struct RemoveDuplicates<P> {
    upstream: P,
}

impl<P> RemoveDuplicates<P> {
    pub fn new(upstream: P) -> Self {
        Self { upstream }
    }
}

impl<P> Publisher for RemoveDuplicates<P>
where
    P: Publisher,
    P::Output: Clone + PartialEq,
{
    type Output = P::Output;
    type Failure = P::Failure;

    fn subscribe(&self, downstream: BoxSubscriber<P::Output, P::Failure>) {
        self.upstream.subscribe(Arc::new(RemoveDuplicatesSubscriber {
            downstream,
            last: Mutex::new(None),
        }));
    }
}

struct RemoveDuplicatesSubscriber<T, E> {
    downstream: BoxSubscriber<T, E>,
    last: Mutex<Option<T>>,
}

impl<T, E> Subscriber for RemoveDuplicatesSubscriber<T, E>
where
    T: Clone + PartialEq + Send,
{
    type Input = T;
    type Failure = E;

    fn receive_subscription(&self, subscription: Arc<dyn Subscription>) {
        self.downstream.receive_subscription(subscription);
    }

    fn receive(&self, input: T) -> Demand {
        {
            let mut last = self.last.lock();
            if last.as_ref() == Some(&input) {
                return Demand::max(1);
            }
            *last = Some(input.clone());
        }
        self.downstream.receive(input)
    }

    fn receive_completion(&self, completion: Completion<E>) {
        self.downstream.receive_completion(completion);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::Never;
    use crate::subject::{CurrentValueSubject, PassthroughSubject};
    use crate::testing::Recorder;

    #[test]
    fn drops_consecutive_duplicates_only() {
        let subject = PassthroughSubject::<u8, Never>::new();
        let rec = Recorder::<u8, Never>::unlimited();
        RemoveDuplicates::new(subject.clone()).subscribe(rec.clone());
        for v in [1, 1, 2, 2, 2, 1, 3, 3] {
            subject.send(v);
        }
        assert_eq!(rec.values(), vec![1, 2, 1, 3]);
    }

    #[test]
    fn suppressed_value_refunds_demand() {
        let subject = CurrentValueSubject::<bool, Never>::new(false);
        let rec = Recorder::<bool, Never>::new(Demand::max(2));
        RemoveDuplicates::new(subject.clone()).subscribe(rec.clone());
        // Replayed `false` takes one unit.
        subject.send(false);
        subject.send(false);
        // Refunds kept the second unit available.
        subject.send(true);
        assert_eq!(rec.values(), vec![false, true]);
    }
}
