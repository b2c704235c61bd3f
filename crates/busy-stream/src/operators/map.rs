#![forbid(unsafe_code)]

use std::marker::PhantomData;
use std::sync::Arc;

use crate::demand::Demand;
use crate::publisher::{BoxSubscriber, Completion, Publisher, Subscriber, Subscription};

/// Applies a function to every value. See [`PublisherExt::map`](super::PublisherExt::map).
pub struct Map<P, F> {
    upstream: P,
    transform: Arc<F>,
}

impl<P, F> Map<P, F> {
    pub fn new(upstream: P, transform: F) -> Self {
        Self {
            upstream,
            transform: Arc::new(transform),
        }
    }
}

impl<P, F, U> Publisher for Map<P, F>
where
    P: Publisher,
    F: Fn(P::Output) -> U + Send + Sync + 'static,
    U: Send + 'static,
{
    type Output = U;
    type Failure = P::Failure;

    fn subscribe(&self, downstream: BoxSubscriber<U, P::Failure>) {
        self.upstream.subscribe(Arc::new(MapSubscriber {
            downstream,
            transform: Arc::clone(&self.transform),
            _input: PhantomData,
        }));
    }
}

struct MapSubscriber<T, U, E, F> {
    downstream: BoxSubscriber<U, E>,
    transform: Arc<F>,
    _input: PhantomData<fn(T)>,
}

impl<T, U, E, F> Subscriber for MapSubscriber<T, U, E, F>
where
    F: Fn(T) -> U + Send + Sync,
{
    type Input = T;
    type Failure = E;

    fn receive_subscription(&self, subscription: Arc<dyn Subscription>) {
        self.downstream.receive_subscription(subscription);
    }

    fn receive(&self, input: T) -> Demand {
        self.downstream.receive((self.transform)(input))
    }

    fn receive_completion(&self, completion: Completion<E>) {
        self.downstream.receive_completion(completion);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::Never;
    use crate::subject::PassthroughSubject;
    use crate::testing::Recorder;

    #[test]
    fn maps_values_and_passes_demand_through() {
        let subject = PassthroughSubject::<u32, Never>::new();
        let rec = Recorder::<String, Never>::new(Demand::max(2));
        Map::new(subject.clone(), |v: u32| format!("#{v}")).subscribe(rec.clone());
        subject.send(1);
        subject.send(2);
        subject.send(3);
        assert_eq!(rec.values(), vec!["#1".to_owned(), "#2".to_owned()]);
    }

    #[test]
    fn forwards_completion() {
        let subject = PassthroughSubject::<u32, Never>::new();
        let rec = Recorder::<u32, Never>::unlimited();
        Map::new(subject.clone(), |v: u32| v + 1).subscribe(rec.clone());
        subject.send_completion(Completion::Finished);
        assert_eq!(rec.completion(), Some(Completion::Finished));
    }
}
