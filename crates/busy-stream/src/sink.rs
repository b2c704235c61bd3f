#![forbid(unsafe_code)]

//! Generic operator sink: adapts an upstream publisher into a
//! [`DemandBuffer`] for one downstream subscriber.
//!
//! The sink owns the upstream subscription. Downstream demand goes through
//! [`Sink::demand`]; the buffer decides how much of it must be forwarded
//! upstream. Upstream values pass through the output transform first; a
//! `None` result drops the value silently, which lets operators filter (or
//! defer) before anything is buffered.
//!
//! The upstream only ever holds a weak handle to the sink (see
//! [`Sink::subscriber`]), so whoever owns the `Arc<Sink>` owns the link:
//! dropping the last handle cancels the upstream subscription.
//!
//! # Failure Modes
//!
//! - **Missing transform**: receiving a value without an output transform, or
//!   a failure without a failure transform, is a construction bug and panics.
//! - **Failure transform returns `None`**: the upstream error is swallowed and
//!   the downstream is not completed.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::demand::Demand;
use crate::demand_buffer::DemandBuffer;
use crate::publisher::{BoxSubscriber, Completion, Publisher, Subscriber, Subscription};

/// Maps an upstream value to a downstream value, or drops it.
pub type TransformOutput<In, Out> = Box<dyn Fn(In) -> Option<Out> + Send + Sync>;
/// Maps an upstream failure to a downstream failure, or swallows it.
pub type TransformFailure<UpE, E> = Box<dyn Fn(UpE) -> Option<E> + Send + Sync>;

#[derive(Default)]
struct UpstreamSlot {
    subscription: Option<Arc<dyn Subscription>>,
    /// Demand owed upstream before its subscription arrived.
    pending: Demand,
}

/// Bridges an upstream publisher and a downstream subscriber through a
/// [`DemandBuffer`].
pub struct Sink<In, UpE, Out, E> {
    buffer: DemandBuffer<Out, E>,
    upstream: Mutex<UpstreamSlot>,
    cancelled: AtomicBool,
    transform_output: Option<TransformOutput<In, Out>>,
    transform_failure: Option<TransformFailure<UpE, E>>,
}

impl<In, UpE, Out, E> Sink<In, UpE, Out, E>
where
    In: Send + 'static,
    UpE: Send + 'static,
    Out: Send + 'static,
    E: Send + 'static,
{
    /// Create a sink without subscribing it anywhere yet.
    pub fn new(
        downstream: BoxSubscriber<Out, E>,
        transform_output: Option<TransformOutput<In, Out>>,
        transform_failure: Option<TransformFailure<UpE, E>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            buffer: DemandBuffer::new(downstream),
            upstream: Mutex::new(UpstreamSlot::default()),
            cancelled: AtomicBool::new(false),
            transform_output,
            transform_failure,
        })
    }

    /// Create a sink and subscribe it to `upstream`.
    pub fn attach<P>(
        upstream: &P,
        downstream: BoxSubscriber<Out, E>,
        transform_output: Option<TransformOutput<In, Out>>,
        transform_failure: Option<TransformFailure<UpE, E>>,
    ) -> Arc<Self>
    where
        P: Publisher<Output = In, Failure = UpE> + ?Sized,
    {
        let sink = Self::new(downstream, transform_output, transform_failure);
        upstream.subscribe(sink.subscriber());
        sink
    }

    /// The subscriber to hand to the upstream publisher.
    ///
    /// It refers to the sink weakly; once the sink is gone it rejects new
    /// subscriptions and ignores values.
    #[must_use]
    pub fn subscriber(self: &Arc<Self>) -> BoxSubscriber<In, UpE> {
        Arc::new(SinkSubscriber {
            sink: Arc::downgrade(self),
        })
    }

    /// Relay downstream demand; forwards whatever the buffer now owes.
    pub fn demand(&self, demand: Demand) {
        let owed = self.buffer.request_more(demand);
        self.request_upstream(owed);
    }

    /// Push a value produced by the operator itself rather than the upstream
    /// (for example a timer firing). Dropped once the sink has completed.
    pub fn forward(&self, value: Out) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        if let Some(owed) = self.buffer.try_push(value) {
            self.request_upstream(owed);
        }
    }

    /// Ask the upstream for `demand` beyond what the buffer forwarded.
    ///
    /// For operators whose output transform withholds a value: the upstream
    /// counted it against the demand it was given, but nothing reached the
    /// buffer to account for it.
    pub fn replenish(&self, demand: Demand) {
        if !self.is_cancelled() {
            self.request_upstream(demand);
        }
    }

    #[must_use]
    pub fn buffer(&self) -> &DemandBuffer<Out, E> {
        &self.buffer
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Cancel the upstream subscription. Idempotent.
    pub fn cancel_upstream(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscription = self.upstream.lock().subscription.take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    fn request_upstream(&self, demand: Demand) {
        if demand.is_none() {
            return;
        }
        let subscription = {
            let mut slot = self.upstream.lock();
            match &slot.subscription {
                Some(subscription) => subscription.clone(),
                None => {
                    slot.pending += demand;
                    return;
                }
            }
        };
        subscription.request(demand);
    }
}

impl<In, UpE, Out, E> Sink<In, UpE, Out, E>
where
    In: Send + 'static,
    UpE: Send + 'static,
    Out: Send + 'static,
    E: Send + 'static,
{
    fn on_subscription(&self, subscription: Arc<dyn Subscription>) {
        if self.cancelled.load(Ordering::Acquire) {
            subscription.cancel();
            return;
        }
        let pending = {
            let mut slot = self.upstream.lock();
            slot.subscription = Some(subscription.clone());
            std::mem::take(&mut slot.pending)
        };
        subscription.request_if_needed(pending);
    }

    fn on_input(&self, input: In) -> Demand {
        let Some(transform) = &self.transform_output else {
            panic!(
                "Sink received a value without an output transform; \
                 supply one or manage the DemandBuffer directly"
            );
        };
        if self.cancelled.load(Ordering::Acquire) {
            return Demand::NONE;
        }
        match transform(input) {
            Some(output) => self.buffer.push(output),
            None => Demand::NONE,
        }
    }

    fn on_completion(&self, completion: Completion<UpE>) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        match completion {
            Completion::Finished => {
                self.buffer.complete(Completion::Finished);
            }
            Completion::Failure(error) => {
                let Some(transform) = &self.transform_failure else {
                    panic!(
                        "Sink received a failure without a failure transform; \
                         supply one or manage the DemandBuffer directly"
                    );
                };
                let Some(error) = transform(error) else {
                    return;
                };
                self.buffer.complete(Completion::Failure(error));
            }
        }
        self.cancel_upstream();
    }
}

/// Upstream-facing side of a [`Sink`].
struct SinkSubscriber<In, UpE, Out, E> {
    sink: Weak<Sink<In, UpE, Out, E>>,
}

impl<In, UpE, Out, E> Subscriber for SinkSubscriber<In, UpE, Out, E>
where
    In: Send + 'static,
    UpE: Send + 'static,
    Out: Send + 'static,
    E: Send + 'static,
{
    type Input = In;
    type Failure = UpE;

    fn receive_subscription(&self, subscription: Arc<dyn Subscription>) {
        match self.sink.upgrade() {
            Some(sink) => sink.on_subscription(subscription),
            None => subscription.cancel(),
        }
    }

    fn receive(&self, input: In) -> Demand {
        match self.sink.upgrade() {
            Some(sink) => sink.on_input(input),
            None => Demand::NONE,
        }
    }

    fn receive_completion(&self, completion: Completion<UpE>) {
        if let Some(sink) = self.sink.upgrade() {
            sink.on_completion(completion);
        }
    }
}

impl<In, UpE, Out, E> Drop for Sink<In, UpE, Out, E> {
    fn drop(&mut self) {
        if !self.cancelled.swap(true, Ordering::AcqRel)
            && let Some(subscription) = self.upstream.get_mut().subscription.take()
        {
            subscription.cancel();
        }
    }
}

impl<In, UpE, Out, E> fmt::Debug for Sink<In, UpE, Out, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("buffer", &self.buffer)
            .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::Never;
    use crate::subject::PassthroughSubject;
    use crate::testing::Recorder;

    fn doubling() -> Option<TransformOutput<u32, u32>> {
        Some(Box::new(|v| Some(v * 2)))
    }

    #[test]
    fn transforms_and_buffers_by_demand() {
        let subject = PassthroughSubject::<u32, Never>::new();
        let rec = Recorder::<u32, Never>::new(Demand::NONE);
        let sink = Sink::attach(&subject, rec.clone(), doubling(), None);

        sink.demand(Demand::max(1));
        subject.send(1);
        subject.send(2);
        assert_eq!(rec.values(), vec![2]);

        sink.demand(Demand::max(1));
        // The subject dropped 2 for lack of upstream demand; nothing buffered.
        assert_eq!(rec.values(), vec![2]);
        subject.send(3);
        assert_eq!(rec.values(), vec![2, 6]);
    }

    #[test]
    fn none_transform_drops_value() {
        let subject = PassthroughSubject::<u32, Never>::new();
        let rec = Recorder::<u32, Never>::new(Demand::NONE);
        let sink = Sink::attach(
            &subject,
            rec.clone(),
            Some(Box::new(|v: u32| (v % 2 == 0).then_some(v))),
            None,
        );
        sink.demand(Demand::Unlimited);
        for v in 1..=6 {
            subject.send(v);
        }
        assert_eq!(rec.values(), vec![2, 4, 6]);
    }

    #[test]
    fn finished_upstream_completes_downstream_and_cancels() {
        let subject = PassthroughSubject::<u32, Never>::new();
        let rec = Recorder::<u32, Never>::new(Demand::NONE);
        let sink = Sink::attach(&subject, rec.clone(), doubling(), None);
        sink.demand(Demand::Unlimited);
        subject.send_completion(Completion::Finished);
        assert_eq!(rec.completion(), Some(Completion::Finished));
        assert!(sink.is_cancelled());
        assert_eq!(subject.subscriber_count(), 0);
    }

    #[test]
    fn failure_transform_none_swallows_error() {
        let subject = PassthroughSubject::<u32, &'static str>::new();
        let rec = Recorder::<u32, &'static str>::new(Demand::NONE);
        let sink = Sink::attach(
            &subject,
            rec.clone(),
            doubling(),
            Some(Box::new(|_e: &'static str| None)),
        );
        sink.demand(Demand::Unlimited);
        subject.send_completion(Completion::Failure("boom"));
        assert!(rec.completion().is_none());
    }

    #[test]
    fn failure_transform_maps_error() {
        let subject = PassthroughSubject::<u32, &'static str>::new();
        let rec = Recorder::<u32, String>::new(Demand::NONE);
        let sink = Sink::attach(
            &subject,
            rec.clone(),
            doubling(),
            Some(Box::new(|e: &'static str| Some(e.to_uppercase()))),
        );
        sink.demand(Demand::Unlimited);
        subject.send_completion(Completion::Failure("boom"));
        assert_eq!(rec.completion(), Some(Completion::Failure("BOOM".to_owned())));
    }

    #[test]
    #[should_panic(expected = "without an output transform")]
    fn missing_output_transform_panics() {
        let subject = PassthroughSubject::<u32, Never>::new();
        let rec = Recorder::<u32, Never>::new(Demand::NONE);
        let sink: Arc<Sink<u32, Never, u32, Never>> = Sink::attach(&subject, rec, None, None);
        sink.demand(Demand::Unlimited);
        subject.send(1);
    }

    #[test]
    fn dropping_sink_cancels_upstream() {
        let subject = PassthroughSubject::<u32, Never>::new();
        let rec = Recorder::<u32, Never>::new(Demand::NONE);
        {
            let sink = Sink::attach(&subject, rec.clone(), doubling(), None);
            sink.demand(Demand::Unlimited);
            subject.send(1);
            assert_eq!(subject.subscriber_count(), 1);
        }
        assert_eq!(subject.subscriber_count(), 0);
        subject.send(2);
        assert_eq!(rec.values(), vec![2]);
    }

    #[test]
    fn replenish_restores_withheld_demand() {
        let subject = PassthroughSubject::<u32, Never>::new();
        let rec = Recorder::<u32, Never>::new(Demand::NONE);
        let sink = Sink::attach(
            &subject,
            rec.clone(),
            Some(Box::new(|v: u32| (v != 0).then_some(v))),
            None,
        );
        sink.demand(Demand::max(1));
        subject.send(0);
        // The withheld value used up the only unit of upstream demand.
        subject.send(7);
        assert!(rec.values().is_empty());
        sink.replenish(Demand::max(1));
        subject.send(7);
        assert_eq!(rec.values(), vec![7]);
    }

    #[test]
    fn cancel_is_idempotent_and_detaches() {
        let subject = PassthroughSubject::<u32, Never>::new();
        let rec = Recorder::<u32, Never>::new(Demand::NONE);
        let sink = Sink::attach(&subject, rec.clone(), doubling(), None);
        sink.demand(Demand::Unlimited);
        assert_eq!(subject.subscriber_count(), 1);
        sink.cancel_upstream();
        sink.cancel_upstream();
        assert_eq!(subject.subscriber_count(), 0);
        subject.send(5);
        assert!(rec.values().is_empty());
    }
}
