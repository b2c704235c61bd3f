#![forbid(unsafe_code)]

//! Pair the latest values of two publishers.
//!
//! Both inputs are pulled with unlimited demand; once each has produced a
//! value, every further value from either side emits a fresh tuple into a
//! [`DemandBuffer`] that serves the downstream. The stream finishes when both
//! inputs finish and fails as soon as either fails, cancelling the other.
//!
//! Storing a value and pushing the tuple it completes happen as one step
//! under an emit lock, so tuples reach the downstream in the order the
//! inputs were updated even when the inputs send from different threads.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::trace;

use crate::demand::Demand;
use crate::demand_buffer::DemandBuffer;
use crate::publisher::{
    AnyPublisher, AnySubscriber, BoxSubscriber, Completion, Publisher, Subscription,
};

use super::PublisherExt;

/// See [`combine_latest`].
pub struct CombineLatest<A, B> {
    left: A,
    right: B,
}

impl<A, B> CombineLatest<A, B> {
    pub fn new(left: A, right: B) -> Self {
        Self { left, right }
    }
}

/// Combine the latest values of two publishers into tuples.
pub fn combine_latest<A, B>(left: A, right: B) -> CombineLatest<A, B>
where
    A: Publisher,
    B: Publisher<Failure = A::Failure>,
    A::Output: Clone,
    B::Output: Clone,
{
    CombineLatest::new(left, right)
}

/// Three-way [`combine_latest`], composed pairwise.
pub fn combine_latest3<A, B, C>(
    first: A,
    second: B,
    third: C,
) -> AnyPublisher<(A::Output, B::Output, C::Output), A::Failure>
where
    A: Publisher,
    B: Publisher<Failure = A::Failure>,
    C: Publisher<Failure = A::Failure>,
    A::Output: Clone,
    B::Output: Clone,
    C::Output: Clone,
{
    combine_latest(combine_latest(first, second), third)
        .map(|((a, b), c)| (a, b, c))
        .erase()
}

impl<A, B> Publisher for CombineLatest<A, B>
where
    A: Publisher,
    B: Publisher<Failure = A::Failure>,
    A::Output: Clone,
    B::Output: Clone,
{
    type Output = (A::Output, B::Output);
    type Failure = A::Failure;

    fn subscribe(&self, downstream: BoxSubscriber<Self::Output, Self::Failure>) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                left: None,
                right: None,
                finished: [false; 2],
                inputs: [None, None],
                done: false,
            }),
            emit: ReentrantMutex::new(()),
            buffer: DemandBuffer::new(Arc::clone(&downstream)),
        });
        downstream.receive_subscription(Arc::new(CombineSubscription {
            shared: Arc::clone(&shared),
        }));

        let weak = Arc::downgrade(&shared);
        self.left.subscribe(Arc::new(input(&weak, LEFT, |state, value| {
            state.left = Some(value);
        })));
        self.right.subscribe(Arc::new(input(&weak, RIGHT, |state, value| {
            state.right = Some(value);
        })));
    }
}

const LEFT: usize = 0;
const RIGHT: usize = 1;

struct State<X, Y> {
    left: Option<X>,
    right: Option<Y>,
    finished: [bool; 2],
    inputs: [Option<Arc<dyn Subscription>>; 2],
    /// Terminal event recorded or downstream cancelled.
    done: bool,
}

struct Shared<X, Y, E> {
    state: Mutex<State<X, Y>>,
    /// Held from storing a value until its tuple is in the buffer.
    /// Reentrant: the downstream may feed an input from its own `receive`.
    emit: ReentrantMutex<()>,
    buffer: DemandBuffer<(X, Y), E>,
}

fn input<X, Y, E, V>(
    shared: &Weak<Shared<X, Y, E>>,
    slot: usize,
    store: impl Fn(&mut State<X, Y>, V) + Send + Sync + 'static,
) -> AnySubscriber<V, E>
where
    X: Clone + Send + 'static,
    Y: Clone + Send + 'static,
    E: Send + 'static,
{
    let on_subscription = shared.clone();
    let on_value = shared.clone();
    let on_completion = shared.clone();
    AnySubscriber::new(
        move |subscription: Arc<dyn Subscription>| match on_subscription.upgrade() {
            Some(shared) => shared.attach_input(slot, subscription),
            None => subscription.cancel(),
        },
        move |value: V| {
            if let Some(shared) = on_value.upgrade() {
                shared.update(|state| store(state, value));
            }
            Demand::NONE
        },
    )
    .on_completion(move |completion| {
        if let Some(shared) = on_completion.upgrade() {
            shared.finish(slot, completion);
        }
    })
}

impl<X, Y, E> Shared<X, Y, E>
where
    X: Clone + Send + 'static,
    Y: Clone + Send + 'static,
    E: Send + 'static,
{
    fn attach_input(&self, slot: usize, subscription: Arc<dyn Subscription>) {
        {
            let mut state = self.state.lock();
            if state.done {
                drop(state);
                subscription.cancel();
                return;
            }
            state.inputs[slot] = Some(Arc::clone(&subscription));
        }
        subscription.request(Demand::Unlimited);
    }

    fn update(&self, store: impl FnOnce(&mut State<X, Y>)) {
        let _emit = self.emit.lock();
        let tuple = {
            let mut state = self.state.lock();
            if state.done {
                return;
            }
            store(&mut state);
            match (&state.left, &state.right) {
                (Some(x), Some(y)) => Some((x.clone(), y.clone())),
                _ => None,
            }
        };
        // Inputs run with unlimited demand, so nothing owed is forwarded.
        if let Some(tuple) = tuple
            && self.buffer.try_push(tuple).is_none()
        {
            trace!("combine_latest value dropped after completion");
        }
    }

    fn finish(&self, slot: usize, completion: Completion<E>) {
        let _emit = self.emit.lock();
        let (terminal, others) = {
            let mut state = self.state.lock();
            if state.done {
                return;
            }
            state.inputs[slot] = None;
            match completion {
                Completion::Failure(error) => {
                    state.done = true;
                    let others: Vec<_> = state.inputs.iter_mut().filter_map(Option::take).collect();
                    (Some(Completion::Failure(error)), others)
                }
                Completion::Finished => {
                    state.finished[slot] = true;
                    if state.finished.iter().all(|f| *f) {
                        state.done = true;
                        (Some(Completion::Finished), Vec::new())
                    } else {
                        (None, Vec::new())
                    }
                }
            }
        };
        for other in others {
            other.cancel();
        }
        if let Some(terminal) = terminal {
            self.buffer.complete(terminal);
        }
    }

    fn cancel(&self) {
        let inputs: Vec<_> = {
            let mut state = self.state.lock();
            state.done = true;
            state.inputs.iter_mut().filter_map(Option::take).collect()
        };
        for input in inputs {
            input.cancel();
        }
    }
}

impl<X, Y, E> Drop for Shared<X, Y, E> {
    fn drop(&mut self) {
        for input in self.state.get_mut().inputs.iter_mut().filter_map(Option::take) {
            input.cancel();
        }
    }
}

struct CombineSubscription<X, Y, E> {
    shared: Arc<Shared<X, Y, E>>,
}

impl<X, Y, E> Subscription for CombineSubscription<X, Y, E>
where
    X: Clone + Send + 'static,
    Y: Clone + Send + 'static,
    E: Send + 'static,
{
    fn request(&self, demand: Demand) {
        // Inputs are already unlimited; nothing is owed upstream.
        let _ = self.shared.buffer.request_more(demand);
    }

    fn cancel(&self) {
        self.shared.cancel();
    }
}
