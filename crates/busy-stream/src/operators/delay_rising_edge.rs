#![forbid(unsafe_code)]

//! Debounce `false -> true` transitions of a boolean stream.
//!
//! # Design
//!
//! `true` arms a one-shot timer on the scheduler and is withheld; when the
//! timer fires, `true` is emitted through the operator's [`Sink`]. `false`
//! disarms any pending timer and is emitted immediately. A rise shorter than
//! the delay therefore produces nothing at all.
//!
//! A withheld `true` consumed a unit of upstream demand that never reached
//! the buffer; the gate hands it back so the `false` that follows is not
//! starved under bounded demand.
//!
//! # Invariants
//!
//! - At most one timer is pending per subscription.
//! - A timer only emits if it is still the armed one (generation check), so a
//!   stale timer that already started running cannot leak a `true` after a
//!   later `false`.
//! - Values keep their relative order: a `false` never overtakes an earlier
//!   emitted `true`.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use web_time::Duration;

use crate::demand::Demand;
use crate::publisher::{BoxSubscriber, Publisher, Subscription};
use crate::scheduler::{SharedScheduler, TimerHandle};
use crate::sink::Sink;

type EdgeSink<E> = Sink<bool, E, bool, E>;

/// See [`PublisherExt::delay_rising_edge`](super::PublisherExt::delay_rising_edge).
pub struct DelayRisingEdge<P> {
    upstream: P,
    delay: Duration,
    scheduler: SharedScheduler,
}

impl<P> DelayRisingEdge<P> {
    pub fn new(upstream: P, delay: Duration, scheduler: SharedScheduler) -> Self {
        Self {
            upstream,
            delay,
            scheduler,
        }
    }
}

impl<P> Publisher for DelayRisingEdge<P>
where
    P: Publisher<Output = bool>,
{
    type Output = bool;
    type Failure = P::Failure;

    fn subscribe(&self, downstream: BoxSubscriber<bool, P::Failure>) {
        let gate = Arc::new_cyclic(|me| EdgeGate {
            me: me.clone(),
            delay: self.delay,
            scheduler: Arc::clone(&self.scheduler),
            state: Mutex::new(EdgeState::default()),
            sink: Mutex::new(Weak::new()),
        });
        let input_gate = Arc::clone(&gate);
        let sink = Sink::new(
            Arc::clone(&downstream),
            Some(Box::new(move |busy: bool| input_gate.on_input(busy))),
            Some(Box::new(|error: P::Failure| Some(error))),
        );
        *gate.sink.lock() = Arc::downgrade(&sink);
        downstream.receive_subscription(Arc::new(EdgeSubscription {
            sink: Arc::clone(&sink),
            gate,
        }));
        self.upstream.subscribe(sink.subscriber());
    }
}

struct Armed {
    generation: u64,
    timer: TimerHandle,
}

#[derive(Default)]
struct EdgeState {
    next_generation: u64,
    armed: Option<Armed>,
}

struct EdgeGate<E> {
    me: Weak<EdgeGate<E>>,
    delay: Duration,
    scheduler: SharedScheduler,
    state: Mutex<EdgeState>,
    sink: Mutex<Weak<EdgeSink<E>>>,
}

impl<E> EdgeGate<E>
where
    E: Send + 'static,
{
    fn on_input(&self, busy: bool) -> Option<bool> {
        if busy {
            self.arm();
            let sink = self.sink.lock().upgrade();
            if let Some(sink) = sink {
                sink.replenish(Demand::max(1));
            }
            None
        } else {
            self.disarm();
            Some(false)
        }
    }

    fn arm(&self) {
        let mut state = self.state.lock();
        if state.armed.is_some() {
            return;
        }
        state.next_generation += 1;
        let generation = state.next_generation;
        let gate = self.me.clone();
        let timer = self.scheduler.schedule_after(
            self.delay,
            Box::new(move || {
                if let Some(gate) = gate.upgrade() {
                    gate.fire(generation);
                }
            }),
        );
        state.armed = Some(Armed { generation, timer });
    }

    fn disarm(&self) {
        let armed = self.state.lock().armed.take();
        if let Some(armed) = armed {
            armed.timer.cancel();
        }
    }

    fn fire(&self, generation: u64) {
        {
            let mut state = self.state.lock();
            match &state.armed {
                Some(armed) if armed.generation == generation => state.armed = None,
                _ => return,
            }
        }
        let sink = self.sink.lock().upgrade();
        if let Some(sink) = sink {
            sink.forward(true);
        }
    }
}

struct EdgeSubscription<E> {
    sink: Arc<EdgeSink<E>>,
    gate: Arc<EdgeGate<E>>,
}

impl<E> Subscription for EdgeSubscription<E>
where
    E: Send + 'static,
{
    fn request(&self, demand: Demand) {
        self.sink.demand(demand);
    }

    fn cancel(&self) {
        self.gate.disarm();
        self.sink.cancel_upstream();
    }
}
