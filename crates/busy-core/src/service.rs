#![forbid(unsafe_code)]

//! The busy-queue coordinator.
//!
//! # Design
//!
//! ```text
//!  enqueue / token release (any thread)
//!        │  QueueEvent
//!        ▼
//!  events ─▶ receive_on(serial) ─▶ with_latest_from(state, apply) ─▶ state.send
//!                                                                     │
//!        ┌────────────────────────────────────────────────────────────┘
//!        ▼
//!  state ─▶ map(non-empty) ─▶ remove_duplicates ─▶ receive_on(serial)
//!        ─▶ delay_rising_edge(show_delay) ─▶ remove_duplicates ─▶ busy
//! ```
//!
//! Every mutation is an event applied on the scheduler, which is therefore the
//! only writer of the queue state. The busy signal is derived from the state
//! on that same scheduler, so the debounce timer and the `false` that cancels
//! it are ordered with the mutations that caused them.
//!
//! Consumers that need values on a particular context (a UI thread) marshal
//! with `receive_on` themselves.
//!
//! # Failure Modes
//!
//! - **Service dropped while tokens are outstanding**: pipelines are torn
//!   down; later token releases find no coordinator and do nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use busy_stream::prelude::*;
use tracing::debug;
use uuid::Uuid;

use crate::config::BusyIndicatorConfiguration;
use crate::error::Result;
use crate::indicator::BusyIndicator;
use crate::queue::{QueueEvent, QueueState};
use crate::token::BusyToken;

/// Anything that hands out busy tokens.
pub trait BusyQueue: Send + Sync {
    /// Start tracking one unit of anonymous work.
    fn enqueue(&self) -> BusyToken;

    /// Start tracking work under `identifier`, displacing any live token
    /// already registered under it. The displaced token reads as dequeued
    /// only once the scheduler has applied the enqueue.
    fn enqueue_with_identifier(&self, identifier: &str) -> BusyToken;

    /// Number of outstanding tokens, updated as mutations are applied.
    fn queue(&self) -> AnyPublisher<usize, Never>;

    /// Read-only view of the busy signals.
    fn busy_indicator(&self) -> BusyIndicator;
}

/// State shared with tokens, which reference it weakly.
pub(crate) struct ServiceCore {
    events: PassthroughSubject<QueueEvent>,
    next_serial: AtomicU64,
}

impl ServiceCore {
    fn submit(&self, event: QueueEvent) {
        self.events.send(event);
    }

    pub(crate) fn notify_dequeue(&self, identifier: &str, serial: u64) {
        self.submit(QueueEvent::Dequeue {
            identifier: identifier.to_owned(),
            serial,
        });
    }
}

/// Coordinates outstanding work and publishes the debounced busy signal.
pub struct BusyIndicatorService {
    core: Arc<ServiceCore>,
    state: CurrentValueSubject<QueueState>,
    indicator: BusyIndicator,
    config: BusyIndicatorConfiguration,
    _pipelines: std::sync::Mutex<Vec<AnyCancellable>>,
}

impl BusyIndicatorService {
    /// Create a service with its own serial queue thread.
    ///
    /// # Panics
    ///
    /// Panics if the thread cannot be spawned; see
    /// [`try_new`](Self::try_new).
    #[must_use]
    pub fn new(config: BusyIndicatorConfiguration) -> Self {
        match Self::try_new(config) {
            Ok(service) => service,
            Err(error) => panic!("busy indicator service: {error}"),
        }
    }

    /// Create a service with its own serial queue thread.
    pub fn try_new(config: BusyIndicatorConfiguration) -> Result<Self> {
        let queue = SerialQueue::try_new("busy-indicator")?;
        Ok(Self::with_scheduler(config, Arc::new(queue)))
    }

    /// Create a service serializing its work on `scheduler`.
    ///
    /// The scheduler must run tasks one at a time in submission order.
    #[must_use]
    pub fn with_scheduler(config: BusyIndicatorConfiguration, scheduler: SharedScheduler) -> Self {
        let core = Arc::new(ServiceCore {
            events: PassthroughSubject::new(),
            next_serial: AtomicU64::new(0),
        });
        let state = CurrentValueSubject::new(QueueState::default());
        let busy = CurrentValueSubject::new(false);
        let mut pipelines = Vec::new();

        let publish_state = state.clone();
        core.events
            .clone()
            .receive_on(Arc::clone(&scheduler))
            .with_latest_from(state.clone(), |event, current: QueueState| current.apply(event))
            .for_each(move |next| publish_state.send(next))
            .store_in(&mut pipelines);

        let publish_busy = busy.clone();
        state
            .clone()
            .map(|state| !state.is_empty())
            .remove_duplicates()
            .receive_on(Arc::clone(&scheduler))
            .delay_rising_edge(config.show_delay, Arc::clone(&scheduler))
            .remove_duplicates()
            .for_each(move |value| {
                if publish_busy.send_if_changed(value) {
                    debug!(busy = value, "busy state changed");
                }
            })
            .store_in(&mut pipelines);

        debug!(show_delay = ?config.show_delay, "busy indicator service started");
        Self {
            core,
            indicator: BusyIndicator::live(busy, state.clone()),
            state,
            config,
            _pipelines: std::sync::Mutex::new(pipelines),
        }
    }

    #[must_use]
    pub fn configuration(&self) -> BusyIndicatorConfiguration {
        self.config
    }

    /// Start tracking one unit of anonymous work under a fresh UUID.
    pub fn enqueue(&self) -> BusyToken {
        self.enqueue_with_identifier(Uuid::new_v4().to_string())
    }

    /// Start tracking work under `identifier`.
    ///
    /// A live token already registered under `identifier` is displaced: it is
    /// marked dequeued and releasing it later has no effect.
    ///
    /// Displacement happens when the scheduler applies the enqueue, not in
    /// this call. Until then the old token still reports
    /// [`BusyToken::is_dequeued`] as `false`.
    pub fn enqueue_with_identifier(&self, identifier: impl Into<String>) -> BusyToken {
        let identifier = identifier.into();
        let serial = self.core.next_serial.fetch_add(1, Ordering::Relaxed) + 1;
        let token = BusyToken::new(identifier.clone(), serial, Arc::downgrade(&self.core));
        self.core.submit(QueueEvent::Enqueue {
            identifier,
            serial: token.serial(),
            token: token.shared(),
        });
        token
    }

    /// Outstanding token count, replaying the current count to new
    /// subscribers.
    #[must_use]
    pub fn queue(&self) -> AnyPublisher<usize, Never> {
        self.state
            .clone()
            .map(|state| state.len())
            .remove_duplicates()
            .erase()
    }

    /// Outstanding token count as of the last applied mutation.
    #[must_use]
    pub fn queue_size(&self) -> usize {
        self.state.value().len()
    }

    #[must_use]
    pub fn busy_indicator(&self) -> BusyIndicator {
        self.indicator.clone()
    }
}

impl Default for BusyIndicatorService {
    fn default() -> Self {
        Self::new(BusyIndicatorConfiguration::default())
    }
}

impl BusyQueue for BusyIndicatorService {
    fn enqueue(&self) -> BusyToken {
        Self::enqueue(self)
    }

    fn enqueue_with_identifier(&self, identifier: &str) -> BusyToken {
        Self::enqueue_with_identifier(self, identifier)
    }

    fn queue(&self) -> AnyPublisher<usize, Never> {
        Self::queue(self)
    }

    fn busy_indicator(&self) -> BusyIndicator {
        Self::busy_indicator(self)
    }
}

impl std::fmt::Debug for BusyIndicatorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusyIndicatorService")
            .field("config", &self.config)
            .field("state", &self.state.value())
            .finish_non_exhaustive()
    }
}
