#![forbid(unsafe_code)]

//! Demand-aware reactive streams.
//!
//! A small push-based stream runtime with backpressure: publishers deliver
//! values only within the demand their subscribers requested.
//!
//! - [`demand`]: the [`Demand`] algebra and per-subscription ledger.
//! - [`demand_buffer`]: a reentrancy-safe FIFO reconciling upstream pushes
//!   with downstream demand.
//! - [`sink`]: the generic operator bridge built on that buffer.
//! - [`subject`]: hot, multicasting publishers ([`PassthroughSubject`],
//!   [`CurrentValueSubject`]).
//! - [`operators`]: combinators via [`PublisherExt`].
//! - [`scheduler`]: a dedicated serial queue thread and a virtual clock.
//!
//! # Example
//!
//! ```
//! use busy_stream::prelude::*;
//!
//! let busy = CurrentValueSubject::<bool>::new(false);
//! let _guard = busy
//!     .clone()
//!     .remove_duplicates()
//!     .for_each(|value| println!("busy: {value}"));
//! busy.send(true);
//! ```

pub mod demand;
pub mod demand_buffer;
pub mod operators;
pub mod publisher;
pub mod scheduler;
pub mod sink;
pub mod subject;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use demand::{Demand, DemandState};
pub use demand_buffer::DemandBuffer;
pub use operators::PublisherExt;
pub use publisher::{
    AnyCancellable, AnyPublisher, AnySubscriber, BoxSubscriber, Completion, ForEach, Just, Never,
    Publisher, Subscriber, Subscription,
};
pub use scheduler::{Scheduler, SerialQueue, SharedScheduler, TimerHandle, VirtualScheduler};
pub use sink::Sink;
pub use subject::{CurrentValueSubject, PassthroughSubject};

/// Everything needed to build and consume pipelines.
pub mod prelude {
    pub use crate::demand::Demand;
    pub use crate::operators::{PublisherExt, combine_latest, combine_latest3};
    pub use crate::publisher::{
        AnyCancellable, AnyPublisher, AnySubscriber, Completion, Just, Never, Publisher,
        Subscriber, Subscription,
    };
    pub use crate::scheduler::{Scheduler, SerialQueue, SharedScheduler, VirtualScheduler};
    pub use crate::subject::{CurrentValueSubject, PassthroughSubject};
}
