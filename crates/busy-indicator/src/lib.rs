#![forbid(unsafe_code)]

//! Busy indicator public facade crate.
//!
//! Re-exports the coordinator from `busy-core` and the stream runtime it is
//! built on from `busy-stream`.
//!
//! ```no_run
//! use busy_indicator::prelude::*;
//!
//! let service = BusyIndicatorService::new(BusyIndicatorConfiguration::from_env());
//! let _updates = service
//!     .busy_indicator()
//!     .busy()
//!     .for_each(|busy| println!("busy = {busy}"));
//! let _token = service.enqueue_with_identifier("sync");
//! ```

pub use busy_core::{
    BusyError, BusyIndicator, BusyIndicatorConfiguration, BusyIndicatorService, BusyQueue,
    BusyToken, DEFAULT_SHOW_DELAY, Result, SHOW_DELAY_ENV,
};

pub mod prelude {
    pub use busy_core as core;
    pub use busy_stream as stream;

    pub use busy_core::{
        BusyIndicator, BusyIndicatorConfiguration, BusyIndicatorService, BusyQueue, BusyToken,
    };
    pub use busy_stream::prelude::*;
}
