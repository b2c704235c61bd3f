#![forbid(unsafe_code)]

//! Busy-queue coordination.
//!
//! Callers take a [`BusyToken`] for each unit of outstanding work and release
//! it (explicitly or by dropping it) when done. The [`BusyIndicatorService`]
//! serializes those events on one scheduler and derives:
//!
//! - a global busy signal that turns `true` only after the queue has been
//!   non-empty for the configured show delay, and `false` as soon as it
//!   empties;
//! - per-identifier membership signals, without delay.
//!
//! Both are exposed read-only through [`BusyIndicator`].
//!
//! # Example
//!
//! ```no_run
//! use busy_core::{BusyIndicatorConfiguration, BusyIndicatorService};
//! use busy_stream::PublisherExt;
//!
//! let service = BusyIndicatorService::new(BusyIndicatorConfiguration::from_env());
//! let _updates = service
//!     .busy_indicator()
//!     .busy()
//!     .for_each(|busy| println!("busy = {busy}"));
//!
//! let token = service.enqueue();
//! // ... work ...
//! drop(token);
//! ```

pub mod config;
pub mod error;
pub mod indicator;
mod queue;
pub mod service;
pub mod token;

pub use config::{BusyIndicatorConfiguration, DEFAULT_SHOW_DELAY, SHOW_DELAY_ENV};
pub use error::{BusyError, Result};
pub use indicator::BusyIndicator;
pub use service::{BusyIndicatorService, BusyQueue};
pub use token::BusyToken;
