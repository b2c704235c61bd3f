#![forbid(unsafe_code)]

//! Handles for outstanding work.
//!
//! # Invariants
//!
//! - A token notifies its coordinator at most once, whether released through
//!   [`BusyToken::dequeue`], by drop, or concurrently through both.
//! - A token never keeps its coordinator alive; releasing it after the
//!   coordinator is gone is a silent no-op.
//! - A displaced token (its identifier was re-enqueued) is already marked
//!   dequeued, so its release is a no-op.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::service::ServiceCore;

/// Liveness shared between a token and the queue slot that references it.
#[derive(Debug, Default)]
pub(crate) struct TokenShared {
    dequeued: AtomicBool,
}

impl TokenShared {
    /// Mark as dequeued. Returns `true` only for the first caller.
    pub(crate) fn mark_dequeued(&self) -> bool {
        !self.dequeued.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_dequeued(&self) -> bool {
        self.dequeued.load(Ordering::Acquire)
    }
}

/// One unit of outstanding work. Dequeues when released or dropped.
#[must_use = "dropping a BusyToken dequeues it immediately"]
pub struct BusyToken {
    identifier: String,
    serial: u64,
    shared: Arc<TokenShared>,
    coordinator: Weak<ServiceCore>,
}

impl BusyToken {
    pub(crate) fn new(identifier: String, serial: u64, coordinator: Weak<ServiceCore>) -> Self {
        Self {
            identifier,
            serial,
            shared: Arc::new(TokenShared::default()),
            coordinator,
        }
    }

    pub(crate) fn shared(&self) -> Weak<TokenShared> {
        Arc::downgrade(&self.shared)
    }

    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Whether this token has been released or displaced.
    #[must_use]
    pub fn is_dequeued(&self) -> bool {
        self.shared.is_dequeued()
    }

    /// Release the work slot. Idempotent.
    pub fn dequeue(&self) {
        if !self.shared.mark_dequeued() {
            return;
        }
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.notify_dequeue(&self.identifier, self.serial);
        }
    }
}

impl Drop for BusyToken {
    fn drop(&mut self) {
        self.dequeue();
    }
}

impl fmt::Debug for BusyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusyToken")
            .field("identifier", &self.identifier)
            .field("serial", &self.serial)
            .field("dequeued", &self.is_dequeued())
            .finish()
    }
}
