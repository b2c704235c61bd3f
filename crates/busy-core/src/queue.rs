#![forbid(unsafe_code)]

//! Queue state: identifier slots pointing weakly at live tokens.
//!
//! # Design
//!
//! The state is an immutable-by-convention snapshot. Each serialized event
//! produces the next snapshot through [`QueueState::apply`]; the coordinator
//! publishes it through a `CurrentValueSubject`, so readers only ever see
//! complete states.
//!
//! # Invariants
//!
//! 1. At most one slot per identifier. Enqueueing under an occupied
//!    identifier displaces the previous token and marks it dequeued.
//! 2. A dequeue only clears a slot that still holds the same token (matched
//!    by serial), so a displaced token's late release cannot evict its
//!    successor.
//! 3. Slots whose token has been deallocated count as absent and are purged
//!    on the next mutation.
//! 4. The size is a count of live slots and cannot go negative.

use std::collections::HashMap;
use std::fmt;
use std::sync::Weak;

use tracing::debug;

use crate::token::TokenShared;

/// A mutation, serialized on the coordinator's queue.
#[derive(Clone)]
pub(crate) enum QueueEvent {
    Enqueue {
        identifier: String,
        serial: u64,
        token: Weak<TokenShared>,
    },
    Dequeue {
        identifier: String,
        serial: u64,
    },
}

#[derive(Clone)]
struct Slot {
    serial: u64,
    token: Weak<TokenShared>,
}

impl Slot {
    fn is_live(&self) -> bool {
        self.token.strong_count() > 0
    }
}

/// Snapshot of outstanding work.
#[derive(Clone, Default)]
pub(crate) struct QueueState {
    slots: HashMap<String, Slot>,
}

impl QueueState {
    /// Number of live slots.
    pub(crate) fn len(&self) -> usize {
        self.slots.values().filter(|slot| slot.is_live()).count()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `identifier` currently holds a live token.
    pub(crate) fn contains(&self, identifier: &str) -> bool {
        self.slots.get(identifier).is_some_and(Slot::is_live)
    }

    /// Produce the state that follows `event`.
    pub(crate) fn apply(&self, event: QueueEvent) -> Self {
        let mut next = self.clone();
        match event {
            QueueEvent::Enqueue {
                identifier,
                serial,
                token,
            } => {
                let previous = next.slots.insert(identifier.clone(), Slot { serial, token });
                if let Some(previous) = previous
                    && let Some(displaced) = previous.token.upgrade()
                {
                    displaced.mark_dequeued();
                    debug!(identifier = %identifier, "displaced busy token");
                }
                next.purge();
                debug!(identifier = %identifier, queue_size = next.slots.len(), "enqueued");
            }
            QueueEvent::Dequeue { identifier, serial } => {
                let matches = next
                    .slots
                    .get(&identifier)
                    .is_some_and(|slot| slot.serial == serial);
                if matches {
                    next.slots.remove(&identifier);
                }
                next.purge();
                debug!(
                    identifier = %identifier,
                    removed = matches,
                    queue_size = next.slots.len(),
                    "dequeued"
                );
            }
        }
        next
    }

    fn purge(&mut self) {
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.is_live());
        let purged = before - self.slots.len();
        if purged > 0 {
            debug!(purged, queue_size = self.slots.len(), "purged stale busy tokens");
        }
    }
}

impl fmt::Debug for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueState")
            .field("slots", &self.slots.len())
            .field("live", &self.len())
            .finish()
    }
}
