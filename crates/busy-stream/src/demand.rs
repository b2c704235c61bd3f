#![forbid(unsafe_code)]

//! Pull-based flow control quantities.
//!
//! A [`Demand`] is how many more values a subscriber is willing to receive.
//! It is either a finite count or [`Demand::Unlimited`], which absorbs all
//! arithmetic: anything added to unlimited stays unlimited, and unlimited
//! minus a finite amount is still unlimited.
//!
//! [`DemandState`] is the three-counter ledger a
//! [`DemandBuffer`](crate::demand_buffer::DemandBuffer) keeps for its
//! downstream.
//!
//! # Invariants
//!
//! 1. Finite arithmetic saturates; it never wraps and never goes negative.
//! 2. `Max(_) < Unlimited` for every finite value.
//! 3. `DemandState::processed <= requested` and `sent <= requested`.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// How many values a subscriber may still receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Demand {
    /// A bounded number of values.
    Max(u64),
    /// No bound at all.
    Unlimited,
}

impl Demand {
    /// Zero demand.
    pub const NONE: Self = Self::Max(0);

    /// A bounded demand of `n` values.
    #[inline]
    #[must_use]
    pub const fn max(n: u64) -> Self {
        Self::Max(n)
    }

    /// Whether no value may be delivered.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::Max(0))
    }

    /// Whether at least one value may be delivered.
    #[inline]
    #[must_use]
    pub const fn is_some(self) -> bool {
        !self.is_none()
    }

    #[inline]
    #[must_use]
    pub const fn is_unlimited(self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// The finite count, or `None` when unlimited.
    #[inline]
    #[must_use]
    pub const fn as_finite(self) -> Option<u64> {
        match self {
            Self::Max(n) => Some(n),
            Self::Unlimited => None,
        }
    }

    /// Saturating addition. Overflowing a finite count yields `Unlimited`.
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Max(a), Self::Max(b)) => match a.checked_add(b) {
                Some(total) => Self::Max(total),
                None => Self::Unlimited,
            },
            _ => Self::Unlimited,
        }
    }

    /// Saturating subtraction.
    ///
    /// `Unlimited - Max(_)` is `Unlimited`; anything minus `Unlimited` is
    /// `NONE` (an unlimited request that was already forwarded owes nothing).
    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Max(a), Self::Max(b)) => Self::Max(a.saturating_sub(b)),
            (Self::Unlimited, Self::Max(_)) => Self::Unlimited,
            (_, Self::Unlimited) => Self::NONE,
        }
    }
}

impl Default for Demand {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<u64> for Demand {
    fn from(n: u64) -> Self {
        Self::Max(n)
    }
}

impl fmt::Display for Demand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max(n) => write!(f, "max({n})"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

impl Add for Demand {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl Add<u64> for Demand {
    type Output = Self;

    fn add(self, rhs: u64) -> Self {
        self.saturating_add(Self::Max(rhs))
    }
}

impl AddAssign for Demand {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.saturating_add(rhs);
    }
}

impl AddAssign<u64> for Demand {
    fn add_assign(&mut self, rhs: u64) {
        *self = self.saturating_add(Self::Max(rhs));
    }
}

impl Sub for Demand {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }
}

impl SubAssign for Demand {
    fn sub_assign(&mut self, rhs: Self) {
        *self = self.saturating_sub(rhs);
    }
}

impl PartialEq<u64> for Demand {
    fn eq(&self, other: &u64) -> bool {
        *self == Self::Max(*other)
    }
}

impl PartialOrd<u64> for Demand {
    fn partial_cmp(&self, other: &u64) -> Option<std::cmp::Ordering> {
        self.partial_cmp(&Self::Max(*other))
    }
}

/// Accumulated demand bookkeeping for one downstream subscriber.
///
/// Only ever mutated under the owning buffer's lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemandState {
    /// Total demand the downstream has asked for.
    pub requested: Demand,
    /// Values actually handed to the downstream.
    pub processed: Demand,
    /// Demand already forwarded to the upstream.
    pub sent: Demand,
}

impl DemandState {
    /// Whether another buffered value may be delivered now.
    #[inline]
    #[must_use]
    pub fn can_deliver(&self) -> bool {
        self.processed < self.requested
    }

    /// Demand still owed to the upstream; marks it as sent.
    pub fn take_unsent(&mut self) -> Demand {
        let owed = self.requested - self.sent;
        self.sent += owed;
        owed
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
