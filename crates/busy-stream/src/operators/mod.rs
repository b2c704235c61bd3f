#![forbid(unsafe_code)]

//! Stream operators and the [`PublisherExt`] combinator trait.
//!
//! Every operator is a plain [`Publisher`] value; nothing happens until a
//! subscriber attaches. Operators that only reshape values (`map`,
//! `remove_duplicates`) pass the upstream subscription straight through.
//! Operators that must hold values back or produce their own
//! (`with_latest_from`, `delay_rising_edge`, `combine_latest`) reconcile
//! demand through a [`DemandBuffer`](crate::demand_buffer::DemandBuffer).

mod combine_latest;
mod delay_rising_edge;
mod map;
mod receive_on;
mod remove_duplicates;
mod with_latest_from;

pub use combine_latest::{CombineLatest, combine_latest, combine_latest3};
pub use delay_rising_edge::DelayRisingEdge;
pub use map::Map;
pub use receive_on::ReceiveOn;
pub use remove_duplicates::RemoveDuplicates;
pub use with_latest_from::{Selector, WithLatestFrom};

use web_time::Duration;

use crate::publisher::{AnyCancellable, AnyPublisher, Completion, ForEach, Publisher};
use crate::scheduler::SharedScheduler;

/// Combinators available on every [`Publisher`].
pub trait PublisherExt: Publisher + Sized {
    /// Transform each value.
    fn map<U, F>(self, transform: F) -> Map<Self, F>
    where
        F: Fn(Self::Output) -> U + Send + Sync + 'static,
        U: Send + 'static,
    {
        Map::new(self, transform)
    }

    /// Drop values equal to their predecessor.
    fn remove_duplicates(self) -> RemoveDuplicates<Self>
    where
        Self::Output: Clone + PartialEq,
    {
        RemoveDuplicates::new(self)
    }

    /// Pair each value with the latest value of `other`.
    ///
    /// Values arriving before `other` has produced anything are dropped.
    fn with_latest_from<S, R, F>(self, other: S, selector: F) -> WithLatestFrom<Self, S, R>
    where
        S: Publisher<Failure = Self::Failure>,
        S::Output: Clone,
        R: Send + 'static,
        F: Fn(Self::Output, S::Output) -> R + Send + Sync + 'static,
    {
        WithLatestFrom::new(self, other, selector)
    }

    /// [`with_latest_from`](PublisherExt::with_latest_from) over the latest
    /// values of two publishers.
    fn with_latest_from2<A, B, R, F>(
        self,
        first: A,
        second: B,
        selector: F,
    ) -> WithLatestFrom<Self, CombineLatest<A, B>, R>
    where
        A: Publisher<Failure = Self::Failure>,
        B: Publisher<Failure = Self::Failure>,
        A::Output: Clone,
        B::Output: Clone,
        R: Send + 'static,
        F: Fn(Self::Output, (A::Output, B::Output)) -> R + Send + Sync + 'static,
    {
        WithLatestFrom::new(self, combine_latest(first, second), selector)
    }

    /// [`with_latest_from`](PublisherExt::with_latest_from) over the latest
    /// values of three publishers.
    #[allow(clippy::type_complexity)]
    fn with_latest_from3<A, B, C, R, F>(
        self,
        first: A,
        second: B,
        third: C,
        selector: F,
    ) -> WithLatestFrom<Self, AnyPublisher<(A::Output, B::Output, C::Output), Self::Failure>, R>
    where
        A: Publisher<Failure = Self::Failure>,
        B: Publisher<Failure = Self::Failure>,
        C: Publisher<Failure = Self::Failure>,
        A::Output: Clone,
        B::Output: Clone,
        C::Output: Clone,
        R: Send + 'static,
        F: Fn(Self::Output, (A::Output, B::Output, C::Output)) -> R + Send + Sync + 'static,
    {
        WithLatestFrom::new(self, combine_latest3(first, second, third), selector)
    }

    /// Emit the latest value of `other` whenever `self` emits.
    fn latest_from<S>(self, other: S) -> WithLatestFrom<Self, S, S::Output>
    where
        S: Publisher<Failure = Self::Failure>,
        S::Output: Clone,
    {
        WithLatestFrom::new(self, other, |_, latest| latest)
    }

    /// Emit the latest pair from two publishers whenever `self` emits.
    fn latest_from2<A, B>(
        self,
        first: A,
        second: B,
    ) -> WithLatestFrom<Self, CombineLatest<A, B>, (A::Output, B::Output)>
    where
        A: Publisher<Failure = Self::Failure>,
        B: Publisher<Failure = Self::Failure>,
        A::Output: Clone,
        B::Output: Clone,
    {
        WithLatestFrom::new(self, combine_latest(first, second), |_, latest| latest)
    }

    /// Emit the latest triple from three publishers whenever `self` emits.
    #[allow(clippy::type_complexity)]
    fn latest_from3<A, B, C>(
        self,
        first: A,
        second: B,
        third: C,
    ) -> WithLatestFrom<
        Self,
        AnyPublisher<(A::Output, B::Output, C::Output), Self::Failure>,
        (A::Output, B::Output, C::Output),
    >
    where
        A: Publisher<Failure = Self::Failure>,
        B: Publisher<Failure = Self::Failure>,
        C: Publisher<Failure = Self::Failure>,
        A::Output: Clone,
        B::Output: Clone,
        C::Output: Clone,
    {
        WithLatestFrom::new(self, combine_latest3(first, second, third), |_, latest| latest)
    }

    /// Deliver values and completion on `scheduler`.
    fn receive_on(self, scheduler: SharedScheduler) -> ReceiveOn<Self> {
        ReceiveOn::new(self, scheduler)
    }

    /// Hold back `true` until it has persisted for `delay`; pass `false`
    /// immediately, cancelling a pending `true`.
    fn delay_rising_edge(self, delay: Duration, scheduler: SharedScheduler) -> DelayRisingEdge<Self>
    where
        Self: Publisher<Output = bool>,
    {
        DelayRisingEdge::new(self, delay, scheduler)
    }

    /// Subscribe with unlimited demand, calling `on_value` per value.
    ///
    /// The subscription lives as long as the returned guard.
    #[must_use = "dropping the guard cancels the subscription"]
    fn for_each(&self, on_value: impl Fn(Self::Output) + Send + Sync + 'static) -> AnyCancellable {
        ForEach::attach(self, on_value, None)
    }

    /// [`for_each`](PublisherExt::for_each) that also observes completion.
    #[must_use = "dropping the guard cancels the subscription"]
    fn for_each_with_completion(
        &self,
        on_value: impl Fn(Self::Output) + Send + Sync + 'static,
        on_completion: impl Fn(Completion<Self::Failure>) + Send + Sync + 'static,
    ) -> AnyCancellable {
        ForEach::attach(self, on_value, Some(Box::new(on_completion)))
    }

    /// Erase the concrete operator type.
    fn erase(self) -> AnyPublisher<Self::Output, Self::Failure> {
        AnyPublisher::new(self)
    }
}

impl<P: Publisher> PublisherExt for P {}
