#![forbid(unsafe_code)]

//! Read-only view of the busy signals.

use std::fmt;

use busy_stream::prelude::*;

use crate::queue::QueueState;

#[derive(Clone)]
enum Source {
    Constant(bool),
    Live {
        busy: CurrentValueSubject<bool>,
        state: CurrentValueSubject<QueueState>,
    },
}

/// Busy signals without the ability to enqueue.
///
/// Obtained from a coordinator, or built as a constant for tests and for
/// overriding a live indicator in a nested scope.
#[derive(Clone)]
pub struct BusyIndicator {
    source: Source,
}

impl BusyIndicator {
    pub(crate) fn live(
        busy: CurrentValueSubject<bool>,
        state: CurrentValueSubject<QueueState>,
    ) -> Self {
        Self {
            source: Source::Live { busy, state },
        }
    }

    /// An indicator that is always `busy`, for every identifier.
    #[must_use]
    pub const fn constant(busy: bool) -> Self {
        Self {
            source: Source::Constant(busy),
        }
    }

    /// Debounced global busy state. Hot; replays the current value.
    #[must_use]
    pub fn busy(&self) -> AnyPublisher<bool, Never> {
        match &self.source {
            Source::Constant(value) => Just::new(*value).erase(),
            Source::Live { busy, .. } => busy.clone().erase(),
        }
    }

    /// Whether `identifier` has live work. Not debounced; consecutive
    /// duplicates are suppressed.
    #[must_use]
    pub fn busy_for(&self, identifier: impl Into<String>) -> AnyPublisher<bool, Never> {
        match &self.source {
            Source::Constant(value) => Just::new(*value).erase(),
            Source::Live { state, .. } => {
                let identifier = identifier.into();
                state
                    .clone()
                    .map(move |state| state.contains(&identifier))
                    .remove_duplicates()
                    .erase()
            }
        }
    }

    /// Current debounced busy state.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        match &self.source {
            Source::Constant(value) => *value,
            Source::Live { busy, .. } => busy.value(),
        }
    }

    #[must_use]
    pub fn is_constant(&self) -> bool {
        matches!(self.source, Source::Constant(_))
    }
}

impl Default for BusyIndicator {
    fn default() -> Self {
        Self::constant(false)
    }
}

impl fmt::Debug for BusyIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Constant(value) => {
                f.debug_tuple("BusyIndicator::Constant").field(value).finish()
            }
            Source::Live { busy, .. } => f
                .debug_struct("BusyIndicator")
                .field("busy", &busy.value())
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busy_stream::testing::Recorder;

    #[test]
    fn constant_answers_everything() {
        let indicator = BusyIndicator::constant(true);
        let rec = Recorder::<bool, Never>::unlimited();
        indicator.busy().subscribe(rec.clone());
        assert_eq!(rec.values(), vec![true]);
        assert_eq!(rec.completion(), Some(Completion::Finished));

        let per_id = Recorder::<bool, Never>::unlimited();
        indicator.busy_for("anything").subscribe(per_id.clone());
        assert_eq!(per_id.values(), vec![true]);
        assert!(indicator.is_busy());
        assert!(indicator.is_constant());
    }

    #[test]
    fn default_is_never_busy() {
        let indicator = BusyIndicator::default();
        assert!(!indicator.is_busy());
        let rec = Recorder::<bool, Never>::unlimited();
        indicator.busy().subscribe(rec.clone());
        assert_eq!(rec.values(), vec![false]);
    }

    #[test]
    fn live_busy_replays_current_value() {
        let busy = CurrentValueSubject::new(false);
        let state = CurrentValueSubject::new(QueueState::default());
        let indicator = BusyIndicator::live(busy.clone(), state);
        busy.send(true);
        let rec = Recorder::<bool, Never>::unlimited();
        indicator.busy().subscribe(rec.clone());
        assert_eq!(rec.values(), vec![true]);
        assert!(indicator.is_busy());
        assert!(!indicator.is_constant());
    }
}
