#![forbid(unsafe_code)]

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BusyError>;

#[derive(Debug, Error)]
pub enum BusyError {
    #[error("invalid show delay {value:?} in {variable}: expected whole milliseconds >= 0")]
    InvalidShowDelay {
        variable: &'static str,
        value: String,
    },

    #[error("failed to spawn serial queue thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl BusyError {
    #[must_use]
    pub fn invalid_show_delay(variable: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidShowDelay {
            variable,
            value: value.into(),
        }
    }
}
