#![forbid(unsafe_code)]

//! Coordinator configuration.
//!
//! The only tunable is the show delay: how long the queue must stay non-empty
//! before the busy signal turns `true`.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `BUSY_INDICATOR_SHOW_DELAY_MS` | show delay in whole milliseconds | `850` |

use std::env;

use tracing::warn;
use web_time::Duration;

use crate::error::{BusyError, Result};

/// Environment variable holding the show delay in milliseconds.
pub const SHOW_DELAY_ENV: &str = "BUSY_INDICATOR_SHOW_DELAY_MS";

/// Show delay used when nothing else is configured.
pub const DEFAULT_SHOW_DELAY: Duration = Duration::from_millis(850);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyIndicatorConfiguration {
    /// Minimum time the queue must stay non-empty before `true` is published.
    pub show_delay: Duration,
}

impl Default for BusyIndicatorConfiguration {
    fn default() -> Self {
        Self {
            show_delay: DEFAULT_SHOW_DELAY,
        }
    }
}

impl BusyIndicatorConfiguration {
    #[must_use]
    pub const fn with_show_delay(show_delay: Duration) -> Self {
        Self { show_delay }
    }

    #[must_use]
    pub const fn with_show_delay_ms(ms: u64) -> Self {
        Self::with_show_delay(Duration::from_millis(ms))
    }

    /// Read the process environment, falling back to defaults (with a
    /// warning) for values that do not parse.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the process environment, rejecting values that do not parse.
    pub fn try_from_env() -> Result<Self> {
        Self::try_from_lookup(|key| env::var(key).ok())
    }

    /// [`from_env`](Self::from_env) over an arbitrary variable source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        match Self::try_from_lookup(lookup) {
            Ok(config) => config,
            Err(error) => {
                warn!(%error, "ignoring busy indicator configuration");
                Self::default()
            }
        }
    }

    /// [`try_from_env`](Self::try_from_env) over an arbitrary variable source.
    pub fn try_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(SHOW_DELAY_ENV) {
            config.show_delay = parse_show_delay(&raw)?;
        }
        Ok(config)
    }
}

/// Parse a millisecond count, tolerating surrounding whitespace.
pub fn parse_show_delay(raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| BusyError::invalid_show_delay(SHOW_DELAY_ENV, raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(value: Option<&'static str>) -> impl Fn(&str) -> Option<String> {
        move |key| {
            assert_eq!(key, SHOW_DELAY_ENV);
            value.map(str::to_owned)
        }
    }

    #[test]
    fn default_is_850ms() {
        assert_eq!(
            BusyIndicatorConfiguration::default().show_delay,
            Duration::from_millis(850)
        );
    }

    #[test]
    fn missing_variable_keeps_default() {
        let config = BusyIndicatorConfiguration::try_from_lookup(lookup(None)).unwrap();
        assert_eq!(config, BusyIndicatorConfiguration::default());
    }

    #[test]
    fn parses_milliseconds() {
        let config = BusyIndicatorConfiguration::try_from_lookup(lookup(Some(" 120 "))).unwrap();
        assert_eq!(config.show_delay, Duration::from_millis(120));
        let zero = BusyIndicatorConfiguration::try_from_lookup(lookup(Some("0"))).unwrap();
        assert_eq!(zero.show_delay, Duration::ZERO);
    }

    #[test]
    fn rejects_negative_and_garbage() {
        for raw in ["-5", "soon", "1.5", ""] {
            let err = BusyIndicatorConfiguration::try_from_lookup(lookup(Some(raw))).unwrap_err();
            assert!(matches!(err, BusyError::InvalidShowDelay { .. }), "{raw}");
            assert!(err.to_string().contains(SHOW_DELAY_ENV));
        }
    }

    #[test]
    fn lenient_lookup_falls_back() {
        let config = BusyIndicatorConfiguration::from_lookup(lookup(Some("later")));
        assert_eq!(config, BusyIndicatorConfiguration::default());
    }

    #[test]
    fn builder_helpers() {
        assert_eq!(
            BusyIndicatorConfiguration::with_show_delay_ms(42).show_delay,
            Duration::from_millis(42)
        );
    }
}
