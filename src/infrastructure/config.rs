//! Environment-driven settings and the timeout helper.

use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[cfg(feature = "async")]
use std::future::Future;

/// Environment variable holding the default timeout in seconds.
pub const TIMEOUT_ENV: &str = "ASYNC_TIMEOUT";

/// Timeout used when `ASYNC_TIMEOUT` is unset or invalid.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error returned when settings validation fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// The default timeout must be greater than zero
    #[error("default timeout must be greater than 0")]
    ZeroTimeout,
}

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Timeout applied by [`async_timeout`] when none is given
    pub default_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Settings {
    /// Create settings with the given default timeout.
    ///
    /// # Errors
    /// Returns `SettingsError::ZeroTimeout` if `default_timeout` is zero.
    pub fn new(default_timeout: Duration) -> Result<Self, SettingsError> {
        if default_timeout.is_zero() {
            return Err(SettingsError::ZeroTimeout);
        }
        Ok(Self { default_timeout })
    }

    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, falling back to defaults with a
    /// warning for values that do not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let Some(raw) = lookup(TIMEOUT_ENV) else {
            return Self::default();
        };

        match parse_seconds(&raw) {
            Some(timeout) => Self {
                default_timeout: timeout,
            },
            None => {
                warn!(
                    variable = TIMEOUT_ENV,
                    value = %raw,
                    default = ?DEFAULT_TIMEOUT,
                    "ignoring invalid timeout"
                );
                Self::default()
            }
        }
    }
}

fn parse_seconds(raw: &str) -> Option<Duration> {
    let seconds: f64 = raw.trim().parse().ok()?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}

/// Error returned when a computation exceeds its timeout.
#[cfg(feature = "async")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("computation did not complete within {0:?}")]
pub struct TimeoutError(pub Duration);

/// Drive `future` to completion or fail after `timeout`.
///
/// Without an explicit timeout, `ASYNC_TIMEOUT` (default 10 seconds) applies.
/// Must run inside a tokio runtime with the time driver enabled.
///
/// # Errors
/// Returns `TimeoutError` if the future did not complete in time; the future
/// is dropped, which runs the teardown of any patched computation inside it.
#[cfg(feature = "async")]
pub async fn async_timeout<F>(
    future: F,
    timeout: Option<Duration>,
) -> Result<F::Output, TimeoutError>
where
    F: Future,
{
    let limit = timeout.unwrap_or_else(|| Settings::from_env().default_timeout);
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| TimeoutError(limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(value: &'static str) -> impl Fn(&str) -> Option<String> {
        move |key| (key == TIMEOUT_ENV).then(|| value.to_string())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Settings::from_lookup(|_| None), Settings::default());
        assert_eq!(Settings::default().default_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_parses_fractional_seconds() {
        let settings = Settings::from_lookup(lookup(" 0.5 "));
        assert_eq!(settings.default_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        for raw in ["abc", "0", "-3", "inf", "NaN"] {
            assert_eq!(Settings::from_lookup(lookup(raw)), Settings::default(), "{raw}");
        }
    }

    #[test]
    fn test_new_rejects_zero() {
        let err = Settings::new(Duration::ZERO).unwrap_err();
        assert_eq!(err, SettingsError::ZeroTimeout);
        assert_eq!(err.to_string(), "default timeout must be greater than 0");
        assert!(Settings::new(Duration::from_secs(1)).is_ok());
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_async_timeout() {
        let done = async_timeout(async { 7 }, Some(Duration::from_secs(1))).await;
        assert_eq!(done, Ok(7));

        let limit = Duration::from_millis(10);
        let stuck = async_timeout(std::future::pending::<()>(), Some(limit)).await;
        assert_eq!(stuck, Err(TimeoutError(limit)));
        assert_eq!(
            TimeoutError(limit).to_string(),
            "computation did not complete within 10ms"
        );
    }
}
