#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Session configuration
//!
//! A `SessionConfig` is validated on construction and read-only afterwards.
//! Values come from defaults, optionally overridden by the environment.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{MemwatchError, MemwatchResult};
use crate::report::Report;

/// Default interval between periodic memory reads
pub const DEFAULT_SAMPLING_PERIOD: Duration = Duration::from_millis(10);

/// Longest sampling period accepted (safety limit)
pub const MAX_SAMPLING_PERIOD: Duration = Duration::from_secs(3600);

/// Environment variable overriding the sampling period, in milliseconds
pub const SAMPLING_PERIOD_ENV: &str = "MEMWATCH_SAMPLING_PERIOD_MS";

/// Strategy that fully replaces the default structured export of a report.
pub type ReportConverter = Arc<dyn Fn(&Report) -> serde_json::Value + Send + Sync>;

/// Configuration for a measurement session
#[derive(Clone)]
pub struct SessionConfig {
    /// Interval between periodic memory samples
    sampling_period: Duration,

    /// Optional override for `Report::to_json`
    report_converter: Option<ReportConverter>,
}

impl SessionConfig {
    /// Create a configuration with the given sampling period
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the period is zero or longer than
    /// [`MAX_SAMPLING_PERIOD`].
    ///
    /// # Examples
    ///
    /// ```
    /// # use memwatch::SessionConfig;
    /// # use std::time::Duration;
    /// let config = SessionConfig::new(Duration::from_millis(25));
    /// assert!(config.is_ok());
    ///
    /// let config = SessionConfig::new(Duration::ZERO);
    /// assert!(config.is_err());
    /// ```
    pub fn new(sampling_period: Duration) -> MemwatchResult<Self> {
        Self::validate_sampling_period(sampling_period)?;

        Ok(Self {
            sampling_period,
            report_converter: None,
        })
    }

    /// Load the configuration from the environment
    ///
    /// Reads [`SAMPLING_PERIOD_ENV`]; unset means the default period.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the variable is set but not a valid
    /// period in milliseconds.
    pub fn from_env() -> MemwatchResult<Self> {
        Self::from_env_value(std::env::var(SAMPLING_PERIOD_ENV).ok().as_deref())
    }

    fn from_env_value(value: Option<&str>) -> MemwatchResult<Self> {
        value.map_or_else(
            || Ok(Self::default()),
            |raw| {
                raw.trim()
                    .parse::<u64>()
                    .map_err(|e| {
                        MemwatchError::invalid_config(format!(
                            "{SAMPLING_PERIOD_ENV}='{raw}' is not a number of milliseconds: {e}"
                        ))
                    })
                    .and_then(|ms| Self::new(Duration::from_millis(ms)))
            },
        )
    }

    /// Replace the sampling period
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` under the same rules as [`SessionConfig::new`].
    pub fn with_sampling_period(mut self, sampling_period: Duration) -> MemwatchResult<Self> {
        Self::validate_sampling_period(sampling_period)?;
        self.sampling_period = sampling_period;
        Ok(self)
    }

    /// Install a converter that overrides the default JSON export
    #[must_use]
    pub fn with_report_converter<F>(mut self, converter: F) -> Self
    where
        F: Fn(&Report) -> serde_json::Value + Send + Sync + 'static,
    {
        self.report_converter = Some(Arc::new(converter));
        self
    }

    /// Get the sampling period
    #[must_use]
    pub const fn sampling_period(&self) -> Duration {
        self.sampling_period
    }

    /// Get the report converter, if one was installed
    #[must_use]
    pub fn report_converter(&self) -> Option<&ReportConverter> {
        self.report_converter.as_ref()
    }

    fn validate_sampling_period(period: Duration) -> MemwatchResult<()> {
        if period.is_zero() {
            Err(MemwatchError::invalid_config(
                "sampling period must be greater than 0",
            ))
        } else if period > MAX_SAMPLING_PERIOD {
            Err(MemwatchError::invalid_config(format!(
                "sampling period {period:?} exceeds maximum {MAX_SAMPLING_PERIOD:?}"
            )))
        } else {
            Ok(())
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sampling_period: DEFAULT_SAMPLING_PERIOD,
            report_converter: None,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("sampling_period", &self.sampling_period)
            .field("report_converter", &self.report_converter.is_some())
            .finish()
    }
}
