//! Memwatch - wall-clock and resident memory measurement for a unit of work
//!
//! A [`MeasurementSession`] times a workload and samples the process's
//! resident memory at a fixed period while it runs, then hands out an
//! immutable [`Report`] with min/max/average statistics.
//!
//! # Lifecycle
//!
//! ```text
//!   idle --start()--> running --stop()--> stopped
//!    ^                   |                   |
//!    +------reset()------+-------reset()-----+
//! ```
//!
//! - `start()` while running fails with `AlreadyRunning`.
//! - `stop()` is safe in any state and always takes a final snapshot.
//! - `get_report()` never fails and never shares state with the session.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use memwatch::{ManualScheduler, MeasurementSession, SessionConfig};
//!
//! # fn main() -> memwatch::MemwatchResult<()> {
//! let scheduler = ManualScheduler::new();
//! let mut session = MeasurementSession::with_collaborators(
//!     SessionConfig::default(),
//!     Arc::new(|| 2_000_000_i64),
//!     Arc::new(scheduler.clone()),
//! );
//!
//! session.start()?;
//! scheduler.tick_n(3);
//! session.stop()?;
//!
//! let report = session.get_report();
//! assert_eq!(report.sample_count(), 3);
//! assert_eq!(memwatch::bytes_to_megabytes(report.max()), 2.0);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod clock;
mod config;
mod error;
mod memory;
mod report;
mod scheduler;
mod session;

pub use clock::{ClockState, Stopwatch};
pub use config::{
    DEFAULT_SAMPLING_PERIOD, MAX_SAMPLING_PERIOD, ReportConverter, SAMPLING_PERIOD_ENV,
    SessionConfig,
};
pub use error::{MemwatchError, MemwatchResult};
pub use memory::{MemorySource, SystemMemory, validate_reading};
pub use report::{Report, ReportRecord};
pub use scheduler::{ManualScheduler, PeriodicHandle, PeriodicScheduler, TickFn, TokioScheduler};
pub use session::MeasurementSession;

/// Bytes per decimal megabyte
pub const BYTES_PER_MEGABYTE: f64 = 1_000_000.0;

/// Convert bytes to decimal megabytes (10^6, not MiB)
#[must_use]
#[allow(clippy::cast_precision_loss)] // Acceptable precision loss for display purposes
pub fn bytes_to_megabytes(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MEGABYTE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_megabytes_is_decimal() {
        assert!((bytes_to_megabytes(2_000_000) - 2.0).abs() < f64::EPSILON);
        assert!((bytes_to_megabytes(1_048_576) - 1.048_576).abs() < f64::EPSILON);
        assert!(bytes_to_megabytes(0).abs() < f64::EPSILON);
    }
}
