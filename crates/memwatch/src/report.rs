#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Immutable measurement reports
//!
//! A `Report` owns a copy of the samples taken during one measurement
//! cycle. Later activity on the session that produced it cannot change it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bytes_to_megabytes;
use crate::config::ReportConverter;
use crate::error::MemwatchResult;

/// Summary of one completed or in-progress measurement
#[derive(Clone)]
pub struct Report {
    /// Wall-clock time the cycle started
    started_at: DateTime<Utc>,

    /// Wall-clock time the cycle stopped
    stopped_at: DateTime<Utc>,

    /// Monotonic time spent running
    elapsed: Duration,

    /// Resident memory captured by `start()` (bytes)
    memory_before_start: u64,

    /// Resident memory captured by `stop()` (bytes)
    memory_after_stop: u64,

    /// Samples in the order they were taken (bytes)
    samples: Arc<[u64]>,

    /// Overrides `to_json` when present
    converter: Option<ReportConverter>,
}

impl Report {
    /// Create a report from raw measurements
    ///
    /// `samples` is taken as-is; no before/after fallback is applied here.
    #[must_use]
    pub fn new(
        started_at: DateTime<Utc>,
        stopped_at: DateTime<Utc>,
        elapsed: Duration,
        memory_before_start: u64,
        memory_after_stop: u64,
        samples: impl Into<Arc<[u64]>>,
    ) -> Self {
        Self {
            started_at,
            stopped_at,
            elapsed,
            memory_before_start,
            memory_after_stop,
            samples: samples.into(),
            converter: None,
        }
    }

    /// Rebuild a report from its serialized form
    #[must_use]
    pub fn from_record(record: ReportRecord) -> Self {
        Self::new(
            record.started_at,
            record.stopped_at,
            Duration::from_micros(record.elapsed),
            record.memory_before_start_bytes,
            record.memory_after_stop_bytes,
            record.memory_samples_bytes,
        )
    }

    pub(crate) fn with_converter(mut self, converter: Option<ReportConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Get the start timestamp
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get the stop timestamp
    #[must_use]
    pub const fn stopped_at(&self) -> DateTime<Utc> {
        self.stopped_at
    }

    /// Get the elapsed running time
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Get resident memory before start (bytes)
    #[must_use]
    pub const fn memory_before_start(&self) -> u64 {
        self.memory_before_start
    }

    /// Get resident memory after stop (bytes)
    #[must_use]
    pub const fn memory_after_stop(&self) -> u64 {
        self.memory_after_stop
    }

    /// Get the samples (bytes)
    #[must_use]
    pub fn samples(&self) -> &[u64] {
        &self.samples
    }

    /// Get the number of samples
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Largest sample, or 0 without samples
    #[must_use]
    pub fn max(&self) -> u64 {
        self.samples.iter().copied().max().unwrap_or(0)
    }

    /// Smallest sample, or 0 without samples
    #[must_use]
    pub fn min(&self) -> u64 {
        self.samples.iter().copied().min().unwrap_or(0)
    }

    /// Mean of the samples rounded half up, or 0 without samples
    #[must_use]
    pub fn average(&self) -> u64 {
        let count = u128::try_from(self.samples.len()).unwrap_or(u128::MAX);
        let total = self
            .samples
            .iter()
            .fold(0_u128, |acc, &sample| acc.saturating_add(u128::from(sample)));

        total
            .saturating_add(count / 2)
            .checked_div(count)
            .map_or(0, |mean| u64::try_from(mean).unwrap_or(u64::MAX))
    }

    /// Largest sample in megabytes
    #[must_use]
    pub fn max_megabytes(&self) -> f64 {
        bytes_to_megabytes(self.max())
    }

    /// Smallest sample in megabytes
    #[must_use]
    pub fn min_megabytes(&self) -> f64 {
        bytes_to_megabytes(self.min())
    }

    /// Average sample in megabytes
    #[must_use]
    pub fn average_megabytes(&self) -> f64 {
        bytes_to_megabytes(self.average())
    }

    /// Convert to the serializable record
    #[must_use]
    pub fn to_record(&self) -> ReportRecord {
        ReportRecord {
            started_at: self.started_at,
            stopped_at: self.stopped_at,
            elapsed: u64::try_from(self.elapsed.as_micros()).unwrap_or(u64::MAX),
            memory_before_start_bytes: self.memory_before_start,
            memory_after_stop_bytes: self.memory_after_stop,
            memory_samples_bytes: self.samples.to_vec(),
        }
    }

    /// Structured export
    ///
    /// Uses the session's report converter when one was configured, the
    /// default [`ReportRecord`] layout otherwise.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the default layout cannot be encoded.
    pub fn to_json(&self) -> MemwatchResult<serde_json::Value> {
        match &self.converter {
            Some(convert) => Ok(convert(self)),
            None => Ok(serde_json::to_value(self.to_record())?),
        }
    }

    /// Structured export rendered as a JSON string
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if encoding fails.
    pub fn to_json_string(&self) -> MemwatchResult<String> {
        Ok(serde_json::to_string(&self.to_json()?)?)
    }
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("started_at", &self.started_at)
            .field("stopped_at", &self.stopped_at)
            .field("elapsed", &self.elapsed)
            .field("memory_before_start", &self.memory_before_start)
            .field("memory_after_stop", &self.memory_after_stop)
            .field("samples", &self.samples)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Report {
    fn eq(&self, other: &Self) -> bool {
        self.to_record() == other.to_record()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples over {:?}: min {:.2} MB, avg {:.2} MB, max {:.2} MB",
            self.sample_count(),
            self.elapsed,
            self.min_megabytes(),
            self.average_megabytes(),
            self.max_megabytes()
        )
    }
}

impl Serialize for Report {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_record().serialize(serializer)
    }
}

/// Default serialized layout of a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    /// ISO-8601 start timestamp
    pub started_at: DateTime<Utc>,

    /// ISO-8601 stop timestamp
    pub stopped_at: DateTime<Utc>,

    /// Elapsed running time in microseconds
    pub elapsed: u64,

    pub memory_before_start_bytes: u64,

    pub memory_after_stop_bytes: u64,

    pub memory_samples_bytes: Vec<u64>,
}

impl ReportRecord {
    /// Parse a record from JSON
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the text is not a valid record.
    pub fn from_json_str(json: &str) -> MemwatchResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<ReportRecord> for Report {
    fn from(record: ReportRecord) -> Self {
        Self::from_record(record)
    }
}
