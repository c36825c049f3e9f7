//! Error types for measurement sessions.
//!
//! Every failure is local and synchronous: nothing is retried and no
//! partial report is produced on the error path.

use std::error::Error as StdError;

use thiserror::Error;

/// Errors raised by a measurement session or its collaborators.
#[derive(Debug, Error)]
pub enum MemwatchError {
    /// `start()` was called while a sampler was still active.
    ///
    /// This is a caller bug. Use `reset()` before `start()` for restart
    /// semantics.
    #[error("measurement session is already running")]
    AlreadyRunning,

    /// The memory collaborator produced a reading that cannot be real.
    #[error("invalid memory reading {reading}: {reason}")]
    InvalidMemoryReading { reading: i64, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Periodic scheduling was requested outside a tokio runtime.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),

    /// The workload measured by `run()` failed after cleanup completed.
    #[error("workload failed: {0}")]
    Workload(#[source] Box<dyn StdError + Send + Sync>),

    #[error("report serialization failed: {0}")]
    Serialization(String),
}

impl MemwatchError {
    /// Create an invalid memory reading error.
    pub fn invalid_reading(reading: i64, reason: impl Into<String>) -> Self {
        Self::InvalidMemoryReading {
            reading,
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Check if this is the `AlreadyRunning` precondition violation.
    #[must_use]
    pub const fn is_already_running(&self) -> bool {
        matches!(self, Self::AlreadyRunning)
    }

    /// Check if this error came from the memory collaborator.
    #[must_use]
    pub const fn is_invalid_reading(&self) -> bool {
        matches!(self, Self::InvalidMemoryReading { .. })
    }
}

impl From<serde_json::Error> for MemwatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type MemwatchResult<T> = Result<T, MemwatchError>;
