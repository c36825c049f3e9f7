//! Resident memory readings
//!
//! The platform query is an external collaborator. It is modelled as a
//! trait so sessions can be driven by scripted readings in tests.

use std::sync::{Mutex, PoisonError};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::error::{MemwatchError, MemwatchResult};

/// Source of the current process's resident memory, in bytes.
///
/// Implementations must be cheap and must not block: they are called on
/// every sampling tick.
pub trait MemorySource: Send + Sync {
    /// Read the current resident memory in bytes.
    ///
    /// The value is signed so that broken platform bindings reporting a
    /// negative size can be detected instead of wrapping.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMemoryReading` if the platform cannot produce a reading.
    fn current_memory_bytes(&self) -> MemwatchResult<i64>;
}

impl<F> MemorySource for F
where
    F: Fn() -> i64 + Send + Sync,
{
    fn current_memory_bytes(&self) -> MemwatchResult<i64> {
        Ok(self())
    }
}

/// Check a raw reading and convert it to an unsigned byte count.
///
/// # Errors
///
/// Returns `InvalidMemoryReading` for negative values.
pub fn validate_reading(reading: i64) -> MemwatchResult<u64> {
    u64::try_from(reading)
        .map_err(|_| MemwatchError::invalid_reading(reading, "resident memory cannot be negative"))
}

/// Take one reading from `source` and validate it.
pub(crate) fn read_validated(source: &dyn MemorySource) -> MemwatchResult<u64> {
    source.current_memory_bytes().and_then(validate_reading)
}

/// Resident set size of the current process, read through `sysinfo`.
pub struct SystemMemory {
    pid: Pid,
    system: Mutex<System>,
}

impl SystemMemory {
    /// Create a reader for the current process.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pid: Pid::from_u32(std::process::id()),
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SystemMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemMemory")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl MemorySource for SystemMemory {
    fn current_memory_bytes(&self) -> MemwatchResult<i64> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);

        // Only the current pid, and only its memory counters.
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            false,
            ProcessRefreshKind::nothing().with_memory(),
        );

        let bytes = system
            .process(self.pid)
            .map(sysinfo::Process::memory)
            .ok_or_else(|| {
                MemwatchError::invalid_reading(0, format!("process {} not visible", self.pid))
            })?;

        i64::try_from(bytes).map_err(|_| {
            MemwatchError::invalid_reading(i64::MAX, format!("{bytes} bytes overflows i64"))
        })
    }
}
