//! Monotonic elapsed-time counter.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Lifecycle state of a [`Stopwatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockState {
    /// Never started since construction or the last reset.
    Idle,
    /// Counting.
    Running,
    /// Stopped; elapsed time is frozen.
    Stopped,
}

impl ClockState {
    /// Check if the clock is counting.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Elapsed-time counter with idle/running/stopped states.
///
/// Built on `tokio::time::Instant`, so paused test runtimes control it.
#[derive(Debug, Clone)]
pub struct Stopwatch {
    state: ClockState,
    started: Option<Instant>,
    frozen: Duration,
}

impl Stopwatch {
    /// Create an idle stopwatch reading zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ClockState::Idle,
            started: None,
            frozen: Duration::ZERO,
        }
    }

    /// Begin counting from zero. No-op while already running.
    pub fn start(&mut self) {
        if self.state.is_running() {
            return;
        }
        self.state = ClockState::Running;
        self.started = Some(Instant::now());
        self.frozen = Duration::ZERO;
    }

    /// Freeze the elapsed time. A stopwatch that never ran stays idle.
    pub fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.frozen = started.elapsed();
            self.state = ClockState::Stopped;
        }
    }

    /// Back to idle at zero.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ClockState {
        self.state
    }

    /// Elapsed time; live while running, frozen otherwise.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.map_or(self.frozen, |started| started.elapsed())
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}
