#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Measurement lifecycle controller
//!
//! A `MeasurementSession` owns the clock, the periodic sampler and the
//! before/after snapshots. It can be started and stopped many times; each
//! `start()` begins a fresh cycle.
//!
//! # Sampler cycles
//!
//! Every `start()` opens a numbered cycle in the shared sampler state and
//! the tick closure remembers the cycle it belongs to. `stop()` closes the
//! cycle under the same lock the tick appends under, so once `stop()`
//! returns no tick can add a sample, even one already in flight on another
//! worker thread.

use std::error::Error as StdError;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tracing::{debug, error, trace, warn};

use crate::clock::{ClockState, Stopwatch};
use crate::config::SessionConfig;
use crate::error::{MemwatchError, MemwatchResult};
use crate::memory::{self, MemorySource, SystemMemory};
use crate::report::Report;
use crate::scheduler::{PeriodicHandle, PeriodicScheduler, TickFn, TokioScheduler};

/// State shared between the session and its tick closure.
#[derive(Debug, Default)]
struct SamplerState {
    /// Cycle currently accepting samples
    cycle: Option<u64>,
    /// Last cycle number handed out
    last_cycle: u64,
    samples: Vec<u64>,
    /// First invalid reading seen by a tick in the open cycle
    fault: Option<MemwatchError>,
}

type SharedSampler = Arc<Mutex<SamplerState>>;

fn lock(sampler: &Mutex<SamplerState>) -> MutexGuard<'_, SamplerState> {
    sampler.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Measures elapsed time and samples resident memory of a unit of work.
///
/// Methods take `&mut self`: one caller drives one session.
///
/// # Examples
///
/// ```no_run
/// # use memwatch::{MeasurementSession, SessionConfig};
/// # async fn demo() -> memwatch::MemwatchResult<()> {
/// let mut session = MeasurementSession::new(SessionConfig::default());
///
/// let report = session
///     .run(async {
///         let buffer = vec![0_u8; 8 * 1024 * 1024];
///         tokio::time::sleep(std::time::Duration::from_millis(50)).await;
///         drop(buffer);
///         Ok::<_, std::io::Error>(())
///     })
///     .await?;
///
/// println!("{report}");
/// # Ok(())
/// # }
/// ```
pub struct MeasurementSession {
    config: SessionConfig,
    memory: Arc<dyn MemorySource>,
    scheduler: Arc<dyn PeriodicScheduler>,

    clock: Stopwatch,
    sampler: SharedSampler,
    /// Present iff the clock is running
    sampler_handle: Option<Box<dyn PeriodicHandle>>,

    memory_before_start: u64,
    memory_after_stop: u64,
    started_at: DateTime<Utc>,
    stopped_at: DateTime<Utc>,
}

impl MeasurementSession {
    /// Create a session reading this process's memory on the tokio runtime
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(SystemMemory::new()),
            Arc::new(TokioScheduler),
        )
    }

    /// Create a session with injected memory source and scheduler
    #[must_use]
    pub fn with_collaborators(
        config: SessionConfig,
        memory: Arc<dyn MemorySource>,
        scheduler: Arc<dyn PeriodicScheduler>,
    ) -> Self {
        let now = Utc::now();
        Self {
            config,
            memory,
            scheduler,
            clock: Stopwatch::new(),
            sampler: Arc::new(Mutex::new(SamplerState::default())),
            sampler_handle: None,
            memory_before_start: 0,
            memory_after_stop: 0,
            started_at: now,
            stopped_at: now,
        }
    }

    /// Get the session configuration
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get the sampling period
    #[must_use]
    pub const fn sampling_period(&self) -> Duration {
        self.config.sampling_period()
    }

    /// Get the clock state
    #[must_use]
    pub const fn state(&self) -> ClockState {
        self.clock.state()
    }

    /// Check if a measurement cycle is in progress
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.sampler_handle.is_some()
    }

    /// Begin a new measurement cycle
    ///
    /// Resets the session, stamps the start time, starts the clock,
    /// captures the memory before start and schedules periodic sampling.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if a cycle is in progress; the running cycle is
    ///   left untouched.
    /// - `InvalidMemoryReading` if the initial reading is invalid.
    /// - Any scheduler error.
    ///
    /// On error (other than `AlreadyRunning`) the session is left idle.
    pub fn start(&mut self) -> MemwatchResult<()> {
        if self.is_running() {
            return Err(MemwatchError::AlreadyRunning);
        }

        self.reset();

        self.started_at = Utc::now();
        self.clock.start();
        self.memory_before_start = match memory::read_validated(self.memory.as_ref()) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.clock.reset();
                return Err(err);
            }
        };

        let cycle = {
            let mut state = lock(&self.sampler);
            state.last_cycle = state.last_cycle.wrapping_add(1);
            state.cycle = Some(state.last_cycle);
            state.last_cycle
        };

        let tick = sampling_tick(
            Arc::downgrade(&self.sampler),
            Arc::clone(&self.memory),
            cycle,
        );

        match self.scheduler.schedule_periodic(self.sampling_period(), tick) {
            Ok(handle) => {
                self.sampler_handle = Some(handle);
                debug!(
                    cycle,
                    period = ?self.sampling_period(),
                    memory_before_start = self.memory_before_start,
                    "Measurement started"
                );
                Ok(())
            }
            Err(err) => {
                self.reset();
                Err(err)
            }
        }
    }

    /// End the current measurement cycle
    ///
    /// Cancels sampling, stops the clock, captures the memory after stop
    /// and stamps the stop time. Safe to call when nothing is running; the
    /// final snapshot is still taken.
    ///
    /// # Errors
    ///
    /// Returns the `InvalidMemoryReading` recorded by a sampling tick
    /// during this cycle, or the one raised by the final reading. Cleanup
    /// has completed either way.
    pub fn stop(&mut self) -> MemwatchResult<()> {
        let was_running = self.sampler_handle.is_some();
        if let Some(mut handle) = self.sampler_handle.take() {
            handle.cancel();
        }

        let (fault, sample_count) = {
            let mut state = lock(&self.sampler);
            state.cycle = None;
            (state.fault.take(), state.samples.len())
        };

        self.clock.stop();
        let after = memory::read_validated(self.memory.as_ref());
        self.stopped_at = Utc::now();

        if was_running {
            debug!(
                samples = sample_count,
                elapsed = ?self.clock.elapsed(),
                "Measurement stopped"
            );
        }

        if let Ok(bytes) = &after {
            self.memory_after_stop = *bytes;
        }

        fault.map_or(after.map(|_| ()), Err)
    }

    /// Stop and return to a clean idle state
    ///
    /// Clears samples and snapshots, zeroes the clock and re-stamps both
    /// timestamps. Any pending fault is logged and discarded.
    pub fn reset(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "Discarding measurement fault on reset");
        }

        {
            let mut state = lock(&self.sampler);
            state.samples.clear();
            state.fault = None;
        }

        self.memory_before_start = 0;
        self.memory_after_stop = 0;
        self.clock.reset();

        let now = Utc::now();
        self.started_at = now;
        self.stopped_at = now;
        trace!("Measurement session reset");
    }

    /// Release the sampler and clear collected data
    pub fn dispose(&mut self) {
        self.reset();
    }

    /// Snapshot the current state into an immutable report
    ///
    /// Never fails. If no periodic sample was taken but a snapshot is
    /// non-zero, the report's samples are `[before, after]`. While a cycle
    /// is running, `stopped_at` still holds the previous stop time.
    #[must_use]
    pub fn get_report(&self) -> Report {
        let before = self.memory_before_start;
        let after = self.memory_after_stop;

        let samples: Arc<[u64]> = {
            let state = lock(&self.sampler);
            if state.samples.is_empty() && (before != 0 || after != 0) {
                Arc::from([before, after])
            } else {
                Arc::from(state.samples.as_slice())
            }
        };

        Report::new(
            self.started_at,
            self.stopped_at,
            self.clock.elapsed(),
            before,
            after,
            samples,
        )
        .with_converter(self.config.report_converter().cloned())
    }

    /// Measure `workload` and return its output alongside the report
    ///
    /// `stop()` runs on every exit path, including a panicking workload,
    /// whose panic resumes after cleanup.
    ///
    /// # Errors
    ///
    /// - Any error from `start()`.
    /// - `Workload` if the workload failed.
    /// - A sampling fault reported by `stop()`.
    pub async fn measure<Fut, T, E>(&mut self, workload: Fut) -> MemwatchResult<(T, Report)>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        self.start()?;

        let outcome = AssertUnwindSafe(workload).catch_unwind().await;
        let stopped = self.stop();

        match outcome {
            Err(panic) => std::panic::resume_unwind(panic),
            Ok(Err(err)) => {
                if let Err(fault) = stopped {
                    warn!(error = %fault, "Sampling fault superseded by workload failure");
                }
                Err(MemwatchError::Workload(err.into()))
            }
            Ok(Ok(output)) => {
                stopped?;
                Ok((output, self.get_report()))
            }
        }
    }

    /// Measure `workload` and return the report
    ///
    /// # Errors
    ///
    /// Same as [`MeasurementSession::measure`].
    pub async fn run<Fut, T, E>(&mut self, workload: Fut) -> MemwatchResult<Report>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        self.measure(workload).await.map(|(_, report)| report)
    }
}

impl Default for MeasurementSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl std::fmt::Debug for MeasurementSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasurementSession")
            .field("config", &self.config)
            .field("state", &self.clock.state())
            .field("memory_before_start", &self.memory_before_start)
            .field("memory_after_stop", &self.memory_after_stop)
            .field("started_at", &self.started_at)
            .field("stopped_at", &self.stopped_at)
            .finish_non_exhaustive()
    }
}

/// Build the per-tick closure for one cycle.
///
/// The reading happens outside the lock; the cycle check and append
/// happen under it.
fn sampling_tick(
    sampler: Weak<Mutex<SamplerState>>,
    memory: Arc<dyn MemorySource>,
    cycle: u64,
) -> TickFn {
    Box::new(move || {
        let Some(sampler) = sampler.upgrade() else {
            return;
        };

        let reading = memory::read_validated(memory.as_ref());

        let mut state = lock(&sampler);
        if state.cycle != Some(cycle) || state.fault.is_some() {
            return;
        }

        match reading {
            Ok(bytes) => {
                state.samples.push(bytes);
                trace!(cycle, bytes, "Memory sample recorded");
            }
            Err(err) => {
                error!(cycle, error = %err, "Sampling halted by invalid memory reading");
                state.fault = Some(err);
            }
        }
    })
}
