//! Periodic scheduling capability.
//!
//! Sessions never reach for a global timer. They are handed a
//! `PeriodicScheduler`, which is either backed by tokio or by the
//! `ManualScheduler` double that fires only when told to.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::trace;

use crate::error::{MemwatchError, MemwatchResult};

/// Callback invoked on every tick. Must not block.
pub type TickFn = Box<dyn FnMut() + Send + 'static>;

/// Handle to an active periodic registration.
///
/// Dropping the handle cancels the registration.
pub trait PeriodicHandle: Send {
    /// Stop firing. Idempotent.
    fn cancel(&mut self);

    /// Check if the registration can still fire.
    fn is_active(&self) -> bool;
}

/// Schedules a callback to run every `period`.
pub trait PeriodicScheduler: Send + Sync {
    /// Register `tick` to fire once per `period`, first firing one period
    /// from now.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler cannot accept the registration.
    fn schedule_periodic(
        &self,
        period: Duration,
        tick: TickFn,
    ) -> MemwatchResult<Box<dyn PeriodicHandle>>;
}

// =============================================================================
// Tokio
// =============================================================================

/// Scheduler backed by a tokio task per registration.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl PeriodicScheduler for TokioScheduler {
    fn schedule_periodic(
        &self,
        period: Duration,
        mut tick: TickFn,
    ) -> MemwatchResult<Box<dyn PeriodicHandle>> {
        if period.is_zero() {
            return Err(MemwatchError::invalid_config("periodic task needs a non-zero period"));
        }
        let runtime = Handle::try_current().map_err(|e| MemwatchError::NoRuntime(e.to_string()))?;

        let task = runtime.spawn(async move {
            let now = Instant::now();
            let first = now.checked_add(period).unwrap_or(now);
            let mut ticker = interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                tick();
            }
        });

        trace!(?period, "Periodic task spawned");
        Ok(Box::new(TokioHandle { task: Some(task) }))
    }
}

struct TokioHandle {
    task: Option<JoinHandle<()>>,
}

impl PeriodicHandle for TokioHandle {
    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for TokioHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

// =============================================================================
// Manual
// =============================================================================

#[derive(Default)]
struct ManualRegistry {
    next_id: u64,
    entries: Vec<ManualEntry>,
}

struct ManualEntry {
    id: u64,
    period: Duration,
    tick: TickFn,
}

/// Deterministic scheduler that fires synchronously on `tick()`.
///
/// Clones share the same registrations, so a test can keep one clone and
/// hand another to the session under test.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    registry: Arc<Mutex<ManualRegistry>>,
}

impl ManualScheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire every active registration once, in registration order.
    pub fn tick(&self) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        for entry in &mut registry.entries {
            (entry.tick)();
        }
    }

    /// Fire every active registration `n` times.
    pub fn tick_n(&self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Number of registrations that have not been cancelled.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Period of the most recent active registration.
    #[must_use]
    pub fn last_period(&self) -> Option<Duration> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .last()
            .map(|entry| entry.period)
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("active", &self.active_count())
            .finish()
    }
}

impl PeriodicScheduler for ManualScheduler {
    fn schedule_periodic(
        &self,
        period: Duration,
        tick: TickFn,
    ) -> MemwatchResult<Box<dyn PeriodicHandle>> {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id = id.saturating_add(1);
        registry.entries.push(ManualEntry { id, period, tick });

        Ok(Box::new(ManualHandle {
            id,
            registry: Arc::downgrade(&self.registry),
        }))
    }
}

struct ManualHandle {
    id: u64,
    registry: Weak<Mutex<ManualRegistry>>,
}

impl PeriodicHandle for ManualHandle {
    fn cancel(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.entries.retain(|entry| entry.id != self.id);
        }
        self.registry = Weak::new();
    }

    fn is_active(&self) -> bool {
        self.registry.upgrade().is_some_and(|registry| {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entries
                .iter()
                .any(|entry| entry.id == self.id)
        })
    }
}

impl Drop for ManualHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting_tick(counter: &Arc<AtomicUsize>) -> TickFn {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_manual_fires_only_on_tick() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = scheduler
            .schedule_periodic(Duration::from_millis(10), counting_tick(&counter))
            .unwrap();
        assert!(handle.is_active());
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        scheduler.tick_n(3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.last_period(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_manual_cancel_stops_firing() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let mut handle = scheduler
            .schedule_periodic(Duration::from_millis(10), counting_tick(&counter))
            .unwrap();
        scheduler.tick();
        handle.cancel();
        handle.cancel();
        scheduler.tick();

        assert!(!handle.is_active());
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_manual_drop_cancels() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        {
            let _handle = scheduler
                .schedule_periodic(Duration::from_millis(10), counting_tick(&counter))
                .unwrap();
            assert_eq!(scheduler.active_count(), 1);
        }

        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test]
    async fn test_tokio_rejects_zero_period() {
        let result = TokioScheduler.schedule_periodic(Duration::ZERO, Box::new(|| {}));
        assert!(matches!(result, Err(MemwatchError::InvalidConfig(_))));
    }

    #[test]
    fn test_tokio_requires_runtime() {
        let result = TokioScheduler.schedule_periodic(Duration::from_millis(10), Box::new(|| {}));
        assert!(matches!(result, Err(MemwatchError::NoRuntime(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_fires_every_period() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handle = TokioScheduler
            .schedule_periodic(Duration::from_millis(10), counting_tick(&counter))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        handle.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(!handle.is_active());
    }
}
