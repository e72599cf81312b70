//! Cooperative yield, wallclock, and sleep primitives used by long-running parent actions.
//!
//! A naive blocking wait inside `_wait_for_dependents` would starve the worker pool: while a
//! parent action sleeps waiting on its children, nothing else could run on its worker. Instead
//! `reschedule` yields the current `tokio` task back to the runtime, which keeps the worker free
//! to drive other actions (including the very children being waited on) while this one is
//! suspended. In tests, real sleeping is disabled so suites run fast and deterministically.
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use time::OffsetDateTime;

/// A source of the current time, abstracted so tests can substitute a fake one.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wraps [`OffsetDateTime::now_utc`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock tests can advance explicitly, instead of waiting on real time to pass.
#[derive(Clone)]
pub struct FakeClock(Arc<Mutex<OffsetDateTime>>);

impl FakeClock {
    pub fn new(start: OffsetDateTime) -> Self {
        FakeClock(Arc::new(Mutex::new(start)))
    }

    /// Move the fake clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.0.lock().expect("fake clock poisoned");
        *now += delta;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> OffsetDateTime {
        *self.0.lock().expect("fake clock poisoned")
    }
}

/// Cooperative scheduling primitives: `reschedule`, `sleep`, and `wallclock`.
#[derive(Clone)]
pub struct Scheduler {
    clock: Arc<dyn Clock>,
    /// When false (the default in tests), `reschedule`/`sleep` yield without actually
    /// sleeping, so waits complete immediately.
    real_sleep: bool,
}

impl Scheduler {
    /// Build a scheduler backed by the real wallclock, with real sleeping enabled.
    pub fn new() -> Self {
        Scheduler {
            clock: Arc::new(SystemClock),
            real_sleep: true,
        }
    }

    /// Build a scheduler for tests: a [`FakeClock`] the caller controls, with real sleeping
    /// disabled so waits resolve as soon as the awaited condition is true.
    pub fn fixture(clock: FakeClock) -> Self {
        Scheduler {
            clock: Arc::new(clock),
            real_sleep: false,
        }
    }

    /// Current time, via whichever [`Clock`] this scheduler was built with.
    pub fn wallclock(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Cooperative yield: suspend the calling parent action for at least `delay` while letting
    /// other actions use this worker. Semantically "sleep without holding a worker thread
    /// hostage".
    pub async fn reschedule(&self, delay: Duration) {
        if self.real_sleep {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }
    }

    /// Uncoordinated wait, used inside provisioning polling loops.
    pub async fn sleep(&self, delay: Duration) {
        if self.real_sleep {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::OffsetDateTime;

    use super::FakeClock;
    use super::Scheduler;

    #[tokio::test]
    async fn fake_clock_does_not_really_sleep() {
        let clock = FakeClock::new(OffsetDateTime::now_utc());
        let scheduler = Scheduler::fixture(clock.clone());
        let before = std::time::Instant::now();
        scheduler.reschedule(Duration::from_secs(30)).await;
        assert!(before.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn fake_clock_advances_explicitly() {
        let start = OffsetDateTime::now_utc();
        let clock = FakeClock::new(start);
        let scheduler = Scheduler::fixture(clock.clone());
        assert_eq!(scheduler.wallclock(), start);
        clock.advance(Duration::from_secs(10));
        assert_eq!(scheduler.wallclock(), start + Duration::from_secs(10));
    }
}
