//! Soft-interrupt clock shared by every reply task of a session.
//!
//! Barge-in does not abort tasks. The intake path stamps the clock when a
//! newer user turn arrives, and each reply task compares that stamp with
//! its own start time at every delta boundary. A short grace window lets a
//! task survive an interrupt that lands just after the task itself began.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Microseconds since the clock's origin.
pub type Timestamp = u64;

#[derive(Debug)]
struct ClockInner {
    origin: Instant,
    outdated_at: AtomicU64,
    grace_us: u64,
}

/// Monotonic outdated-at stamp with a race-tolerance window.
///
/// Cloning is cheap and yields a handle to the same clock.
#[derive(Debug, Clone)]
pub struct CancellationClock {
    inner: Arc<ClockInner>,
}

impl CancellationClock {
    /// Create a clock whose tasks tolerate interrupts arriving within `grace`
    /// of their start.
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        Self {
            inner: Arc::new(ClockInner {
                origin: Instant::now(),
                outdated_at: AtomicU64::new(0),
                grace_us: u64::try_from(grace.as_micros()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Current monotonic time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        u64::try_from(self.inner.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    /// Supersede every task started before now.
    pub fn mark_outdated(&self) -> Timestamp {
        let now = self.now();
        self.mark_outdated_at(now);
        now
    }

    /// Supersede every task started before `at`. The stamp never moves
    /// backwards.
    pub fn mark_outdated_at(&self, at: Timestamp) {
        self.inner.outdated_at.fetch_max(at, Ordering::AcqRel);
    }

    #[must_use]
    pub fn outdated_at(&self) -> Timestamp {
        self.inner.outdated_at.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_micros(self.inner.grace_us)
    }

    /// Whether a task that started at `started_at` has been superseded.
    #[must_use]
    pub fn is_outdated(&self, started_at: Timestamp) -> bool {
        started_at.saturating_add(self.inner.grace_us) < self.outdated_at()
    }
}

impl Default for CancellationClock {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}
