//! Clock abstraction for deterministic time handling.
//!
//! Every limiter operation takes its timestamp from a [`Clock`] rather than
//! reading the system time directly, so tests can drive a [`ManualClock`]
//! forward instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of timestamps, expressed as time elapsed since the clock's epoch.
pub trait Clock: Send + Sync {
    /// Current time since the clock's epoch.
    fn now(&self) -> Duration;
}

/// The system clock, measured since `UNIX_EPOCH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        // A system clock before the epoch is treated as the epoch itself;
        // the limiter clamps backwards time movement anyway.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }
}

/// A manually advanced clock for tests.
///
/// Clones share the same underlying instant, so a test can hold one handle
/// and advance time for a limiter holding another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock starting at the given offset from its epoch.
    pub fn new(start: Duration) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(start.as_nanos() as u64)),
        }
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.nanos
            .fetch_add(delta.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Set the clock to an absolute offset from its epoch.
    pub fn set(&self, now: Duration) {
        self.nanos.store(now.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}
