//! Wall-clock and monotonic time sources.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

lazy_static::lazy_static! {
    static ref MONOTONIC_START: Instant = Instant::now();
}

/// Time source used for timeout arithmetic and scheduling.
///
/// Passed as an explicit service value rather than reached through
/// ambient globals, so tests can substitute their own.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Monotonic nanoseconds since an arbitrary process-local epoch.
    fn monotonic_nanos(&self) -> u64;

    /// Blocking delay on the calling context only.
    fn sleep(&self, duration: Duration);
}

/// The process clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        // Touch the lazy static to anchor the monotonic epoch early.
        let _ = *MONOTONIC_START;
        SystemClock
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic_nanos(&self) -> u64 {
        MONOTONIC_START.elapsed().as_nanos() as u64
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
