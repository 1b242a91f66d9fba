//! Time source abstraction.
//!
//! Breakers, claims and backoff all compare against "now"; injecting the
//! clock lets tests move time forward without sleeping.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of the current UTC time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    base: DateTime<Utc>,
    offset_ms: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            base: start,
            offset_ms: AtomicI64::new(0),
        }
    }

    /// Create a clock frozen at the current wall time.
    #[must_use]
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let ms = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.offset_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Move the clock forward by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_now()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::milliseconds(self.offset_ms.load(Ordering::SeqCst))
    }
}
