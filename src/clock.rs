//! # Clock
//!
//! Time source for every component in the pipeline. Nothing else reads
//! ambient time: the scheduler, worker, rate limiter, queue and audit logger
//! all take an `Arc<dyn Clock>`, so tests can pin and advance time with
//! [`FrozenClock`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FrozenClock {
    now: Mutex<DateTime<Utc>>,
}

impl FrozenClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Pin the clock to the current wall-clock time. Wall time is read exactly
    /// once, here.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward. Fractional seconds are kept to the microsecond.
    pub fn advance(&self, seconds: f64) {
        let mut now = self.now.lock();
        *now = add_seconds(*now, seconds);
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }
}

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Convert a (possibly fractional) number of seconds into a chrono duration.
///
/// Negative and non-finite inputs clamp to zero.
pub fn seconds_to_duration(seconds: f64) -> chrono::Duration {
    if !seconds.is_finite() || seconds <= 0.0 {
        return chrono::Duration::zero();
    }
    chrono::Duration::microseconds((seconds * 1_000_000.0).round() as i64)
}

/// `instant` plus `seconds`, saturating at the latest representable instant.
pub fn add_seconds(instant: DateTime<Utc>, seconds: f64) -> DateTime<Utc> {
    instant
        .checked_add_signed(seconds_to_duration(seconds))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
