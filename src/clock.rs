//! Time source used by the quota gate and the daily reset scheduler.
//!
//! Production code uses [`SystemClock`]; tests inject a [`ManualClock`] so that
//! expiry and midnight arithmetic are deterministic.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync + 'static {
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

#[cfg(test)]
pub use manual::ManualClock;
