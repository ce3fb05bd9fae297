//! Time source for window checks
//!
//! Every window in the mechanism is a plain comparison against `Clock::now`.
//! Clocks never go backwards.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Timestamp;

/// A monotonically non-decreasing source of Unix timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp().max(0) as Timestamp
    }
}

/// Manually driven clock for simulations and tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self { now: AtomicU64::new(start) }
    }

    /// Move time forward by `seconds`
    pub fn advance(&self, seconds: u64) -> Timestamp {
        self.now.fetch_add(seconds, Ordering::SeqCst) + seconds
    }

    /// Jump to `timestamp`; earlier values are ignored
    pub fn set(&self, timestamp: Timestamp) -> Timestamp {
        self.now.fetch_max(timestamp, Ordering::SeqCst).max(timestamp)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
