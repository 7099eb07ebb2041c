//! Global commit clock
//!
//! Transactions snapshot the clock at start and every writing commit takes a
//! fresh value with [`GlobalClock::tick`]. The clock only moves backwards in
//! [`GlobalClock::reset`], which callers must run under quiescence.

use greenstm_core::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter shared by all transactions of one engine
#[derive(Debug, Default)]
pub struct GlobalClock {
    value: AtomicU64,
}

impl GlobalClock {
    /// Create a clock starting at zero
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a clock starting at `value`
    pub fn starting_at(value: Timestamp) -> Self {
        GlobalClock {
            value: AtomicU64::new(value),
        }
    }

    /// Current value without incrementing
    #[inline]
    pub fn now(&self) -> Timestamp {
        self.value.load(Ordering::Acquire)
    }

    /// Atomically increment and return the new value
    #[inline]
    pub fn tick(&self) -> Timestamp {
        self.value.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Set the clock back to zero
    ///
    /// Only valid while no transaction is in flight.
    pub fn reset(&self) {
        self.value.store(0, Ordering::Release);
    }
}
