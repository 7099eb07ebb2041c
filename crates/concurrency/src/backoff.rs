//! Spin waiting and restart backoff

use greenstm_storage::{LockIndex, LockTable};
use rand::Rng;
use std::time::{Duration, Instant};

const SPINS_BEFORE_YIELD: u32 = 6;

/// Spin-then-yield helper for busy-wait loops
///
/// The first few calls issue a growing number of CPU pause hints, later
/// calls yield the thread.
#[derive(Debug, Default)]
pub struct SpinWait {
    count: u32,
}

impl SpinWait {
    /// Create a fresh spinner
    pub const fn new() -> Self {
        SpinWait { count: 0 }
    }

    /// Wait a little
    #[inline]
    pub fn spin(&mut self) {
        if self.count < SPINS_BEFORE_YIELD {
            for _ in 0..(1u32 << self.count) {
                std::hint::spin_loop();
            }
            self.count += 1;
        } else {
            std::thread::yield_now();
        }
    }
}

/// Upper bound of the randomized restart delay after `retries` aborts
///
/// `min(min_us << retries, max_us)`, saturating on overflow.
pub fn backoff_cap_us(retries: u64, min_us: u64, max_us: u64) -> u64 {
    let shift = retries.min(63) as u32;
    let scaled = min_us.checked_shl(shift).filter(|v| v >> shift == min_us);
    scaled.unwrap_or(u64::MAX).min(max_us)
}

/// Random delay in `[0, backoff_cap_us(..)]`
pub fn restart_delay(retries: u64, min_us: u64, max_us: u64) -> Duration {
    let cap = backoff_cap_us(retries, min_us, max_us);
    if cap == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(rand::thread_rng().gen_range(0..=cap))
}

/// Wait until the lock at `idx` is free, giving up after `limit`
///
/// Returns true if the lock was observed free.
pub fn wait_for_free(locks: &LockTable, idx: LockIndex, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    let mut spin = SpinWait::new();
    loop {
        if !locks.snapshot(idx).is_owned() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        spin.spin();
    }
}
