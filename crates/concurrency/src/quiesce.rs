//! Quiescence barrier
//!
//! A single compare-and-swap gate. The holder waits until no other slot has
//! an attempt in flight, and new attempts cannot become in flight while the
//! gate is held.
//!
//! Entering and quiescing follow a store-then-load handshake on `SeqCst`
//! atomics: an entrant publishes its in-flight status and then checks the
//! gate, a quiescer closes the gate and then scans statuses. At least one of
//! the two always sees the other.

use crate::backoff::SpinWait;
use crate::registry::{SlotRegistry, SlotShared};
use greenstm_core::{SlotId, TxStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Result of a quiescence request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quiesced {
    /// The gate was acquired; the caller must release it
    Acquired,
    /// The caller already held the gate
    AlreadyHeld,
    /// Another holder has the gate and the caller is in flight
    Busy,
}

impl Quiesced {
    /// True if the caller now has exclusive access
    pub fn is_exclusive(&self) -> bool {
        !matches!(self, Quiesced::Busy)
    }
}

/// Gate used for clock rollover and serial irrevocability
#[derive(Debug, Default)]
pub struct QuiescenceBarrier {
    // 0 when open, otherwise holder slot + 1
    gate: AtomicU64,
}

impl QuiescenceBarrier {
    /// Create an open barrier
    pub fn new() -> Self {
        Self::default()
    }

    fn tag(slot: SlotId) -> u64 {
        slot.as_u32() as u64 + 1
    }

    /// Current holder, if any
    pub fn holder(&self) -> Option<SlotId> {
        match self.gate.load(Ordering::SeqCst) {
            0 => None,
            tag => Some(SlotId::new((tag - 1) as u32)),
        }
    }

    /// True if a slot other than `slot` holds the gate
    #[inline]
    pub fn held_by_other(&self, slot: SlotId) -> bool {
        let tag = self.gate.load(Ordering::SeqCst);
        tag != 0 && tag != Self::tag(slot)
    }

    /// Close the gate and wait for every other slot to leave flight
    ///
    /// Re-entrant for the current holder. A requester with its own attempt
    /// in flight cannot wait for another holder, since that holder would wait
    /// for it in turn; it gets [`Quiesced::Busy`] and must roll back.
    pub fn quiesce(&self, requester: SlotId, in_flight: bool, registry: &SlotRegistry) -> Quiesced {
        let tag = Self::tag(requester);
        let mut spin = SpinWait::new();
        loop {
            match self
                .gate
                .compare_exchange(0, tag, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                Err(current) if current == tag => return Quiesced::AlreadyHeld,
                Err(_) if in_flight => return Quiesced::Busy,
                Err(_) => spin.spin(),
            }
        }

        debug!(slot = %requester, "quiescence gate closed");
        for (slot, shared) in registry.iter() {
            if slot == requester {
                continue;
            }
            let mut spin = SpinWait::new();
            while shared.status().is_in_flight() {
                spin.spin();
            }
        }
        Quiesced::Acquired
    }

    /// Open the gate if `holder` holds it
    pub fn release(&self, holder: SlotId) {
        if self
            .gate
            .compare_exchange(Self::tag(holder), 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!(slot = %holder, "quiescence gate opened");
        }
    }

    /// Publish `status` for attempt `seq`, waiting while another slot holds the gate
    ///
    /// While waiting, the slot shows `idle` so the holder does not wait on it.
    pub fn enter(&self, slot: SlotId, shared: &SlotShared, seq: u64, status: TxStatus, idle: TxStatus) {
        loop {
            shared.set_status(seq, status);
            if !self.held_by_other(slot) {
                return;
            }
            shared.set_status(seq, idle);
            let mut spin = SpinWait::new();
            while self.held_by_other(slot) {
                spin.spin();
            }
        }
    }
}
