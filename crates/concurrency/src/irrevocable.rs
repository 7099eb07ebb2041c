//! Irrevocability gate
//!
//! At most one transaction in the process runs irrevocably. The gate is a
//! single word claimed by compare-and-swap.

use crate::backoff::SpinWait;
use greenstm_core::SlotId;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Irrevocable mode of a descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IrrevocableMode {
    /// Optimistic execution
    #[default]
    Off,
    /// Irrevocability is acquired at the start of the next attempt
    Pending {
        /// Run with direct memory access under quiescence
        serial: bool,
    },
    /// The current attempt is irrevocable
    Held {
        /// Running with direct memory access under quiescence
        serial: bool,
    },
}

impl IrrevocableMode {
    /// Degree of irrevocability, 0 when optimistic
    ///
    /// 1 and 2 are pending requests (plain, serial), 3 and 4 the held modes.
    pub fn level(&self) -> u8 {
        match self {
            IrrevocableMode::Off => 0,
            IrrevocableMode::Pending { serial: false } => 1,
            IrrevocableMode::Pending { serial: true } => 2,
            IrrevocableMode::Held { serial: false } => 3,
            IrrevocableMode::Held { serial: true } => 4,
        }
    }

    /// True while the current attempt holds irrevocability
    pub fn is_held(&self) -> bool {
        matches!(self, IrrevocableMode::Held { .. })
    }
}

/// Process-wide exclusive flag
#[derive(Debug, Default)]
pub struct IrrevocableGate {
    // 0 when free, otherwise holder slot + 1
    flag: AtomicU64,
}

impl IrrevocableGate {
    /// Create a free gate
    pub fn new() -> Self {
        Self::default()
    }

    fn tag(slot: SlotId) -> u64 {
        slot.as_u32() as u64 + 1
    }

    /// Claim the flag without waiting
    pub fn try_acquire(&self, slot: SlotId) -> bool {
        let tag = Self::tag(slot);
        match self
            .flag
            .compare_exchange(0, tag, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => {
                debug!(slot = %slot, "irrevocability acquired");
                true
            }
            Err(current) => current == tag,
        }
    }

    /// Claim the flag, waiting for the current holder
    ///
    /// Only called between attempts, so the holder never waits on the caller.
    pub fn acquire(&self, slot: SlotId) {
        let mut spin = SpinWait::new();
        while !self.try_acquire(slot) {
            spin.spin();
        }
    }

    /// Release the flag if `slot` holds it
    pub fn release(&self, slot: SlotId) {
        if self
            .flag
            .compare_exchange(Self::tag(slot), 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!(slot = %slot, "irrevocability released");
        }
    }

    /// Current holder
    pub fn holder(&self) -> Option<SlotId> {
        match self.flag.load(Ordering::SeqCst) {
            0 => None,
            tag => Some(SlotId::new((tag - 1) as u32)),
        }
    }
}
