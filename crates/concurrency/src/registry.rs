//! Slot registry
//!
//! Every registered thread owns one slot. The slot publishes the parts of
//! its descriptor that other threads need to see:
//! - the attempt-tagged status word, which contention managers CAS to kill
//! - start timestamp and set sizes, read by contention policies
//!
//! # Status word
//!
//! ```text
//! bits 63..8  attempt sequence number
//! bits  7..0  TxStatus code
//! ```
//!
//! The sequence number changes on every attempt, so a kill aimed at one
//! attempt can never land on the next.

use crate::contention::TxMeta;
use greenstm_core::{Result, SlotId, StmError, Timestamp, TxStatus};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Pack a sequence number and status into a status word
#[inline]
pub fn pack_status(seq: u64, status: TxStatus) -> u64 {
    (seq << 8) | status.code() as u64
}

/// Split a status word into sequence number and status
#[inline]
pub fn unpack_status(word: u64) -> (u64, TxStatus) {
    (word >> 8, TxStatus::from_code((word & 0xFF) as u8))
}

/// Published state of one descriptor
#[derive(Debug, Default)]
pub struct SlotShared {
    in_use: AtomicBool,
    state: AtomicU64,
    start: AtomicU64,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl SlotShared {
    /// Raw status word
    #[inline]
    pub fn status_word(&self) -> u64 {
        self.state.load(Ordering::SeqCst)
    }

    /// Current status
    #[inline]
    pub fn status(&self) -> TxStatus {
        unpack_status(self.status_word()).1
    }

    /// Publish a status; owner only
    #[inline]
    pub fn set_status(&self, seq: u64, status: TxStatus) {
        self.state.store(pack_status(seq, status), Ordering::SeqCst);
    }

    /// Move from `from` to `to` within attempt `seq`
    #[inline]
    pub fn transition(&self, seq: u64, from: TxStatus, to: TxStatus) -> bool {
        self.state
            .compare_exchange(
                pack_status(seq, from),
                pack_status(seq, to),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Mark the attempt observed as `word` killed, if it is still active
    pub fn kill(&self, word: u64) -> bool {
        let (seq, status) = unpack_status(word);
        status == TxStatus::Active && self.transition(seq, TxStatus::Active, TxStatus::Killed)
    }

    /// Publish the start timestamp of a new attempt
    #[inline]
    pub fn publish_start(&self, start: Timestamp) {
        self.start.store(start, Ordering::Relaxed);
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }

    /// Publish read and write set sizes
    #[inline]
    pub fn publish_work(&self, reads: usize, writes: usize) {
        self.reads.store(reads, Ordering::Relaxed);
        self.writes.store(writes, Ordering::Relaxed);
    }

    /// Contention metadata as last published
    pub fn meta(&self, slot: SlotId) -> TxMeta {
        TxMeta {
            slot,
            start: self.start.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    /// True if a thread holds this slot
    pub fn in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }
}

/// Fixed-capacity table of slots
#[derive(Debug)]
pub struct SlotRegistry {
    slots: Box<[SlotShared]>,
}

impl SlotRegistry {
    /// Create a registry with `capacity` free slots
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| SlotShared::default())
            .collect::<Vec<_>>();
        SlotRegistry {
            slots: slots.into_boxed_slice(),
        }
    }

    /// Capacity
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Claim a free slot
    ///
    /// Returns the slot id and the next unused attempt sequence number.
    pub fn register(&self) -> Result<(SlotId, u64)> {
        for (i, slot) in self.slots.iter().enumerate() {
            if slot
                .in_use
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let (seq, _) = unpack_status(slot.status_word());
                let seq = seq + 1;
                slot.set_status(seq, TxStatus::Inactive);
                slot.publish_start(0);
                let id = SlotId::new(i as u32);
                debug!(slot = %id, "thread slot registered");
                return Ok((id, seq));
            }
        }
        warn!(limit = self.slots.len(), "no free thread slot");
        Err(StmError::ResourceExhausted {
            resource: "thread slots",
            limit: self.slots.len(),
        })
    }

    /// Return a slot to the free pool
    pub fn release(&self, slot: SlotId) {
        if let Some(shared) = self.slots.get(slot.index()) {
            let (seq, _) = unpack_status(shared.status_word());
            shared.set_status(seq, TxStatus::Inactive);
            shared.in_use.store(false, Ordering::Release);
            debug!(slot = %slot, "thread slot released");
        }
    }

    /// Published state of `slot`
    ///
    /// Slot ids come from [`SlotRegistry::register`] or from a lock word,
    /// both of which are always in range.
    #[inline]
    pub fn get(&self, slot: SlotId) -> &SlotShared {
        &self.slots[slot.index()]
    }

    /// Iterate over all slots with their ids
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &SlotShared)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| (SlotId::new(i as u32), s))
    }

    /// Number of registered slots
    pub fn registered(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use()).count()
    }

    /// Number of slots with an attempt in flight
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.status().is_in_flight())
            .count()
    }
}
