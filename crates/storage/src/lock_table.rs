//! Versioned lock table
//!
//! Each lock guards every address hashing to it and holds either the version
//! of the last commit that wrote through it, or the slot of the transaction
//! currently owning it.
//!
//! # Encoding
//!
//! A lock is one `AtomicU64`. The low bit is the owned flag:
//!
//! ```text
//! Free { version }  ->  version << 1
//! Owned { owner }   ->  (owner << 1) | 1
//! ```
//!
//! Every transition between the two states is a single compare-and-swap, so
//! no observer can see an owned lock carrying a stale version.

use greenstm_core::{Address, SlotId, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};

/// Largest version a free lock can carry
pub const MAX_VERSION: Timestamp = u64::MAX >> 1;

/// Decoded state of one versioned lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockState {
    /// Not owned; carries the timestamp of the last writer
    Free {
        /// Commit timestamp of the last writer
        version: Timestamp,
    },
    /// Owned by the transaction running in `owner`
    Owned {
        /// Slot of the owning descriptor
        owner: SlotId,
    },
}

impl LockState {
    /// Pack into the lock word
    #[inline]
    pub fn encode(self) -> u64 {
        match self {
            LockState::Free { version } => version << 1,
            LockState::Owned { owner } => ((owner.as_u32() as u64) << 1) | 1,
        }
    }

    /// Unpack a lock word
    #[inline]
    pub fn decode(word: u64) -> Self {
        if word & 1 == 1 {
            LockState::Owned {
                owner: SlotId::new((word >> 1) as u32),
            }
        } else {
            LockState::Free { version: word >> 1 }
        }
    }

    /// Version, if free
    #[inline]
    pub fn version(&self) -> Option<Timestamp> {
        match self {
            LockState::Free { version } => Some(*version),
            LockState::Owned { .. } => None,
        }
    }

    /// Owner, if owned
    #[inline]
    pub fn owner(&self) -> Option<SlotId> {
        match self {
            LockState::Owned { owner } => Some(*owner),
            LockState::Free { .. } => None,
        }
    }

    /// True if owned by anyone
    #[inline]
    pub fn is_owned(&self) -> bool {
        matches!(self, LockState::Owned { .. })
    }
}

/// Index of a lock in the table
pub type LockIndex = usize;

/// Fixed-size array of versioned locks
#[derive(Debug)]
pub struct LockTable {
    locks: Box<[AtomicU64]>,
    mask: usize,
    shift: u32,
}

impl LockTable {
    /// Create a table of `1 << log_size` free locks at version zero
    ///
    /// `shift` low address bits are dropped before hashing, so
    /// `1 << shift` consecutive words share one lock.
    pub fn new(log_size: u32, shift: u32) -> Self {
        let len = 1usize << log_size;
        let locks = (0..len).map(|_| AtomicU64::new(0)).collect::<Vec<_>>();
        LockTable {
            locks: locks.into_boxed_slice(),
            mask: len - 1,
            shift,
        }
    }

    /// Number of locks
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Always false; a table has at least two locks
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Lock guarding `addr`
    #[inline]
    pub fn index_of(&self, addr: Address) -> LockIndex {
        (addr.index() >> self.shift) & self.mask
    }

    /// Atomic snapshot of a lock
    #[inline]
    pub fn snapshot(&self, idx: LockIndex) -> LockState {
        LockState::decode(self.locks[idx].load(Ordering::Acquire))
    }

    /// Compare-and-swap a lock from `current` to `new`
    ///
    /// Returns the observed state on failure.
    #[inline]
    pub fn compare_exchange(
        &self,
        idx: LockIndex,
        current: LockState,
        new: LockState,
    ) -> Result<(), LockState> {
        self.locks[idx]
            .compare_exchange(
                current.encode(),
                new.encode(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(LockState::decode)
    }

    /// Try to take a free lock at `version` for `owner`
    #[inline]
    pub fn acquire(&self, idx: LockIndex, version: Timestamp, owner: SlotId) -> bool {
        self.compare_exchange(idx, LockState::Free { version }, LockState::Owned { owner })
            .is_ok()
    }

    /// Make a lock free again at `version`
    ///
    /// The store is a release so that written values are visible before the
    /// lock is observed free.
    #[inline]
    pub fn release(&self, idx: LockIndex, version: Timestamp) {
        self.locks[idx].store(LockState::Free { version }.encode(), Ordering::Release);
    }

    /// Set every lock free at version zero
    ///
    /// Only valid while no transaction is in flight.
    pub fn reset(&self) {
        for lock in self.locks.iter() {
            lock.store(0, Ordering::Release);
        }
    }
}
