//! Core types for the transactional memory engine
//!
//! This module defines the fundamental types used throughout the system:
//! - [`Word`] / [`Address`]: the unit of transactional memory and its location
//! - [`SlotId`]: stable identity of a registered thread's transaction descriptor
//! - [`TxAttributes`]: per-transaction hints supplied at start
//! - [`TxStatus`]: the transaction state machine
//! - [`ConflictKind`]: what kind of access ran into another transaction

use serde::{Deserialize, Serialize};

/// A machine word of transactional memory
pub type Word = u64;

/// A global clock value / lock version
pub type Timestamp = u64;

/// Mask selecting every bit of a word
pub const FULL_MASK: Word = !0;

/// Location of a word in the engine-owned heap
///
/// Addresses are word indices, not byte offsets. They are only meaningful
/// for the engine whose heap produced them.
///
/// # Examples
///
/// ```
/// use greenstm_core::types::Address;
///
/// let a = Address::new(7);
/// assert_eq!(a.index(), 7);
/// assert_eq!(a.offset(3), Address::new(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(usize);

impl Address {
    /// Create an address from a word index
    pub const fn new(index: usize) -> Self {
        Address(index)
    }

    /// Word index of this address
    pub const fn index(&self) -> usize {
        self.0
    }

    /// Address `words` words after this one
    pub const fn offset(&self, words: usize) -> Self {
        Address(self.0 + words)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Identity of a registered transaction descriptor
///
/// Slot ids are dense indices into the engine's slot registry. Their natural
/// ordering is the total order used to break contention-manager ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId(u32);

impl SlotId {
    /// Create a slot id from a registry index
    pub const fn new(index: u32) -> Self {
        SlotId(index)
    }

    /// Registry index of this slot
    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    /// Raw value
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// Attributes supplied when a transaction starts
///
/// All flags default to `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxAttributes {
    /// Hint that the transaction performs no stores
    ///
    /// Read-only transactions keep no read set and never extend their
    /// snapshot. A store inside one aborts and the retry clears the hint.
    pub read_only: bool,
    /// Loads acquire the guarding lock at encounter time
    pub visible_reads: bool,
    /// Do not restart the transaction after an abort
    pub no_retry: bool,
    /// Never extend the snapshot forward on a stale read
    pub no_extend: bool,
}

impl TxAttributes {
    /// Default attributes
    pub fn new() -> Self {
        Self::default()
    }

    /// Attributes with the read-only hint set
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Set the read-only hint
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the visible reads flag
    pub fn with_visible_reads(mut self, visible_reads: bool) -> Self {
        self.visible_reads = visible_reads;
        self
    }

    /// Set the no-retry flag
    pub fn with_no_retry(mut self, no_retry: bool) -> Self {
        self.no_retry = no_retry;
        self
    }

    /// Set the no-extend flag
    pub fn with_no_extend(mut self, no_extend: bool) -> Self {
        self.no_extend = no_extend;
        self
    }
}

/// Status of a transaction descriptor
///
/// State transitions:
/// - `Inactive` → `Active` (start)
/// - `Active` → `Committing` → `Committed` (commit)
/// - `Active` → `Killed` (another transaction's contention manager decision)
/// - `Active` | `Killed` → `Aborted` (rollback)
/// - `Active` → `Irrevocable` (irrevocability acquired)
/// - `Committed` | `Aborted` → `Active` (next attempt) or `Inactive` (thread exit)
///
/// `Committing` and `Irrevocable` cannot be killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxStatus {
    /// No transaction has started on this descriptor
    Inactive = 0,
    /// Executing optimistically
    Active = 1,
    /// Locks held, read set validated, writing back
    Committing = 2,
    /// Last attempt committed
    Committed = 3,
    /// Last attempt rolled back
    Aborted = 4,
    /// Marked for abort by another transaction, not yet rolled back
    Killed = 5,
    /// Running in irrevocable mode
    Irrevocable = 6,
}

impl TxStatus {
    /// Decode a status code
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => TxStatus::Active,
            2 => TxStatus::Committing,
            3 => TxStatus::Committed,
            4 => TxStatus::Aborted,
            5 => TxStatus::Killed,
            6 => TxStatus::Irrevocable,
            _ => TxStatus::Inactive,
        }
    }

    /// Status code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// True while an attempt is executing and may touch shared state
    ///
    /// The quiescence barrier waits for every other descriptor to leave
    /// these states.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            TxStatus::Active | TxStatus::Committing | TxStatus::Killed | TxStatus::Irrevocable
        )
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TxStatus::Inactive => "inactive",
            TxStatus::Active => "active",
            TxStatus::Committing => "committing",
            TxStatus::Committed => "committed",
            TxStatus::Aborted => "aborted",
            TxStatus::Killed => "killed",
            TxStatus::Irrevocable => "irrevocable",
        };
        f.write_str(name)
    }
}

/// Kind of access that ran into a lock owned by another transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictKind {
    /// A load found the guarding lock owned
    ReadWrite,
    /// A lock acquisition (commit-time or visible) found it owned
    WriteWrite,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::ReadWrite => f.write_str("read-write"),
            ConflictKind::WriteWrite => f.write_str("write-write"),
        }
    }
}

/// Merge `value` into `current` under `mask`
///
/// Bits set in `mask` come from `value`, the rest from `current`.
#[inline]
pub fn apply_mask(current: Word, value: Word, mask: Word) -> Word {
    (current & !mask) | (value & mask)
}
