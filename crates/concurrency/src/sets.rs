//! Read set, write set and owned-lock tracking for one attempt

use greenstm_core::{apply_mask, Address, Timestamp, Word};
use greenstm_storage::LockIndex;
use rustc_hash::FxHashMap;

/// One validated read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadEntry {
    /// Address read
    pub addr: Address,
    /// Lock guarding it
    pub lock: LockIndex,
    /// Lock version observed at read time
    pub version: Timestamp,
}

/// Append-only log of reads in program order
#[derive(Debug, Default)]
pub struct ReadSet {
    entries: Vec<ReadEntry>,
}

impl ReadSet {
    /// Create with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        ReadSet {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Record a read
    #[inline]
    pub fn push(&mut self, addr: Address, lock: LockIndex, version: Timestamp) {
        self.entries.push(ReadEntry { addr, lock, version });
    }

    /// Entries in read order
    pub fn iter(&self) -> std::slice::Iter<'_, ReadEntry> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was read
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries, keeping capacity
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// One buffered store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteEntry {
    /// Target address
    pub addr: Address,
    /// Buffered bits; only those under `mask` are meaningful
    pub value: Word,
    /// Bits written so far, zero for a lock-only entry
    pub mask: Word,
    /// Lock guarding the address
    pub lock: LockIndex,
}

impl WriteEntry {
    /// Compose the buffered bits over `current`
    #[inline]
    pub fn merged(&self, current: Word) -> Word {
        apply_mask(current, self.value, self.mask)
    }
}

/// Buffered stores, one entry per address
///
/// A second store to an address updates the existing entry in place.
#[derive(Debug, Default)]
pub struct WriteSet {
    entries: Vec<WriteEntry>,
    index: FxHashMap<Address, usize>,
}

impl WriteSet {
    /// Create with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        WriteSet {
            entries: Vec::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Buffered entry for `addr`
    #[inline]
    pub fn get(&self, addr: Address) -> Option<&WriteEntry> {
        self.index.get(&addr).map(|&i| &self.entries[i])
    }

    /// Buffer the bits of `value` selected by `mask`
    ///
    /// Returns true if a new entry was appended.
    pub fn buffer(&mut self, addr: Address, value: Word, mask: Word, lock: LockIndex) -> bool {
        if let Some(&i) = self.index.get(&addr) {
            let entry = &mut self.entries[i];
            entry.value = apply_mask(entry.value, value, mask);
            entry.mask |= mask;
            return false;
        }
        self.index.insert(addr, self.entries.len());
        self.entries.push(WriteEntry {
            addr,
            value: value & mask,
            mask,
            lock,
        });
        true
    }

    /// Entries in first-store order
    pub fn iter(&self) -> std::slice::Iter<'_, WriteEntry> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries, keeping capacity
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

/// A lock held by the current attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnedLock {
    /// Lock index
    pub lock: LockIndex,
    /// Version the lock carried when acquired
    pub previous: Timestamp,
    /// True once memory under the lock has been modified
    pub written: bool,
}

/// Locks held by the current attempt, in acquisition order
#[derive(Debug, Default)]
pub struct OwnedLocks {
    entries: Vec<OwnedLock>,
    index: FxHashMap<LockIndex, usize>,
}

impl OwnedLocks {
    /// Record a freshly acquired lock
    pub fn insert(&mut self, lock: LockIndex, previous: Timestamp) {
        if self.index.contains_key(&lock) {
            return;
        }
        self.index.insert(lock, self.entries.len());
        self.entries.push(OwnedLock {
            lock,
            previous,
            written: false,
        });
    }

    /// Entry for `lock`, if held
    #[inline]
    pub fn get(&self, lock: LockIndex) -> Option<&OwnedLock> {
        self.index.get(&lock).map(|&i| &self.entries[i])
    }

    /// True if `lock` is held
    #[inline]
    pub fn contains(&self, lock: LockIndex) -> bool {
        self.index.contains_key(&lock)
    }

    /// Note that memory under `lock` was modified
    pub fn mark_written(&mut self, lock: LockIndex) {
        if let Some(&i) = self.index.get(&lock) {
            self.entries[i].written = true;
        }
    }

    /// Held locks in acquisition order
    pub fn iter(&self) -> std::slice::Iter<'_, OwnedLock> {
        self.entries.iter()
    }

    /// Number of held locks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no lock is held
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget all locks, keeping capacity
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}
