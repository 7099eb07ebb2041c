//! Read set validation
//!
//! A read stays valid while its lock still carries the version observed at
//! read time. Locks owned by the validating transaction are checked against
//! the version they carried when it acquired them.

use crate::sets::{OwnedLocks, ReadEntry, ReadSet};
use greenstm_core::SlotId;
use greenstm_storage::{LockState, LockTable};

/// First read set entry that no longer holds, if any
pub fn find_stale_read(
    reads: &ReadSet,
    owned: &OwnedLocks,
    locks: &LockTable,
    me: SlotId,
) -> Option<ReadEntry> {
    reads
        .iter()
        .find(|entry| !read_holds(entry, owned, locks, me))
        .copied()
}

/// Check every read set entry
pub fn validate_read_set(reads: &ReadSet, owned: &OwnedLocks, locks: &LockTable, me: SlotId) -> bool {
    find_stale_read(reads, owned, locks, me).is_none()
}

#[inline]
fn read_holds(entry: &ReadEntry, owned: &OwnedLocks, locks: &LockTable, me: SlotId) -> bool {
    match locks.snapshot(entry.lock) {
        LockState::Free { version } => version == entry.version,
        LockState::Owned { owner } if owner == me => owned
            .get(entry.lock)
            .map_or(false, |held| held.previous == entry.version),
        LockState::Owned { .. } => false,
    }
}
