//! Contention management
//!
//! When a transaction runs into a lock owned by another active transaction,
//! the configured policy decides which of the two gives way. Decisions are
//! pure functions of the published metadata of both parties.
//!
//! Policies that compare metadata (`timestamp`, `karma`) break ties by slot
//! id. For any two distinct transactions exactly one of `decide(a, b)` and
//! `decide(b, a)` is [`Decision::KillOther`], so two conflicting
//! transactions never kill each other and never both yield.

use greenstm_core::{ConflictKind, ContentionPolicy, SlotId, Timestamp};
use std::cmp::Ordering;

/// Metadata a contention policy looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxMeta {
    /// Slot of the transaction, the tie-break order
    pub slot: SlotId,
    /// Start timestamp of the current attempt
    pub start: Timestamp,
    /// Read set size
    pub reads: usize,
    /// Write set size
    pub writes: usize,
}

impl TxMeta {
    /// Accumulated work, `2 * writes + reads`
    pub fn work(&self) -> usize {
        self.writes.saturating_mul(2).saturating_add(self.reads)
    }
}

/// Outcome of a contention decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Abort the deciding transaction
    KillSelf,
    /// Abort the deciding transaction and wait before restarting
    KillSelfDelay,
    /// Abort the other transaction and wait for its lock
    KillOther,
}

impl Decision {
    /// True if the deciding transaction gives way
    pub fn yields(&self) -> bool {
        !matches!(self, Decision::KillOther)
    }

    /// True if the restart should wait for the contended lock
    pub fn delays_restart(&self) -> bool {
        matches!(self, Decision::KillSelfDelay)
    }
}

/// A contention management strategy
pub trait ContentionManager {
    /// Decide who yields when `me` runs into a lock held by `other`
    fn decide(&self, me: &TxMeta, other: &TxMeta, kind: ConflictKind) -> Decision;
}

impl ContentionManager for ContentionPolicy {
    fn decide(&self, me: &TxMeta, other: &TxMeta, _kind: ConflictKind) -> Decision {
        match self {
            ContentionPolicy::Aggressive => Decision::KillOther,
            ContentionPolicy::Suicide => Decision::KillSelf,
            ContentionPolicy::Delay => Decision::KillSelfDelay,
            ContentionPolicy::Timestamp => {
                // Older wins
                match me.start.cmp(&other.start).then(me.slot.cmp(&other.slot)) {
                    Ordering::Less => Decision::KillOther,
                    _ => Decision::KillSelfDelay,
                }
            }
            ContentionPolicy::Karma => {
                // More work wins
                match other.work().cmp(&me.work()).then(me.slot.cmp(&other.slot)) {
                    Ordering::Less => Decision::KillOther,
                    _ => Decision::KillSelf,
                }
            }
        }
    }
}
