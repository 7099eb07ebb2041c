//! Commit and rollback
//!
//! ```text
//! commit:
//!   lock every written address in lock order (contention manager on conflict)
//!   ts = clock.tick()
//!   ts != end + 1 -> validate the read set
//!   status Active -> Committing            (no kill succeeds after this)
//!   write back, release written locks at version ts
//! ```
//!
//! Rollback releases every held lock at the version it had when acquired.

use crate::module::{notify, ModuleEvent};
use crate::transaction::Transaction;
use crate::validation::validate_read_set;
use greenstm_core::{Abort, AbortReason, Timestamp, TxResult, TxStatus};
use greenstm_storage::LockIndex;
use smallvec::SmallVec;
use tracing::{trace, warn};

impl Transaction {
    /// Commit the current transaction
    ///
    /// An inner commit of a nested transaction only decrements the nesting
    /// depth. On conflict or failed validation the attempt is rolled back and
    /// the abort is returned.
    pub fn commit(&mut self) -> TxResult<()> {
        self.ensure_active()?;
        if self.nesting > 1 {
            self.nesting -= 1;
            return Ok(());
        }

        notify(
            &self.modules,
            &mut self.specifics,
            self.slot,
            self.retries,
            None,
            ModuleEvent::Precommit,
        );
        // Hooks may run arbitrary code; a kill can land meanwhile
        self.ensure_active()?;

        if self.direct {
            self.commit_direct();
            return Ok(());
        }

        let held = self.irrevocable.is_held();
        if self.writes.is_empty() {
            if !held
                && !self
                    .shared()
                    .transition(self.seq, TxStatus::Active, TxStatus::Committing)
            {
                return Err(self.rollback(AbortReason::Killed));
            }
            self.release_owned(None);
            self.finish_commit(None);
            return Ok(());
        }

        let mut order: SmallVec<[LockIndex; 16]> = self.writes.iter().map(|e| e.lock).collect();
        order.sort_unstable();
        order.dedup();
        for idx in order {
            self.acquire_commit(idx)?;
        }

        let ts = self.manager.clock().tick();
        if !held
            && ts != self.end + 1
            && !validate_read_set(&self.reads, &self.owned, self.manager.locks(), self.slot)
        {
            return Err(self.rollback(AbortReason::Validate));
        }

        if !held
            && !self
                .shared()
                .transition(self.seq, TxStatus::Active, TxStatus::Committing)
        {
            return Err(self.rollback(AbortReason::Killed));
        }

        let heap = self.manager.heap();
        for entry in self.writes.iter() {
            if entry.mask == 0 {
                continue;
            }
            let current = heap.load(entry.addr).unwrap_or(0);
            heap.store(entry.addr, entry.merged(current));
            self.owned.mark_written(entry.lock);
        }
        self.release_owned(Some(ts));
        self.finish_commit(Some(ts));
        Ok(())
    }

    fn commit_direct(&mut self) {
        let written = self.owned.iter().any(|held| held.written);
        let ts = written.then(|| self.manager.clock().tick());
        self.release_owned(ts);
        self.undo.clear();
        self.finish_commit(ts);
    }

    fn finish_commit(&mut self, ts: Option<Timestamp>) {
        self.status = TxStatus::Committed;
        self.shared().set_status(self.seq, TxStatus::Committed);
        self.release_irrevocability();

        notify(
            &self.modules,
            &mut self.specifics,
            self.slot,
            self.retries,
            None,
            ModuleEvent::Commit,
        );
        trace!(
            slot = %self.slot,
            ts = ?ts,
            reads = self.reads.len(),
            writes = self.writes.len(),
            retries = self.retries,
            "committed"
        );

        self.retries = 0;
        self.nesting = 0;
        self.abort_reason = None;
        self.reads.clear();
        self.writes.clear();

        if let Some(ts) = ts {
            if ts >= self.manager.clock_max() {
                self.manager.rollover(self.slot);
            }
        }
    }

    /// Release held locks
    ///
    /// With `ts`, locks covering written memory get version `ts`; every other
    /// lock goes back to the version it had when acquired.
    pub(crate) fn release_owned(&mut self, ts: Option<Timestamp>) {
        let locks = self.manager.locks();
        for held in self.owned.iter() {
            let version = match ts {
                Some(ts) if held.written => ts,
                _ => held.previous,
            };
            locks.release(held.lock, version);
        }
        self.owned.clear();
    }

    /// Abort the current attempt
    ///
    /// The caller decides whether to [`restart`](Transaction::restart).
    pub fn abort(&mut self, reason: AbortReason) -> Abort {
        if !self.in_attempt() {
            return Abort::new(self.abort_reason.unwrap_or(reason));
        }
        self.rollback(reason)
    }

    /// Undo the current attempt and report why
    pub(crate) fn rollback(&mut self, reason: AbortReason) -> Abort {
        if !self.undo.is_empty() {
            warn!(
                slot = %self.slot,
                words = self.undo.len(),
                %reason,
                "rolling back direct writes"
            );
            let heap = self.manager.heap();
            for (addr, previous) in self.undo.drain(..).rev() {
                heap.store(addr, previous);
            }
        }
        // Written flags only matter with a commit timestamp
        self.release_owned(None);
        self.reads.clear();
        self.writes.clear();

        self.retries += 1;
        self.status = TxStatus::Aborted;
        self.shared().set_status(self.seq, TxStatus::Aborted);
        if self.irrevocable.is_held() {
            self.release_irrevocability();
        }
        if reason == AbortReason::ReadOnlyWrite {
            self.attrs.read_only = false;
        }
        self.abort_reason = Some(reason);
        self.nesting = 0;

        notify(
            &self.modules,
            &mut self.specifics,
            self.slot,
            self.retries,
            Some(reason),
            ModuleEvent::Abort,
        );
        trace!(slot = %self.slot, %reason, retries = self.retries, "rolled back");

        if reason == AbortReason::ClockRollover {
            self.manager.rollover(self.slot);
        }
        Abort::new(reason)
    }
}
