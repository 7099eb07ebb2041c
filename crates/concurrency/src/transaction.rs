//! Transaction descriptor
//!
//! One [`Transaction`] per registered thread, reused across attempts. It
//! tracks the snapshot window `[start, end]`, the read set, the buffered
//! write set and the locks held by the current attempt.
//!
//! ## Loads
//!
//! ```text
//! 1. own buffered write covering every bit -> return it
//! 2. snapshot lock, read word, re-snapshot lock; retry until both agree
//! 3. lock owned by another transaction -> contention manager
//! 4. version newer than `end` -> extend the snapshot or abort (Validate)
//! 5. record (address, lock, version) in the read set
//! ```
//!
//! Stores only buffer; shared memory and locks are untouched until commit.
//!
//! Every operation that can fail returns [`TxResult`]. An `Err(Abort)` means
//! the attempt has already been rolled back; propagate it with `?`.

use crate::backoff::{self, SpinWait};
use crate::contention::{ContentionManager, Decision, TxMeta};
use crate::irrevocable::IrrevocableMode;
use crate::manager::TransactionManager;
use crate::module::{notify, ModuleEvent, SpecificKey, SpecificSlots, SpecificValue, StmModule};
use crate::quiesce::Quiesced;
use crate::registry::{unpack_status, SlotShared};
use crate::sets::{OwnedLocks, ReadSet, WriteSet};
use crate::validation::validate_read_set;
use greenstm_core::{
    apply_mask, Abort, AbortReason, Address, ConflictKind, Result, SlotId, StmError, Timestamp,
    TxAttributes, TxResult, TxStatus, Word, FULL_MASK,
};
use greenstm_storage::{LockIndex, LockState};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Per-thread transaction descriptor
pub struct Transaction {
    pub(crate) manager: Arc<TransactionManager>,
    pub(crate) slot: SlotId,
    pub(crate) seq: u64,
    pub(crate) status: TxStatus,
    pub(crate) attrs: TxAttributes,
    pub(crate) start: Timestamp,
    pub(crate) end: Timestamp,
    pub(crate) reads: ReadSet,
    pub(crate) writes: WriteSet,
    pub(crate) owned: OwnedLocks,
    // (address, previous value) of direct stores, oldest first
    pub(crate) undo: Vec<(Address, Word)>,
    pub(crate) nesting: u32,
    pub(crate) retries: u64,
    pub(crate) irrevocable: IrrevocableMode,
    pub(crate) direct: bool,
    pub(crate) exclusive: bool,
    pub(crate) contended: Option<LockIndex>,
    pub(crate) abort_reason: Option<AbortReason>,
    pub(crate) modules: Vec<Arc<dyn StmModule>>,
    pub(crate) specifics: SpecificSlots,
    exited: bool,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("slot", &self.slot)
            .field("status", &self.status)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("reads", &self.reads.len())
            .field("writes", &self.writes.len())
            .field("retries", &self.retries)
            .field("irrevocable", &self.irrevocable)
            .finish()
    }
}

impl Transaction {
    /// Register a new descriptor
    ///
    /// `modules` is the set of lifecycle subscribers for this thread; their
    /// `on_thread_init` hooks run before this returns.
    pub fn new(manager: Arc<TransactionManager>, modules: Vec<Arc<dyn StmModule>>) -> Result<Self> {
        if !manager.is_initialized() {
            return Err(StmError::NotInitialized);
        }
        let (slot, seq) = manager.registry().register()?;
        let capacity = manager.initial_rw_set_size();
        let mut tx = Transaction {
            manager,
            slot,
            seq,
            status: TxStatus::Inactive,
            attrs: TxAttributes::default(),
            start: 0,
            end: 0,
            reads: ReadSet::with_capacity(capacity),
            writes: WriteSet::with_capacity(capacity),
            owned: OwnedLocks::default(),
            undo: Vec::new(),
            nesting: 0,
            retries: 0,
            irrevocable: IrrevocableMode::Off,
            direct: false,
            exclusive: false,
            contended: None,
            abort_reason: None,
            modules,
            specifics: SpecificSlots::new(),
            exited: false,
        };
        notify(
            &tx.modules,
            &mut tx.specifics,
            tx.slot,
            0,
            None,
            ModuleEvent::ThreadInit,
        );
        Ok(tx)
    }

    /// Deregister the descriptor
    ///
    /// Rolls back an attempt still in flight, runs `on_thread_exit` hooks and
    /// frees the slot. Idempotent; also run on drop.
    pub fn exit(&mut self) {
        if self.exited {
            return;
        }
        if self.in_attempt() {
            let _ = self.rollback(AbortReason::Explicit);
        }
        self.irrevocable = IrrevocableMode::Off;
        notify(
            &self.modules,
            &mut self.specifics,
            self.slot,
            self.retries,
            None,
            ModuleEvent::ThreadExit,
        );
        self.manager.registry().release(self.slot);
        self.exited = true;
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Slot of this descriptor
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Shared engine state
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Current status, including a pending kill by another transaction
    pub fn status(&self) -> TxStatus {
        if self.status == TxStatus::Active && self.shared().status() == TxStatus::Killed {
            TxStatus::Killed
        } else {
            self.status
        }
    }

    /// Attributes of the current transaction
    pub fn attributes(&self) -> TxAttributes {
        self.attrs
    }

    /// Start timestamp of the current attempt
    pub fn start_timestamp(&self) -> Timestamp {
        self.start
    }

    /// Upper bound of the snapshot window
    pub fn end_timestamp(&self) -> Timestamp {
        self.end
    }

    /// Consecutive aborts since the last commit
    pub fn retries(&self) -> u64 {
        self.retries
    }

    /// Flat nesting depth, 0 outside a transaction
    pub fn nesting(&self) -> u32 {
        self.nesting
    }

    /// Degree of irrevocability (see [`IrrevocableMode::level`])
    pub fn irrevocable_level(&self) -> u8 {
        self.irrevocable.level()
    }

    /// True if the current attempt runs irrevocably
    pub fn is_irrevocable(&self) -> bool {
        self.irrevocable.is_held()
    }

    /// Reason of the last rollback
    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.abort_reason
    }

    /// Read set size
    pub fn read_set_len(&self) -> usize {
        self.reads.len()
    }

    /// Write set size
    pub fn write_set_len(&self) -> usize {
        self.writes.len()
    }

    /// Contention metadata of the current attempt
    pub fn meta(&self) -> TxMeta {
        TxMeta {
            slot: self.slot,
            start: self.start,
            reads: self.reads.len(),
            writes: self.writes.len(),
        }
    }

    /// Borrow a transaction-specific value
    pub fn specific<T: Any>(&self, key: SpecificKey) -> Option<&T> {
        self.specifics.get(key)
    }

    /// Mutably borrow a transaction-specific value
    pub fn specific_mut<T: Any>(&mut self, key: SpecificKey) -> Option<&mut T> {
        self.specifics.get_mut(key)
    }

    /// Store a transaction-specific value
    pub fn set_specific(&mut self, key: SpecificKey, value: SpecificValue) {
        self.specifics.set(key, value);
    }

    #[inline]
    pub(crate) fn shared(&self) -> &SlotShared {
        self.manager.registry().get(self.slot)
    }

    #[inline]
    pub(crate) fn in_attempt(&self) -> bool {
        matches!(self.status, TxStatus::Active | TxStatus::Irrevocable)
    }

    #[inline]
    pub(crate) fn mem(&self, addr: Address) -> Word {
        self.manager.heap().load(addr).unwrap_or(0)
    }

    #[inline]
    fn publish_work(&self) {
        self.shared().publish_work(self.reads.len(), self.writes.len());
    }

    // ========================================================================
    // Start
    // ========================================================================

    /// Start a transaction
    ///
    /// Returns true for an outermost start. A start inside a running
    /// transaction only deepens the flat nesting.
    pub fn start(&mut self, attrs: TxAttributes) -> Result<bool> {
        self.start_with(attrs, false)
    }

    /// Start a transaction with direct memory access
    ///
    /// The attempt holds the irrevocability gate and writes straight to
    /// memory. Callers run these one at a time.
    pub fn start_exclusive(&mut self, attrs: TxAttributes) -> Result<bool> {
        self.start_with(attrs, true)
    }

    fn start_with(&mut self, attrs: TxAttributes, exclusive: bool) -> Result<bool> {
        if !self.manager.is_initialized() {
            return Err(StmError::NotInitialized);
        }
        if self.exited {
            return Err(StmError::InvalidState("descriptor has exited".to_string()));
        }
        if self.nesting > 0 && self.in_attempt() {
            self.nesting += 1;
            return Ok(false);
        }
        self.attrs = attrs;
        self.exclusive = exclusive;
        self.contended = None;
        self.abort_reason = None;
        self.begin_attempt();
        Ok(true)
    }

    /// Begin the next attempt after a rollback
    ///
    /// Keeps the attributes (minus a read-only hint that caused the abort),
    /// waits out a delay-restart decision, then starts from scratch.
    pub fn restart(&mut self) -> Result<()> {
        if !self.manager.is_initialized() {
            return Err(StmError::NotInitialized);
        }
        if self.status != TxStatus::Aborted {
            return Err(StmError::InvalidState(format!(
                "restart requires an aborted attempt, status is {}",
                self.status
            )));
        }
        self.wait_before_restart();
        self.begin_attempt();
        Ok(())
    }

    fn wait_before_restart(&mut self) {
        let Some(idx) = self.contended.take() else {
            return;
        };
        let max_us = self.manager.max_backoff_us();
        backoff::wait_for_free(self.manager.locks(), idx, Duration::from_micros(max_us));
        let delay = backoff::restart_delay(self.retries, self.manager.min_backoff_us(), max_us);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    fn begin_attempt(&mut self) {
        self.reads.clear();
        self.writes.clear();
        self.owned.clear();
        self.undo.clear();
        self.nesting = 1;
        self.seq += 1;

        let idle = if self.status.is_in_flight() {
            TxStatus::Aborted
        } else {
            self.status
        };

        // Irrevocability is claimed before becoming visible, so the current
        // holder never waits on us.
        if self.exclusive {
            self.manager.irrevocable_gate().acquire(self.slot);
            self.irrevocable = IrrevocableMode::Held { serial: false };
        } else if let IrrevocableMode::Pending { serial } = self.irrevocable {
            self.manager.irrevocable_gate().acquire(self.slot);
            if serial {
                let outcome = self
                    .manager
                    .quiescence()
                    .quiesce(self.slot, false, self.manager.registry());
                debug_assert!(outcome.is_exclusive());
            }
            self.irrevocable = IrrevocableMode::Held { serial };
            debug!(slot = %self.slot, serial, retries = self.retries, "irrevocable attempt");
        }
        self.direct = self.exclusive || self.irrevocable == IrrevocableMode::Held { serial: true };

        let status = if self.irrevocable.is_held() {
            TxStatus::Irrevocable
        } else {
            TxStatus::Active
        };
        loop {
            self.manager
                .quiescence()
                .enter(self.slot, self.shared(), self.seq, status, idle);
            let now = self.manager.clock_now();
            if now < self.manager.clock_max() {
                self.start = now;
                break;
            }
            self.shared().set_status(self.seq, idle);
            self.manager.rollover(self.slot);
        }
        self.end = self.start;
        self.status = status;
        self.shared().publish_start(self.start);

        notify(
            &self.modules,
            &mut self.specifics,
            self.slot,
            self.retries,
            None,
            ModuleEvent::Start,
        );
    }

    // ========================================================================
    // Loads and stores
    // ========================================================================

    /// Transactional read of one word
    pub fn load(&mut self, addr: Address) -> TxResult<Word> {
        self.ensure_active()?;
        if !self.manager.heap().contains(addr) {
            return Err(self.rollback(AbortReason::Fault));
        }
        let idx = self.manager.locks().index_of(addr);

        if self.direct {
            self.acquire_direct(idx);
            return Ok(self.mem(addr));
        }

        if self.irrevocable.is_held() || self.attrs.visible_reads {
            self.acquire_encounter(idx, ConflictKind::ReadWrite)?;
            if !self.irrevocable.is_held() && self.writes.buffer(addr, 0, 0, idx) {
                self.publish_work();
            }
            let current = self.mem(addr);
            return Ok(self.writes.get(addr).map_or(current, |e| e.merged(current)));
        }

        if let Some(entry) = self.writes.get(addr) {
            if entry.mask == FULL_MASK {
                return Ok(entry.value);
            }
        }
        let current = self.read_consistent(addr, idx)?;
        Ok(self.writes.get(addr).map_or(current, |e| e.merged(current)))
    }

    /// Transactional write of one word
    pub fn store(&mut self, addr: Address, value: Word) -> TxResult<()> {
        self.store_masked(addr, value, FULL_MASK)
    }

    /// Transactional write of the bits of `value` selected by `mask`
    pub fn store_masked(&mut self, addr: Address, value: Word, mask: Word) -> TxResult<()> {
        self.ensure_active()?;
        if !self.manager.heap().contains(addr) {
            return Err(self.rollback(AbortReason::Fault));
        }
        if self.attrs.read_only {
            return Err(self.rollback(AbortReason::ReadOnlyWrite));
        }
        let idx = self.manager.locks().index_of(addr);

        if self.direct {
            self.acquire_direct(idx);
            let current = self.mem(addr);
            self.undo.push((addr, current));
            self.manager.heap().store(addr, apply_mask(current, value, mask));
            self.owned.mark_written(idx);
            return Ok(());
        }

        if self.irrevocable.is_held() {
            self.acquire_encounter(idx, ConflictKind::WriteWrite)?;
        }
        if self.writes.buffer(addr, value, mask, idx) {
            self.publish_work();
        }
        Ok(())
    }

    fn read_consistent(&mut self, addr: Address, idx: LockIndex) -> TxResult<Word> {
        let manager = Arc::clone(&self.manager);
        let locks = manager.locks();
        loop {
            let observed = locks.snapshot(idx);
            match observed {
                LockState::Owned { owner } if owner == self.slot => {
                    return Ok(self.mem(addr));
                }
                LockState::Owned { owner } => {
                    self.resolve_conflict(idx, observed, owner, ConflictKind::ReadWrite)?;
                }
                LockState::Free { version } => {
                    let value = self.mem(addr);
                    if locks.snapshot(idx) != observed {
                        continue;
                    }
                    if version > self.end {
                        self.extend()?;
                    }
                    if !self.attrs.read_only {
                        self.reads.push(addr, idx, version);
                        self.publish_work();
                    }
                    return Ok(value);
                }
            }
        }
    }

    /// Move `end` forward to the current clock if the read set still holds
    fn extend(&mut self) -> TxResult<()> {
        if self.attrs.read_only || self.attrs.no_extend {
            return Err(self.rollback(AbortReason::Validate));
        }
        let now = self.manager.clock_now();
        if now >= self.manager.clock_max() {
            return Err(self.rollback(AbortReason::ClockRollover));
        }
        if !validate_read_set(&self.reads, &self.owned, self.manager.locks(), self.slot) {
            return Err(self.rollback(AbortReason::Validate));
        }
        trace!(slot = %self.slot, from = self.end, to = now, "snapshot extended");
        self.end = now;
        Ok(())
    }

    /// Enable or disable snapshot extension, optionally narrowing `end`
    pub fn set_extension(&mut self, enable: bool, upper_bound: Option<Timestamp>) {
        self.attrs.no_extend = !enable;
        if let Some(bound) = upper_bound {
            if bound < self.end {
                self.end = bound;
            }
        }
    }

    // ========================================================================
    // Locks and conflicts
    // ========================================================================

    /// Take a lock at encounter time (visible reads, irrevocable mode)
    pub(crate) fn acquire_encounter(&mut self, idx: LockIndex, kind: ConflictKind) -> TxResult<()> {
        if self.owned.contains(idx) {
            return Ok(());
        }
        let manager = Arc::clone(&self.manager);
        let locks = manager.locks();
        loop {
            let observed = locks.snapshot(idx);
            match observed {
                LockState::Owned { owner } if owner == self.slot => return Ok(()),
                LockState::Owned { owner } => {
                    self.resolve_conflict(idx, observed, owner, kind)?;
                }
                LockState::Free { version } => {
                    if version > self.end && !self.irrevocable.is_held() {
                        self.extend()?;
                        continue;
                    }
                    if locks.acquire(idx, version, self.slot) {
                        self.owned.insert(idx, version);
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Take a lock at commit time
    pub(crate) fn acquire_commit(&mut self, idx: LockIndex) -> TxResult<()> {
        let manager = Arc::clone(&self.manager);
        let locks = manager.locks();
        loop {
            let observed = locks.snapshot(idx);
            match observed {
                LockState::Owned { owner } if owner == self.slot => return Ok(()),
                LockState::Owned { owner } => {
                    self.resolve_conflict(idx, observed, owner, ConflictKind::WriteWrite)?;
                }
                LockState::Free { version } => {
                    if locks.acquire(idx, version, self.slot) {
                        self.owned.insert(idx, version);
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Take a lock for direct access; every other writer is excluded
    fn acquire_direct(&mut self, idx: LockIndex) {
        if self.owned.contains(idx) {
            return;
        }
        let locks = self.manager.locks();
        let mut spin = SpinWait::new();
        loop {
            match locks.snapshot(idx) {
                LockState::Owned { owner } if owner == self.slot => return,
                LockState::Owned { .. } => spin.spin(),
                LockState::Free { version } => {
                    if locks.acquire(idx, version, self.slot) {
                        self.owned.insert(idx, version);
                        return;
                    }
                }
            }
        }
    }

    /// Handle a lock owned by `owner`
    ///
    /// Returns `Ok` once the caller should look at the lock again.
    fn resolve_conflict(
        &mut self,
        idx: LockIndex,
        observed: LockState,
        owner: SlotId,
        kind: ConflictKind,
    ) -> TxResult<()> {
        let manager = Arc::clone(&self.manager);
        let other = manager.registry().get(owner);
        let word = other.status_word();
        let (_, other_status) = unpack_status(word);

        let decision = match other_status {
            TxStatus::Active if self.irrevocable.is_held() => Decision::KillOther,
            TxStatus::Active => manager
                .policy()
                .decide(&self.meta(), &other.meta(owner), kind),
            TxStatus::Irrevocable if !self.irrevocable.is_held() => Decision::KillSelf,
            // Committing, already killed, or a unit store: it releases shortly
            _ => return self.wait_for_change(idx, observed),
        };
        trace!(slot = %self.slot, other = %owner, %kind, ?decision, "conflict");

        if decision.yields() {
            if decision.delays_restart() {
                self.contended = Some(idx);
            }
            return Err(self.rollback(AbortReason::Conflict(kind)));
        }
        other.kill(word);
        self.wait_for_change(idx, observed)
    }

    fn wait_for_change(&mut self, idx: LockIndex, observed: LockState) -> TxResult<()> {
        let manager = Arc::clone(&self.manager);
        let mut spin = SpinWait::new();
        while manager.locks().snapshot(idx) == observed {
            self.check_killed()?;
            spin.spin();
        }
        Ok(())
    }

    /// Roll back if another transaction killed this attempt
    pub(crate) fn check_killed(&mut self) -> TxResult<()> {
        if self.status == TxStatus::Active && self.shared().status() == TxStatus::Killed {
            return Err(self.rollback(AbortReason::Killed));
        }
        Ok(())
    }

    /// Fail unless an attempt is running and has not been killed
    pub(crate) fn ensure_active(&mut self) -> TxResult<()> {
        match self.status {
            TxStatus::Active => self.check_killed(),
            TxStatus::Irrevocable => Ok(()),
            _ => Err(Abort::new(
                self.abort_reason.unwrap_or(AbortReason::Explicit),
            )),
        }
    }

    // ========================================================================
    // Irrevocability
    // ========================================================================

    /// Switch the running attempt to irrevocable mode
    ///
    /// Outside an attempt this only records the request for the next one.
    /// Inside, the first request claims the process-wide flag and validates
    /// the read set. Serial mode additionally quiesces every other thread;
    /// an attempt that already buffered writes is rolled back and restarts
    /// with direct memory access.
    pub fn set_irrevocable(&mut self, serial: bool) -> TxResult<()> {
        if !self.in_attempt() {
            self.irrevocable = IrrevocableMode::Pending { serial };
            return Ok(());
        }
        self.ensure_active()?;

        match self.irrevocable {
            IrrevocableMode::Held { serial: true } => return Ok(()),
            IrrevocableMode::Held { serial: false } if !serial || self.exclusive => return Ok(()),
            IrrevocableMode::Held { serial: false } => {
                // Upgrade: restart serial
                return Err(self.fail_irrevocable(true, AbortReason::Irrevocable));
            }
            _ => {}
        }

        let manager = Arc::clone(&self.manager);
        if !manager.irrevocable_gate().try_acquire(self.slot) {
            return Err(self.fail_irrevocable(serial, AbortReason::Irrevocable));
        }
        // Flag held: any failure below must hand it back
        self.irrevocable = IrrevocableMode::Held { serial: false };

        if !validate_read_set(&self.reads, &self.owned, manager.locks(), self.slot) {
            return Err(self.fail_irrevocable(serial, AbortReason::Validate));
        }

        if serial {
            if !self.writes.is_empty() || !self.owned.is_empty() {
                return Err(self.fail_irrevocable(true, AbortReason::Irrevocable));
            }
            let outcome = manager
                .quiescence()
                .quiesce(self.slot, true, manager.registry());
            if outcome == Quiesced::Busy {
                return Err(self.fail_irrevocable(true, AbortReason::Irrevocable));
            }
            // Writers drained by the wait may have committed over our reads
            if !validate_read_set(&self.reads, &self.owned, manager.locks(), self.slot) {
                manager.quiescence().release(self.slot);
                return Err(self.fail_irrevocable(true, AbortReason::Validate));
            }
            if !self
                .shared()
                .transition(self.seq, TxStatus::Active, TxStatus::Irrevocable)
            {
                manager.quiescence().release(self.slot);
                return Err(self.fail_irrevocable(true, AbortReason::Killed));
            }
            self.irrevocable = IrrevocableMode::Held { serial: true };
            self.direct = true;
        } else {
            // Pin everything read so far
            let reads: Vec<(LockIndex, Timestamp)> =
                self.reads.iter().map(|e| (e.lock, e.version)).collect();
            for (idx, version) in reads {
                if self.owned.contains(idx) {
                    continue;
                }
                if !manager.locks().acquire(idx, version, self.slot) {
                    return Err(self.fail_irrevocable(false, AbortReason::Validate));
                }
                self.owned.insert(idx, version);
            }
            if !self
                .shared()
                .transition(self.seq, TxStatus::Active, TxStatus::Irrevocable)
            {
                return Err(self.fail_irrevocable(false, AbortReason::Killed));
            }
        }

        self.status = TxStatus::Irrevocable;
        debug!(slot = %self.slot, serial, "irrevocability acquired in flight");
        Ok(())
    }

    /// Hand back irrevocability, remember the request and roll back
    fn fail_irrevocable(&mut self, serial: bool, reason: AbortReason) -> Abort {
        self.release_irrevocability();
        self.irrevocable = IrrevocableMode::Pending { serial };
        self.rollback(reason)
    }

    /// Release the irrevocability flag and, in serial mode, the quiescence gate
    pub(crate) fn release_irrevocability(&mut self) {
        if let IrrevocableMode::Held { serial } = self.irrevocable {
            if serial {
                self.manager.quiescence().release(self.slot);
            }
            self.manager.irrevocable_gate().release(self.slot);
            self.irrevocable = IrrevocableMode::Off;
        }
        self.direct = false;
    }

    // ========================================================================
    // Unit transactions
    // ========================================================================

    /// Read one word outside any transaction
    ///
    /// Spins while the guarding lock is owned. Returns the value and the
    /// lock version it was read at.
    pub fn unit_load(&self, addr: Address) -> Result<(Word, Timestamp)> {
        let heap = self.manager.heap();
        if !heap.contains(addr) {
            return Err(StmError::InvalidState(format!("address {} outside heap", addr)));
        }
        let locks = self.manager.locks();
        let idx = locks.index_of(addr);
        let mut spin = SpinWait::new();
        loop {
            let observed = locks.snapshot(idx);
            match observed {
                LockState::Owned { .. } => spin.spin(),
                LockState::Free { version } => {
                    let value = self.mem(addr);
                    if locks.snapshot(idx) == observed {
                        return Ok((value, version));
                    }
                }
            }
        }
    }

    /// Write one word outside any transaction
    ///
    /// With `timestamp`, the store fails if the word changed after that
    /// version: it returns false and refreshes `timestamp` to the current
    /// version. Otherwise the store always succeeds.
    pub fn unit_store(
        &mut self,
        addr: Address,
        value: Word,
        mask: Word,
        mut timestamp: Option<&mut Timestamp>,
    ) -> Result<bool> {
        if self.nesting > 0 {
            return Err(StmError::InvalidState(
                "unit store inside a transaction".to_string(),
            ));
        }
        let manager = Arc::clone(&self.manager);
        if !manager.heap().contains(addr) {
            return Err(StmError::InvalidState(format!("address {} outside heap", addr)));
        }
        let locks = manager.locks();
        let idx = locks.index_of(addr);

        // Visible to quiescence while the lock is held, but never killable
        let idle = self.status;
        self.seq += 1;
        manager
            .quiescence()
            .enter(self.slot, self.shared(), self.seq, TxStatus::Committing, idle);

        let mut spin = SpinWait::new();
        loop {
            match locks.snapshot(idx) {
                LockState::Owned { .. } => spin.spin(),
                LockState::Free { version } => {
                    if let Some(ts) = timestamp.as_deref_mut() {
                        if version > *ts {
                            *ts = version;
                            self.shared().set_status(self.seq, idle);
                            return Ok(false);
                        }
                    }
                    if locks.acquire(idx, version, self.slot) {
                        break;
                    }
                }
            }
        }

        let current = self.mem(addr);
        manager.heap().store(addr, apply_mask(current, value, mask));
        let ts = manager.clock().tick();
        locks.release(idx, ts);
        self.shared().set_status(self.seq, idle);
        if let Some(out) = timestamp {
            *out = ts;
        }

        if ts >= manager.clock_max() {
            manager.rollover(self.slot);
        }
        Ok(true)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.exit();
    }
}
