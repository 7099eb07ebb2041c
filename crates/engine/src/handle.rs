//! Per-thread handle and the retry execution loop
//!
//! ## Retry loop
//!
//! ```text
//! start(attrs)
//! loop {
//!     op(tx)      Ok(v)           -> commit; Ok -> Committed(v)
//!                 Err(Declined(e)) -> roll back -> Failed(e)
//!                 Err(Abort(r))    -> counted; non-retryable or no_retry
//!                                     -> Aborted(r), otherwise restart
//! }
//! ```
//!
//! The operation is re-run from the top on every attempt, so it must not
//! keep side effects outside the transaction between attempts.

use crate::engine::Engine;
use crate::executor::{LatencySink, OperationCounters, Outcome};
use greenstm_concurrency::{StmModule, Transaction};
use greenstm_core::{
    AbortReason, Address, Backend, Result, SlotId, StmError, Timestamp, TxAttributes, TxError,
    TxStatus, Word,
};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A thread's registration with an [`Engine`]
///
/// Not shareable between threads; each worker registers its own.
pub struct ThreadHandle {
    engine: Arc<Engine>,
    tx: Transaction,
    counters: FxHashMap<String, OperationCounters>,
    latency_sink: Option<Box<dyn LatencySink>>,
}

impl std::fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("tx", &self.tx)
            .field("kinds", &self.counters.len())
            .finish()
    }
}

impl ThreadHandle {
    pub(crate) fn new(engine: Arc<Engine>, modules: Vec<Arc<dyn StmModule>>) -> Result<Self> {
        let tx = Transaction::new(Arc::clone(engine.manager()), modules)?;
        Ok(ThreadHandle {
            engine,
            tx,
            counters: FxHashMap::default(),
            latency_sink: None,
        })
    }

    /// Engine this handle belongs to
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Slot of this thread
    pub fn slot(&self) -> SlotId {
        self.tx.slot()
    }

    /// Status of the thread's transaction
    pub fn status(&self) -> TxStatus {
        self.tx.status()
    }

    /// The thread's descriptor, for driving transactions by hand
    pub fn transaction(&mut self) -> &mut Transaction {
        &mut self.tx
    }

    /// Send the latency of every committed operation to `sink`
    pub fn set_latency_sink(&mut self, sink: Box<dyn LatencySink>) {
        self.latency_sink = Some(sink);
    }

    /// Counters recorded by [`run_operation`](ThreadHandle::run_operation), by kind
    pub fn counters(&self) -> &FxHashMap<String, OperationCounters> {
        &self.counters
    }

    /// Counters of one kind; zero if never run
    pub fn counters_for(&self, kind: &str) -> OperationCounters {
        self.counters.get(kind).copied().unwrap_or_default()
    }

    /// Sum of the counters of every kind
    pub fn total_counters(&self) -> OperationCounters {
        let mut total = OperationCounters::default();
        for c in self.counters.values() {
            total.merge(c);
        }
        total
    }

    /// Run `op` as a transaction, retrying on abort
    ///
    /// Fails only if the engine is shut down or a transaction is already
    /// running on this handle.
    pub fn run_transactional<T, E, F>(&mut self, attrs: TxAttributes, op: F) -> Result<Outcome<T, E>>
    where
        F: FnMut(&mut Transaction) -> std::result::Result<T, TxError<E>>,
    {
        self.execute(attrs, op).map(|(outcome, _)| outcome)
    }

    /// Run `op` like [`run_transactional`](ThreadHandle::run_transactional)
    /// and record the result under `kind`
    pub fn run_operation<T, E, F>(
        &mut self,
        kind: &str,
        attrs: TxAttributes,
        op: F,
    ) -> Result<Outcome<T, E>>
    where
        F: FnMut(&mut Transaction) -> std::result::Result<T, TxError<E>>,
    {
        let started = Instant::now();
        let (outcome, aborts) = self.execute(attrs, op)?;
        let elapsed = started.elapsed();

        let counters = self.counters.entry(kind.to_string()).or_default();
        counters.aborted += aborts;
        if outcome.is_committed() {
            counters.successful += 1;
            counters.latency += elapsed;
            if let Some(sink) = self.latency_sink.as_mut() {
                sink.record(kind, elapsed);
            }
        } else {
            counters.failed += 1;
        }
        Ok(outcome)
    }

    fn execute<T, E, F>(&mut self, attrs: TxAttributes, mut op: F) -> Result<(Outcome<T, E>, u64)>
    where
        F: FnMut(&mut Transaction) -> std::result::Result<T, TxError<E>>,
    {
        if self.tx.nesting() > 0 {
            return Err(StmError::InvalidState(
                "a transaction is already running on this handle".to_string(),
            ));
        }
        let engine = Arc::clone(&self.engine);
        let serialized = engine.backend() == Backend::GlobalLock;
        let _guard = serialized.then(|| engine.global_lock().lock());
        if serialized {
            self.tx.start_exclusive(attrs)?;
        } else {
            self.tx.start(attrs)?;
        }

        let mut aborts = 0u64;
        loop {
            let result = match op(&mut self.tx) {
                Ok(value) => self.tx.commit().map(|()| value).map_err(TxError::Abort),
                Err(e) => Err(e),
            };
            match result {
                Ok(value) => return Ok((Outcome::Committed(value), aborts)),
                Err(TxError::Declined(e)) => {
                    let _ = self.tx.abort(AbortReason::NoRetry);
                    return Ok((Outcome::Failed(e), aborts));
                }
                Err(TxError::Abort(abort)) => {
                    // An abort raised by the operation itself still needs a rollback
                    let reason = self.tx.abort(abort.reason()).reason();
                    aborts += 1;
                    if !reason.is_retryable() || attrs.no_retry {
                        debug!(slot = %self.slot(), %reason, aborts, "giving up");
                        return Ok((Outcome::Aborted(reason), aborts));
                    }
                    self.tx.restart()?;
                }
            }
        }
    }

    /// Read one word outside any transaction
    pub fn unit_load(&self, addr: Address) -> Result<(Word, Timestamp)> {
        self.tx.unit_load(addr)
    }

    /// Write one word outside any transaction
    ///
    /// See [`Transaction::unit_store`].
    pub fn unit_store(
        &mut self,
        addr: Address,
        value: Word,
        mask: Word,
        timestamp: Option<&mut Timestamp>,
    ) -> Result<bool> {
        self.tx.unit_store(addr, value, mask, timestamp)
    }

    /// Deregister the thread
    ///
    /// Also done on drop.
    pub fn exit(mut self) {
        self.tx.exit();
        debug!(slot = %self.tx.slot(), "thread exited");
    }
}

/// Latency sink that keeps the slowest committed operation per kind
#[derive(Debug, Default)]
pub struct MaxLatency {
    /// Slowest operation seen, by kind
    pub by_kind: FxHashMap<String, Duration>,
}

impl LatencySink for MaxLatency {
    fn record(&mut self, kind: &str, elapsed: Duration) {
        let slot = self.by_kind.entry(kind.to_string()).or_default();
        if elapsed > *slot {
            *slot = elapsed;
        }
    }
}
