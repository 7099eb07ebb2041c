//! Transaction manager: the state every descriptor of one engine shares
//!
//! Owns:
//! 1. The word heap, the versioned lock table and the global clock
//! 2. The slot registry publishing descriptor status
//! 3. The quiescence barrier and the irrevocability gate
//! 4. Runtime-tunable parameters (policy, backoff bounds, clock maximum)
//!
//! ## Clock rollover
//!
//! ```text
//! 1. quiesce() - close the gate, wait until no other slot is in flight
//! 2. re-check the clock against clock_max (another thread may have won)
//! 3. reset the clock to 0 and every lock to Free { version: 0 }
//! 4. open the gate
//! ```
//!
//! Rollover runs only from descriptors that are not in flight themselves,
//! so no attempt can straddle it and observe the clock moving backwards
//! relative to its start timestamp.

use crate::quiesce::{QuiescenceBarrier, Quiesced};
use crate::registry::SlotRegistry;
use crate::irrevocable::IrrevocableGate;
use greenstm_core::{
    Address, ContentionPolicy, Design, EngineConfig, Parameter, ParameterValue, Result, SlotId,
    StmError, Timestamp, Word,
};
use greenstm_storage::{GlobalClock, LockTable, WordHeap, MAX_VERSION};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use tracing::{debug, info};

/// Largest accepted rollover threshold
///
/// Leaves headroom for ticks taken concurrently before the rollover runs.
pub const CLOCK_MAX_LIMIT: Timestamp = MAX_VERSION >> 1;

/// Runtime-tunable parameters
#[derive(Debug)]
struct Tuning {
    policy: AtomicU8,
    min_backoff_us: AtomicU64,
    max_backoff_us: AtomicU64,
    clock_max: AtomicU64,
    initial_rw_set_size: AtomicUsize,
}

/// Shared state of one engine
///
/// # Thread Safety
///
/// Every field is either immutable after construction or an atomic. The
/// lock table and clock are never protected by a mutex; the quiescence
/// barrier and irrevocability gate are themselves single-word CAS gates.
#[derive(Debug)]
pub struct TransactionManager {
    heap: WordHeap,
    locks: LockTable,
    clock: GlobalClock,
    registry: SlotRegistry,
    quiescence: QuiescenceBarrier,
    irrevocable: IrrevocableGate,
    tuning: Tuning,
    rollovers: AtomicU64,
    initialized: AtomicBool,
}

impl TransactionManager {
    /// Build the shared state described by `config`
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        if config.clock_max > CLOCK_MAX_LIMIT {
            return Err(StmError::Config(format!(
                "clock_max must not exceed {}, got {}",
                CLOCK_MAX_LIMIT, config.clock_max
            )));
        }

        let manager = TransactionManager {
            heap: WordHeap::new(config.heap_words),
            locks: LockTable::new(config.lock_table_log_size, config.lock_shift),
            clock: GlobalClock::new(),
            registry: SlotRegistry::new(config.max_threads),
            quiescence: QuiescenceBarrier::new(),
            irrevocable: IrrevocableGate::new(),
            tuning: Tuning {
                policy: AtomicU8::new(config.contention_policy.code()),
                min_backoff_us: AtomicU64::new(config.min_backoff_us),
                max_backoff_us: AtomicU64::new(config.max_backoff_us),
                clock_max: AtomicU64::new(config.clock_max),
                initial_rw_set_size: AtomicUsize::new(config.initial_rw_set_size),
            },
            rollovers: AtomicU64::new(0),
            initialized: AtomicBool::new(true),
        };

        info!(
            design = %Design::WriteBackCtl,
            policy = %config.contention_policy,
            heap_words = config.heap_words,
            locks = manager.locks.len(),
            max_threads = config.max_threads,
            "transaction manager initialized"
        );
        Ok(manager)
    }

    // ========================================================================
    // Shared structures
    // ========================================================================

    /// Engine-owned memory
    pub fn heap(&self) -> &WordHeap {
        &self.heap
    }

    /// Versioned locks
    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// Global clock
    pub fn clock(&self) -> &GlobalClock {
        &self.clock
    }

    /// Slot registry
    pub fn registry(&self) -> &SlotRegistry {
        &self.registry
    }

    /// Quiescence barrier
    pub fn quiescence(&self) -> &QuiescenceBarrier {
        &self.quiescence
    }

    /// Irrevocability gate
    pub fn irrevocable_gate(&self) -> &IrrevocableGate {
        &self.irrevocable
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// False once [`TransactionManager::shutdown`] ran
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Refuse new attempts; returns false if already shut down
    pub fn shutdown(&self) -> bool {
        let was = self.initialized.swap(false, Ordering::AcqRel);
        if was {
            info!(
                clock = self.clock.now(),
                rollovers = self.rollover_count(),
                "transaction manager shut down"
            );
        }
        was
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Current clock value
    pub fn clock_now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Slots with an attempt in flight
    pub fn in_flight_count(&self) -> usize {
        self.registry.in_flight()
    }

    /// Completed clock rollovers
    pub fn rollover_count(&self) -> u64 {
        self.rollovers.load(Ordering::Acquire)
    }

    /// Non-transactional read of a word
    pub fn peek(&self, addr: Address) -> Option<Word> {
        self.heap.load(addr)
    }

    /// Reserve `words` consecutive heap words
    pub fn allocate(&self, words: usize) -> Result<Address> {
        self.heap.allocate(words)
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Active contention policy
    pub fn policy(&self) -> ContentionPolicy {
        ContentionPolicy::from_code(self.tuning.policy.load(Ordering::Relaxed))
    }

    /// Lower restart backoff bound in microseconds
    pub fn min_backoff_us(&self) -> u64 {
        self.tuning.min_backoff_us.load(Ordering::Relaxed)
    }

    /// Upper restart backoff bound in microseconds
    pub fn max_backoff_us(&self) -> u64 {
        self.tuning.max_backoff_us.load(Ordering::Relaxed)
    }

    /// Clock value that triggers rollover
    pub fn clock_max(&self) -> Timestamp {
        self.tuning.clock_max.load(Ordering::Relaxed)
    }

    /// Initial capacity for new read and write sets
    pub fn initial_rw_set_size(&self) -> usize {
        self.tuning.initial_rw_set_size.load(Ordering::Relaxed)
    }

    /// Read a parameter
    pub fn get_parameter(&self, param: Parameter) -> ParameterValue {
        match param {
            Parameter::ContentionManager => ParameterValue::Text(self.policy().name().to_string()),
            Parameter::Design => ParameterValue::Text(Design::WriteBackCtl.name().to_string()),
            Parameter::InitialRwSetSize => ParameterValue::Number(self.initial_rw_set_size() as u64),
            Parameter::MinBackoff => ParameterValue::Number(self.min_backoff_us()),
            Parameter::MaxBackoff => ParameterValue::Number(self.max_backoff_us()),
            Parameter::ClockMax => ParameterValue::Number(self.clock_max()),
        }
    }

    /// Change a parameter
    ///
    /// Rejects read-only parameters, values of the wrong kind, unknown
    /// policy names and values breaking `min_backoff <= max_backoff`.
    pub fn set_parameter(&self, param: Parameter, value: ParameterValue) -> Result<()> {
        match param {
            Parameter::Design => {
                return Err(StmError::invalid_parameter(param.name(), "read-only"));
            }
            Parameter::ContentionManager => {
                let name = value
                    .as_text()
                    .ok_or_else(|| StmError::invalid_parameter(param.name(), "expected a policy name"))?;
                let policy: ContentionPolicy = name.parse()?;
                self.tuning.policy.store(policy.code(), Ordering::Relaxed);
            }
            Parameter::InitialRwSetSize => {
                let n = expect_number(param, &value)?;
                self.tuning
                    .initial_rw_set_size
                    .store(n as usize, Ordering::Relaxed);
            }
            Parameter::MinBackoff => {
                let n = expect_number(param, &value)?;
                if n > self.max_backoff_us() {
                    return Err(StmError::invalid_parameter(param.name(), "exceeds max_backoff"));
                }
                self.tuning.min_backoff_us.store(n, Ordering::Relaxed);
            }
            Parameter::MaxBackoff => {
                let n = expect_number(param, &value)?;
                if n < self.min_backoff_us() {
                    return Err(StmError::invalid_parameter(param.name(), "below min_backoff"));
                }
                self.tuning.max_backoff_us.store(n, Ordering::Relaxed);
            }
            Parameter::ClockMax => {
                let n = expect_number(param, &value)?;
                if n == 0 || n > CLOCK_MAX_LIMIT {
                    return Err(StmError::invalid_parameter(param.name(), "out of range"));
                }
                self.tuning.clock_max.store(n, Ordering::Relaxed);
            }
        }
        debug!(parameter = %param, value = %value, "parameter updated");
        Ok(())
    }

    // ========================================================================
    // Rollover
    // ========================================================================

    /// Reset the clock and all lock versions once the clock reached its maximum
    ///
    /// `requester` must not have an attempt in flight.
    pub fn rollover(&self, requester: SlotId) {
        let outcome = self.quiescence.quiesce(requester, false, &self.registry);
        let now = self.clock.now();
        if now >= self.clock_max() {
            self.clock.reset();
            self.locks.reset();
            let count = self.rollovers.fetch_add(1, Ordering::AcqRel) + 1;
            debug!(slot = %requester, clock = now, rollovers = count, "global clock rolled over");
        }
        if outcome == Quiesced::Acquired {
            self.quiescence.release(requester);
        }
    }
}

fn expect_number(param: Parameter, value: &ParameterValue) -> Result<u64> {
    value
        .as_number()
        .ok_or_else(|| StmError::invalid_parameter(param.name(), "expected a number"))
}
