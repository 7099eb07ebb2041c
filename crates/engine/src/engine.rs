//! The engine value
//!
//! One [`Engine`] owns everything that used to be process-global: heap, lock
//! table, clock, thread slots, registered modules and the specific-slot
//! counter. Threads take a [`ThreadHandle`] from it and pass that handle to
//! every transactional call.

use crate::handle::ThreadHandle;
use greenstm_concurrency::{
    SpecificKey, StmModule, TransactionManager, MAX_MODULES, MAX_SPECIFIC,
};
use greenstm_core::{
    Address, Backend, EngineConfig, Parameter, ParameterValue, Result, StmError, Timestamp, Word,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A software transactional memory engine
///
/// # Example
///
/// ```ignore
/// use greenstm::prelude::*;
///
/// let engine = Engine::new(EngineConfig::default())?;
/// let mut handle = engine.register_thread()?;
/// let counter = engine.allocate(1)?;
///
/// let outcome = handle.run_transactional(TxAttributes::default(), |tx| {
///     let n = tx.load(counter)?;
///     tx.store(counter, n + 1)?;
///     Ok::<_, TxError<()>>(n + 1)
/// })?;
/// assert!(outcome.is_committed());
/// ```
pub struct Engine {
    manager: Arc<TransactionManager>,
    modules: RwLock<Vec<Arc<dyn StmModule>>>,
    next_specific: AtomicUsize,
    /// Serializes every operation under [`Backend::GlobalLock`]
    global_lock: Mutex<()>,
    config: EngineConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("modules", &self.modules.read().len())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl Engine {
    /// Initialize an engine
    ///
    /// Validates `config` and allocates the heap and lock table.
    pub fn new(config: EngineConfig) -> Result<Arc<Self>> {
        let manager = TransactionManager::new(&config)?;
        Ok(Arc::new(Engine {
            manager: Arc::new(manager),
            modules: RwLock::new(Vec::new()),
            next_specific: AtomicUsize::new(0),
            global_lock: Mutex::new(()),
            config,
        }))
    }

    /// Initialize from a TOML document
    pub fn from_toml_str(s: &str) -> Result<Arc<Self>> {
        Self::new(EngineConfig::from_toml_str(s)?)
    }

    /// Stop accepting new transactions and thread registrations
    ///
    /// Idempotent. Returns true on the call that performed the shutdown.
    pub fn shutdown(&self) -> bool {
        self.manager.shutdown()
    }

    /// False once [`shutdown`](Engine::shutdown) ran
    pub fn is_initialized(&self) -> bool {
        self.manager.is_initialized()
    }

    /// Configuration the engine was built with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execution backend
    pub fn backend(&self) -> Backend {
        self.config.backend
    }

    /// Shared transaction state
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    pub(crate) fn global_lock(&self) -> &Mutex<()> {
        &self.global_lock
    }

    // ========================================================================
    // Threads and modules
    // ========================================================================

    /// Register the calling thread
    ///
    /// The handle sees the modules registered so far.
    pub fn register_thread(self: &Arc<Self>) -> Result<ThreadHandle> {
        if !self.is_initialized() {
            return Err(StmError::NotInitialized);
        }
        let modules = self.modules.read().clone();
        let handle = ThreadHandle::new(Arc::clone(self), modules)?;
        debug!(slot = %handle.slot(), "thread registered");
        Ok(handle)
    }

    /// Subscribe a module to lifecycle events
    ///
    /// Fails once [`MAX_MODULES`] are registered.
    pub fn register_module(&self, module: Arc<dyn StmModule>) -> Result<()> {
        let mut modules = self.modules.write();
        if modules.len() >= MAX_MODULES {
            warn!(module = module.name(), limit = MAX_MODULES, "module table full");
            return Err(StmError::ResourceExhausted {
                resource: "modules",
                limit: MAX_MODULES,
            });
        }
        debug!(module = module.name(), "module registered");
        modules.push(module);
        Ok(())
    }

    /// Number of registered modules
    pub fn module_count(&self) -> usize {
        self.modules.read().len()
    }

    /// Reserve a transaction-specific slot
    ///
    /// Fails once [`MAX_SPECIFIC`] slots are reserved.
    pub fn create_specific(&self) -> Result<SpecificKey> {
        match self
            .next_specific
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < MAX_SPECIFIC).then_some(n + 1)
            }) {
            Ok(index) => SpecificKey::from_index(index),
            Err(_) => {
                warn!(limit = MAX_SPECIFIC, "specific slots exhausted");
                Err(StmError::ResourceExhausted {
                    resource: "specific slots",
                    limit: MAX_SPECIFIC,
                })
            }
        }
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Read a parameter
    pub fn get_parameter(&self, param: Parameter) -> ParameterValue {
        self.manager.get_parameter(param)
    }

    /// Change a parameter
    pub fn set_parameter(&self, param: Parameter, value: impl Into<ParameterValue>) -> Result<()> {
        self.manager.set_parameter(param, value.into())
    }

    /// Read a parameter by name
    pub fn get_parameter_by_name(&self, name: &str) -> Result<ParameterValue> {
        Ok(self.get_parameter(name.parse()?))
    }

    /// Change a parameter by name
    pub fn set_parameter_by_name(&self, name: &str, value: impl Into<ParameterValue>) -> Result<()> {
        self.set_parameter(name.parse()?, value)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Current global clock value
    pub fn clock_now(&self) -> Timestamp {
        self.manager.clock_now()
    }

    /// Threads with an attempt in flight
    pub fn in_flight_count(&self) -> usize {
        self.manager.in_flight_count()
    }

    /// Completed clock rollovers
    pub fn rollover_count(&self) -> u64 {
        self.manager.rollover_count()
    }

    /// Registered threads
    pub fn thread_count(&self) -> usize {
        self.manager.registry().registered()
    }

    /// Non-transactional read, `None` outside the heap
    pub fn peek(&self, addr: Address) -> Option<Word> {
        self.manager.peek(addr)
    }

    /// Reserve `words` consecutive heap words
    pub fn allocate(&self, words: usize) -> Result<Address> {
        self.manager.allocate(words)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.manager.is_initialized() {
            self.manager.shutdown();
        }
    }
}
