//! # GreenSTM
//!
//! Word-based software transactional memory with pluggable contention
//! management.
//!
//! Threads run blocks of loads and stores against an engine-owned heap with
//! all-or-nothing semantics. Reads are validated against versioned locks,
//! writes are buffered and published at commit under a global clock.
//!
//! ## Quick Start
//!
//! ```ignore
//! use greenstm::prelude::*;
//!
//! let engine = Engine::new(EngineConfig::new().with_policy(ContentionPolicy::Timestamp))?;
//! let from = engine.allocate(2)?;
//! let to = from.offset(1);
//!
//! let mut handle = engine.register_thread()?;
//! let outcome = handle.run_operation("transfer", TxAttributes::default(), |tx| {
//!     let balance = tx.load(from)?;
//!     if balance < 10 {
//!         return Err(TxError::Declined("insufficient funds"));
//!     }
//!     tx.store(from, balance - 10)?;
//!     let credit = tx.load(to)?;
//!     tx.store(to, credit + 10)?;
//!     Ok(())
//! })?;
//! ```
//!
//! ## Layers
//!
//! - [`greenstm_core`] - words, attributes, aborts, configuration
//! - [`greenstm_storage`] - heap, lock table, clock
//! - [`greenstm_concurrency`] - descriptors, commit protocol, contention
//! - [`greenstm_engine`] - engine value, retry loop, statistics

#![warn(missing_docs)]

mod error;

pub mod prelude;

pub use error::{Error, Result};

pub use greenstm_concurrency::{
    ContentionManager, Decision, IrrevocableMode, ModuleContext, SpecificKey, StmModule,
    Transaction, TxMeta, MAX_MODULES, MAX_SPECIFIC,
};
pub use greenstm_core::{
    Abort, AbortReason, Address, Backend, ConflictKind, ContentionPolicy, EngineConfig, Parameter,
    ParameterValue, SlotId, Timestamp, TxAttributes, TxError, TxResult, TxStatus, Word, FULL_MASK,
};
pub use greenstm_engine::{
    Engine, LatencySink, MaxLatency, OperationCounters, Outcome, StatsModule, ThreadHandle,
    ThreadStats,
};

// Layer crates, for callers that need the internals
pub use greenstm_concurrency;
pub use greenstm_core;
pub use greenstm_engine;
pub use greenstm_storage;
