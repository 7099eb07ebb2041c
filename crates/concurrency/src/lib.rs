//! Transaction machinery for GreenSTM
//!
//! This crate implements the word-based software transactional memory:
//! - Transaction: per-thread descriptor with read/write sets and commit
//! - TransactionManager: shared clock, locks, heap and thread slots
//! - ContentionManager: who yields when two transactions collide
//! - QuiescenceBarrier and IrrevocableGate: process-wide exclusion
//! - StmModule: lifecycle hooks for statistics and similar extensions
//!
//! Reads are invisible by default and validated against lock versions;
//! writes are buffered and published at commit under the global clock.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
mod commit;
pub mod contention;
pub mod irrevocable;
pub mod manager;
pub mod module;
pub mod quiesce;
pub mod registry;
pub mod sets;
pub mod transaction;
pub mod validation;

pub use backoff::SpinWait;
pub use contention::{ContentionManager, Decision, TxMeta};
pub use irrevocable::{IrrevocableGate, IrrevocableMode};
pub use manager::TransactionManager;
pub use module::{
    ModuleContext, SpecificKey, SpecificSlots, SpecificValue, StmModule, MAX_MODULES, MAX_SPECIFIC,
};
pub use quiesce::{QuiescenceBarrier, Quiesced};
pub use registry::{SlotRegistry, SlotShared};
pub use sets::{OwnedLocks, ReadSet, WriteSet};
pub use transaction::Transaction;
pub use validation::validate_read_set;
