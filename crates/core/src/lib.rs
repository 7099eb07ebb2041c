//! Core types for GreenSTM
//!
//! This crate holds the vocabulary shared by every layer:
//! - Words, addresses, slot ids and timestamps
//! - Transaction attributes and the status state machine
//! - Abort signalling ([`Abort`], [`TxResult`], [`TxError`])
//! - The fatal error type [`StmError`]
//! - Engine configuration and runtime parameters

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod abort;
pub mod config;
pub mod error;
pub mod types;

pub use abort::{Abort, AbortReason, TxError, TxResult};
pub use config::{Backend, ContentionPolicy, Design, EngineConfig, Parameter, ParameterValue};
pub use error::{Result, StmError};
pub use types::{
    apply_mask, Address, ConflictKind, SlotId, Timestamp, TxAttributes, TxStatus, Word, FULL_MASK,
};
