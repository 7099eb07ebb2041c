//! Convenient imports for GreenSTM.
//!
//! ```ignore
//! use greenstm::prelude::*;
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! let mut handle = engine.register_thread()?;
//! ```

// Entry points
pub use crate::{Engine, ThreadHandle, Transaction};

// Error handling
pub use crate::error::{Error, Result};
pub use crate::{Abort, AbortReason, TxError, TxResult};

// Configuration
pub use crate::{Backend, ContentionPolicy, EngineConfig, Parameter, ParameterValue};

// Core types
pub use crate::{Address, TxAttributes, TxStatus, Word, FULL_MASK};

// Execution results
pub use crate::{OperationCounters, Outcome};
