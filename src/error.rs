//! Unified error type for GreenSTM.
//!
//! Wraps the fatal engine errors and transaction aborts behind one enum for
//! callers that do not need to tell the layers apart.

use greenstm_core::{Abort, AbortReason, StmError};
use thiserror::Error;

/// All GreenSTM errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Engine shut down or never initialized
    #[error("engine not initialized")]
    NotInitialized,

    /// A bounded registry (threads, modules, specific slots, heap) is full
    #[error("resource exhausted: {resource} (limit {limit})")]
    ResourceExhausted {
        /// Which registry overflowed
        resource: &'static str,
        /// Its capacity
        limit: usize,
    },

    /// Rejected configuration or parameter
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation not allowed in the current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A transaction attempt was rolled back
    #[error("transaction aborted: {0}")]
    Aborted(AbortReason),
}

/// Result type for GreenSTM operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if retrying the transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Aborted(reason) if reason.is_retryable())
    }

    /// Check if this is a transaction abort.
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Aborted(_))
    }

    /// Check if this is a resource exhaustion error.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, Error::ResourceExhausted { .. })
    }
}

impl From<StmError> for Error {
    fn from(e: StmError) -> Self {
        match e {
            StmError::NotInitialized => Error::NotInitialized,
            StmError::ResourceExhausted { resource, limit } => {
                Error::ResourceExhausted { resource, limit }
            }
            StmError::InvalidParameter { name, reason } => {
                Error::Config(format!("invalid parameter {}: {}", name, reason))
            }
            StmError::Config(msg) => Error::Config(msg),
            StmError::InvalidState(msg) => Error::InvalidState(msg),
        }
    }
}

impl From<Abort> for Error {
    fn from(abort: Abort) -> Self {
        Error::Aborted(abort.reason())
    }
}
