//! Fatal engine errors
//!
//! These surface from initialization and API-misuse paths only. Aborts of
//! individual transaction attempts are [`crate::abort::Abort`] values, not
//! errors of this kind.

use thiserror::Error;

/// Errors raised by engine setup, registration and parameter handling
#[derive(Debug, Error)]
pub enum StmError {
    /// The engine was shut down or never initialized
    #[error("engine not initialized")]
    NotInitialized,

    /// A bounded registry is full
    #[error("resource exhausted: {resource} (limit {limit})")]
    ResourceExhausted {
        /// Which registry overflowed
        resource: &'static str,
        /// Its capacity
        limit: usize,
    },

    /// Unknown parameter name, read-only parameter or rejected value
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name as given
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// Operation not allowed in the current descriptor or engine state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Configuration failed validation or parsing
    #[error("configuration error: {0}")]
    Config(String),
}

impl StmError {
    /// Shorthand for [`StmError::InvalidParameter`]
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        StmError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a resource exhaustion error
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, StmError::ResourceExhausted { .. })
    }
}

impl From<toml::de::Error> for StmError {
    fn from(e: toml::de::Error) -> Self {
        StmError::Config(e.to_string())
    }
}

/// Result type for fatal engine operations
pub type Result<T> = std::result::Result<T, StmError>;
