//! Transaction abort signalling
//!
//! An abort is not a fatal error. Every transactional operation returns
//! [`TxResult`], and an `Err(Abort)` unwinds the caller's operation through
//! `?` back to the retry loop, which rolls back and re-runs it from the top.
//!
//! Caller code that can also fail for its own domain reasons returns
//! `Result<T, TxError<E>>`: engine aborts convert into [`TxError::Abort`]
//! automatically, and [`TxError::Declined`] tells the retry loop to stop
//! without retrying.

use crate::types::ConflictKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a transaction attempt was rolled back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbortReason {
    /// A read-set entry changed since it was read
    Validate,
    /// A lock owned by another transaction, contention manager decided to yield
    Conflict(ConflictKind),
    /// Another transaction's contention manager killed this one
    Killed,
    /// The caller requested the abort
    Explicit,
    /// The caller declined further retries
    NoRetry,
    /// Irrevocable mode must be (re)acquired on the next attempt
    Irrevocable,
    /// A store was issued inside a read-only transaction
    ReadOnlyWrite,
    /// The global clock reached its maximum and was reset
    ClockRollover,
    /// An address outside the engine heap was accessed
    Fault,
}

impl AbortReason {
    /// Whether the retry loop may re-run the operation after this abort
    ///
    /// Only [`AbortReason::Fault`] and [`AbortReason::NoRetry`] are final.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AbortReason::Fault | AbortReason::NoRetry)
    }

    /// Whether the abort stems from a conflict with another transaction
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            AbortReason::Validate | AbortReason::Conflict(_) | AbortReason::Killed
        )
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Validate => f.write_str("validation failed"),
            AbortReason::Conflict(kind) => write!(f, "{} conflict", kind),
            AbortReason::Killed => f.write_str("killed by contention manager"),
            AbortReason::Explicit => f.write_str("explicit abort"),
            AbortReason::NoRetry => f.write_str("retry declined"),
            AbortReason::Irrevocable => f.write_str("irrevocability required"),
            AbortReason::ReadOnlyWrite => f.write_str("store in read-only transaction"),
            AbortReason::ClockRollover => f.write_str("clock rollover"),
            AbortReason::Fault => f.write_str("address fault"),
        }
    }
}

/// Signal that the current attempt has been rolled back
///
/// By the time an `Abort` is returned, the descriptor has already released
/// its locks and discarded its sets. Propagate it with `?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Abort {
    reason: AbortReason,
}

impl Abort {
    /// Wrap a reason
    pub fn new(reason: AbortReason) -> Self {
        Abort { reason }
    }

    /// The recorded reason
    pub fn reason(&self) -> AbortReason {
        self.reason
    }
}

impl From<AbortReason> for Abort {
    fn from(reason: AbortReason) -> Self {
        Abort::new(reason)
    }
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transaction aborted: {}", self.reason)
    }
}

impl std::error::Error for Abort {}

/// Result of a transactional operation
pub type TxResult<T> = Result<T, Abort>;

/// Failure of a caller-supplied transactional operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxError<E> {
    /// The engine rolled the attempt back; the retry loop may re-run it
    Abort(Abort),
    /// The operation declined to continue; counted as failed, never retried
    Declined(E),
}

impl<E> TxError<E> {
    /// Abort reason, if this is an engine abort
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            TxError::Abort(abort) => Some(abort.reason()),
            TxError::Declined(_) => None,
        }
    }
}

impl<E> From<Abort> for TxError<E> {
    fn from(abort: Abort) -> Self {
        TxError::Abort(abort)
    }
}

impl<E: fmt::Display> fmt::Display for TxError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxError::Abort(abort) => abort.fmt(f),
            TxError::Declined(e) => write!(f, "operation declined: {}", e),
        }
    }
}
