//! Retry loop results and per-operation accounting

use greenstm_core::AbortReason;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of running an operation transactionally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    /// The operation committed with this value
    Committed(T),
    /// The operation declined to continue; its effects were rolled back
    Failed(E),
    /// The engine gave up: non-retryable abort or a `no_retry` transaction
    Aborted(AbortReason),
}

impl<T, E> Outcome<T, E> {
    /// True for [`Outcome::Committed`]
    pub fn is_committed(&self) -> bool {
        matches!(self, Outcome::Committed(_))
    }

    /// True for [`Outcome::Failed`]
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// Committed value, if any
    pub fn committed(self) -> Option<T> {
        match self {
            Outcome::Committed(v) => Some(v),
            _ => None,
        }
    }

    /// Abort reason the engine gave up with, if any
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            Outcome::Aborted(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Counters for one kind of operation
///
/// `successful + failed` counts logical operations; `aborted` counts every
/// rollback, including those before an eventual success or failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCounters {
    /// Operations that committed
    pub successful: u64,
    /// Engine-triggered rollbacks
    pub aborted: u64,
    /// Operations declined by the caller or abandoned by the engine
    pub failed: u64,
    /// Time spent in committed operations, including their retries
    pub latency: Duration,
}

impl OperationCounters {
    /// Logical operations attempted
    pub fn total(&self) -> u64 {
        self.successful + self.failed
    }

    /// Fold another set of counters into this one
    pub fn merge(&mut self, other: &OperationCounters) {
        self.successful += other.successful;
        self.aborted += other.aborted;
        self.failed += other.failed;
        self.latency += other.latency;
    }
}

/// Receives the latency of every committed operation
pub trait LatencySink: Send {
    /// One committed operation of `kind` took `elapsed`
    fn record(&mut self, kind: &str, elapsed: Duration);
}

impl<F> LatencySink for F
where
    F: FnMut(&str, Duration) + Send,
{
    fn record(&mut self, kind: &str, elapsed: Duration) {
        self(kind, elapsed)
    }
}
