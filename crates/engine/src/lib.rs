//! Engine layer for GreenSTM
//!
//! This crate ties the layers together:
//! - Engine: process-wide state, thread and module registration, parameters
//! - ThreadHandle: per-thread entry point and the retry execution loop
//! - Outcome / OperationCounters: what the retry loop reports
//! - StatsModule: commit and retry statistics as a lifecycle module

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod executor;
pub mod handle;
pub mod stats;

pub use engine::Engine;
pub use executor::{LatencySink, OperationCounters, Outcome};
pub use handle::{MaxLatency, ThreadHandle};
pub use stats::{StatsModule, ThreadStats};
