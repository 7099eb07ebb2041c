//! Storage layer for GreenSTM
//!
//! This crate holds the shared memory every transaction works against:
//! - WordHeap: engine-owned words, valid for the engine's lifetime
//! - LockTable: versioned locks, one per hashed address range
//! - GlobalClock: commit timestamps
//!
//! Everything here is mutated through atomics only.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod heap;
pub mod lock_table;

pub use clock::GlobalClock;
pub use heap::WordHeap;
pub use lock_table::{LockIndex, LockState, LockTable, MAX_VERSION};
