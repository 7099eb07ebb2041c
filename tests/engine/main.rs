//! Engine Integration Tests
//!
//! End-to-end behaviour of the transactional engine through the public API:
//! - Scenarios: stale reads, contention, serial irrevocability, rollover
//! - Contention manager consistency across policies
//! - Modules and specific slots
//! - Multi-threaded stress with invariant checks
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test engine
//! cargo test --test engine stress::
//! ```

mod common;

mod contention;
mod irrevocable;
mod modules;
mod scenarios;
mod stress;
