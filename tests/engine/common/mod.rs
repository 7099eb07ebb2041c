//! Shared helpers for engine tests

#![allow(dead_code)]

use greenstm::prelude::*;
use std::sync::Arc;
use std::time::Duration;

/// Small engine suited to tests
pub fn small_config() -> EngineConfig {
    EngineConfig::new()
        .with_heap_words(1024)
        .with_lock_table_log_size(10)
        .with_max_threads(16)
        .with_initial_rw_set_size(64)
        .with_backoff_us(0, 50)
}

/// Engine with `policy`
pub fn engine_with(policy: ContentionPolicy) -> Arc<Engine> {
    Engine::new(small_config().with_policy(policy)).expect("engine init")
}

/// Engine with the default policy
pub fn engine() -> Arc<Engine> {
    engine_with(ContentionPolicy::Suicide)
}

/// Advance the global clock by committing `n` unit stores to `addr`
pub fn advance_clock(handle: &mut ThreadHandle, addr: Address, n: u64) {
    for _ in 0..n {
        handle
            .unit_store(addr, 0, FULL_MASK, None)
            .expect("unit store");
    }
}

/// Spin until `cond` holds, failing the test after `limit`
pub fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + limit;
    while !cond() {
        assert!(std::time::Instant::now() < deadline, "condition not reached in {:?}", limit);
        std::thread::yield_now();
    }
}

/// Install a test subscriber once; honours RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
