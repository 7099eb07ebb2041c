//! Reference Scenarios
//!
//! Stale-read validation, timestamp contention, serial irrevocability and
//! clock rollover, each driven end to end through thread handles.

use crate::common::*;
use greenstm::prelude::*;
use greenstm::{ConflictKind, ContentionManager, Decision, SlotId, TxMeta};
use greenstm_storage::LockState;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// ============================================================================
// Stale read fails validation
// ============================================================================

#[test]
fn stale_read_fails_validation_at_commit() {
    init_tracing();
    let engine = engine();
    let a = engine.allocate(1).unwrap();
    let b = engine.allocate(1).unwrap();
    let mut t1 = engine.register_thread().unwrap();
    let mut t2 = engine.register_thread().unwrap();

    // 100 commits to `a`: clock and a's version are both 100
    advance_clock(&mut t1, a, 100);
    assert_eq!(engine.clock_now(), 100);

    let a_lock = engine.manager().locks().index_of(a);
    let mut attempts = 0;
    let outcome = t2
        .run_operation("read_a_write_b", TxAttributes::default(), |tx| {
            attempts += 1;
            let seen = tx.load(a)?;
            tx.store(b, seen + 1)?;

            if attempts == 1 {
                assert_eq!(tx.start_timestamp(), 100);
                // T1 commits a = 1 in between
                let committed = t1
                    .run_transactional(TxAttributes::default(), |tx1| {
                        tx1.store(a, 1)?;
                        Ok::<_, TxError<()>>(())
                    })
                    .unwrap();
                assert!(committed.is_committed());
                assert_eq!(engine.clock_now(), 101);
                assert_eq!(
                    engine.manager().locks().snapshot(a_lock),
                    LockState::Free { version: 101 }
                );
            } else {
                assert_eq!(tx.abort_reason(), Some(AbortReason::Validate));
            }
            Ok::<_, TxError<()>>(seen)
        })
        .unwrap();

    assert_eq!(outcome, Outcome::Committed(1));
    assert_eq!(attempts, 2);
    let counters = t2.counters_for("read_a_write_b");
    assert_eq!(counters.successful, 1);
    assert_eq!(counters.aborted, 1);
    assert_eq!(counters.failed, 0);
    assert_eq!(engine.peek(b), Some(2));
}

#[test]
fn read_only_transaction_commits_without_validation() {
    let engine = engine();
    let a = engine.allocate(1).unwrap();
    let mut t1 = engine.register_thread().unwrap();
    let mut t2 = engine.register_thread().unwrap();

    let outcome = t2
        .run_transactional(TxAttributes::default(), |tx| {
            let seen = tx.load(a)?;
            // A later writer does not invalidate a pure reader
            t1.unit_store(a, 9, FULL_MASK, None).unwrap();
            Ok::<_, TxError<()>>(seen)
        })
        .unwrap();
    assert_eq!(outcome, Outcome::Committed(0));
    assert_eq!(engine.clock_now(), 1);
}

// ============================================================================
// Timestamp contention
// ============================================================================

fn meta(slot: u32, start: u64) -> TxMeta {
    TxMeta {
        slot: SlotId::new(slot),
        start,
        reads: 0,
        writes: 1,
    }
}

#[test]
fn timestamp_policy_older_transaction_wins() {
    let policy = ContentionPolicy::Timestamp;
    let t1 = meta(1, 50);
    let t2 = meta(0, 60);
    assert_eq!(policy.decide(&t1, &t2, ConflictKind::WriteWrite), Decision::KillOther);
    let reverse = policy.decide(&t2, &t1, ConflictKind::WriteWrite);
    assert!(reverse.yields());
    assert_ne!(reverse, Decision::KillOther);
}

#[test]
fn timestamp_policy_younger_committer_yields() {
    let engine = engine_with(ContentionPolicy::Timestamp);
    let a = engine.allocate(1).unwrap();
    let clock_word = engine.allocate(1).unwrap();
    let mut older = engine.register_thread().unwrap();
    let mut younger = engine.register_thread().unwrap();

    advance_clock(&mut older, clock_word, 50);
    let tx1 = older.transaction();
    tx1.start(TxAttributes::default().with_visible_reads(true)).unwrap();
    assert_eq!(tx1.start_timestamp(), 50);
    tx1.load(a).unwrap();

    advance_clock(&mut younger, clock_word, 10);
    let tx2 = younger.transaction();
    tx2.start(TxAttributes::default()).unwrap();
    assert_eq!(tx2.start_timestamp(), 60);
    tx2.store(a, 7).unwrap();
    let abort = tx2.commit().unwrap_err();
    assert_eq!(abort.reason(), AbortReason::Conflict(ConflictKind::WriteWrite));

    // The older transaction is untouched
    let tx1 = older.transaction();
    assert_eq!(tx1.status(), TxStatus::Active);
    tx1.store(a, 1).unwrap();
    tx1.commit().unwrap();
    assert_eq!(engine.peek(a), Some(1));
}

#[test]
fn timestamp_policy_older_committer_kills_younger() {
    let engine = engine_with(ContentionPolicy::Timestamp);
    let a = engine.allocate(1).unwrap();
    let clock_word = engine.allocate(1).unwrap();
    let mut younger = engine.register_thread().unwrap();

    let older_started = Arc::new(AtomicBool::new(false));
    let younger_started = Arc::new(AtomicBool::new(false));

    let worker = {
        let engine = Arc::clone(&engine);
        let older_started = Arc::clone(&older_started);
        let younger_started = Arc::clone(&younger_started);
        thread::spawn(move || {
            let mut older = engine.register_thread().unwrap();
            let tx = older.transaction();
            tx.start(TxAttributes::default()).unwrap();
            older_started.store(true, Ordering::SeqCst);
            while !younger_started.load(Ordering::SeqCst) {
                thread::yield_now();
            }
            tx.store(a, 5).unwrap();
            tx.commit().map(|()| tx.start_timestamp())
        })
    };

    wait_until(Duration::from_secs(5), || older_started.load(Ordering::SeqCst));
    advance_clock(&mut younger, clock_word, 1);
    let tx = younger.transaction();
    tx.start(TxAttributes::default().with_visible_reads(true)).unwrap();
    tx.load(a).unwrap();
    younger_started.store(true, Ordering::SeqCst);

    wait_until(Duration::from_secs(5), || {
        younger.transaction().status() == TxStatus::Killed
    });
    let abort = younger.transaction().load(a).unwrap_err();
    assert_eq!(abort.reason(), AbortReason::Killed);

    let older_start = worker.join().unwrap().expect("older commits");
    assert_eq!(older_start, 0);
    assert_eq!(engine.peek(a), Some(5));
}

// ============================================================================
// Serial irrevocability
// ============================================================================

#[test]
fn serial_irrevocable_retries_directly_under_quiescence() {
    init_tracing();
    let engine = engine();
    let a = engine.allocate(1).unwrap();
    let counter = engine.allocate(1).unwrap();
    let stop = Arc::new(AtomicBool::new(false));
    let background_commits = Arc::new(AtomicU64::new(0));

    let background = {
        let engine = Arc::clone(&engine);
        let stop = Arc::clone(&stop);
        let commits = Arc::clone(&background_commits);
        thread::spawn(move || {
            let mut handle = engine.register_thread().unwrap();
            while !stop.load(Ordering::SeqCst) {
                let outcome = handle
                    .run_transactional(TxAttributes::default(), |tx| {
                        let n = tx.load(counter)?;
                        tx.store(counter, n + 1)?;
                        Ok::<_, TxError<()>>(())
                    })
                    .unwrap();
                assert!(outcome.is_committed());
                commits.fetch_add(1, Ordering::SeqCst);
            }
        })
    };
    wait_until(Duration::from_secs(5), || background_commits.load(Ordering::SeqCst) > 10);

    let mut handle = engine.register_thread().unwrap();
    let mut attempts = 0;
    let outcome = handle
        .run_operation("serial", TxAttributes::default(), |tx| {
            attempts += 1;
            tx.store(a, 1)?;
            tx.set_irrevocable(true)?;

            // Only reached on the retry, which runs without buffering
            assert_eq!(tx.status(), TxStatus::Irrevocable);
            assert_eq!(tx.irrevocable_level(), 4);
            assert_eq!(tx.manager().peek(a), Some(1));
            assert_eq!(tx.manager().quiescence().holder(), Some(tx.slot()));

            let before = tx.manager().peek(counter);
            thread::sleep(Duration::from_millis(10));
            assert_eq!(tx.manager().peek(counter), before);
            Ok::<_, TxError<()>>(attempts)
        })
        .unwrap();

    stop.store(true, Ordering::SeqCst);
    background.join().unwrap();

    assert_eq!(outcome, Outcome::Committed(2));
    let counters = handle.counters_for("serial");
    assert_eq!((counters.successful, counters.aborted), (1, 1));
    assert_eq!(engine.peek(a), Some(1));
    assert_eq!(engine.peek(counter), Some(background_commits.load(Ordering::SeqCst)));
    assert_eq!(engine.manager().quiescence().holder(), None);
}

// ============================================================================
// Clock rollover
// ============================================================================

#[test]
fn rollover_never_moves_clock_below_active_start() {
    const THREADS: usize = 4;
    const OPS: u64 = 200;

    let engine = Engine::new(small_config().with_clock_max(50)).unwrap();
    let counter = engine.allocate(1).unwrap();
    let violations = Arc::new(AtomicU64::new(0));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let violations = Arc::clone(&violations);
            thread::spawn(move || {
                let mut handle = engine.register_thread().unwrap();
                for _ in 0..OPS {
                    let outcome = handle
                        .run_transactional(TxAttributes::default(), |tx| {
                            let start = tx.start_timestamp();
                            let n = tx.load(counter)?;
                            if tx.manager().clock_now() < start {
                                violations.fetch_add(1, Ordering::SeqCst);
                            }
                            tx.store(counter, n + 1)?;
                            Ok::<_, TxError<()>>(())
                        })
                        .unwrap();
                    assert!(outcome.is_committed());
                }
            })
        })
        .collect();

    for w in workers {
        w.join().unwrap();
    }

    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert_eq!(engine.peek(counter), Some(THREADS as u64 * OPS));
    assert!(engine.rollover_count() >= 1);
    assert!(engine.clock_now() < 50 + THREADS as u64);
}
