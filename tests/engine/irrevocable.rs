//! Irrevocability Tests
//!
//! Plain and serial irrevocable transactions, the process-wide flag and the
//! global-lock backend.

use crate::common::*;
use greenstm::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn irrevocable_transaction_cannot_be_killed() {
    let engine = engine_with(ContentionPolicy::Aggressive);
    let a = engine.allocate(1).unwrap();
    let mut irrevocable = engine.register_thread().unwrap();
    let mut other = engine.register_thread().unwrap();

    let tx = irrevocable.transaction();
    tx.start(TxAttributes::default()).unwrap();
    tx.load(a).unwrap();
    tx.set_irrevocable(false).unwrap();
    assert_eq!(tx.status(), TxStatus::Irrevocable);

    // An aggressive writer must yield to an irrevocable lock owner
    let w = other.transaction();
    w.start(TxAttributes::default()).unwrap();
    w.store(a, 1).unwrap();
    assert!(w.commit().unwrap_err().reason().is_conflict());

    let tx = irrevocable.transaction();
    tx.store(a, 2).unwrap();
    tx.commit().unwrap();
    assert_eq!(engine.peek(a), Some(2));
}

#[test]
fn second_irrevocable_request_rolls_back() {
    let engine = engine();
    let mut first = engine.register_thread().unwrap();
    let mut second = engine.register_thread().unwrap();

    first.transaction().start(TxAttributes::default()).unwrap();
    first.transaction().set_irrevocable(false).unwrap();

    let tx = second.transaction();
    tx.start(TxAttributes::default()).unwrap();
    let abort = tx.set_irrevocable(false).unwrap_err();
    assert_eq!(abort.reason(), AbortReason::Irrevocable);
    assert_eq!(tx.irrevocable_level(), 1);

    first.transaction().commit().unwrap();
    // The retry picks up the flag before becoming active
    second.transaction().restart().unwrap();
    assert_eq!(second.transaction().irrevocable_level(), 3);
    second.transaction().commit().unwrap();
    assert_eq!(engine.manager().irrevocable_gate().holder(), None);
}

#[test]
fn irrevocable_after_stale_read_fails_validation() {
    let engine = engine();
    let a = engine.allocate(1).unwrap();
    let mut reader = engine.register_thread().unwrap();
    let mut writer = engine.register_thread().unwrap();

    let tx = reader.transaction();
    tx.start(TxAttributes::default()).unwrap();
    tx.load(a).unwrap();

    writer.unit_store(a, 3, FULL_MASK, None).unwrap();

    let abort = reader.transaction().set_irrevocable(false).unwrap_err();
    assert_eq!(abort.reason(), AbortReason::Validate);
    assert_eq!(engine.manager().irrevocable_gate().holder(), None);
}

#[test]
fn serial_request_revalidates_reads_after_quiescence() {
    init_tracing();
    let engine = engine();
    let a = engine.allocate(1).unwrap();
    let mut writer = engine.register_thread().unwrap();
    let serial = engine.register_thread().unwrap();
    let serial_slot = serial.slot();

    // Buffered write that stays in flight until the gate closes
    let w = writer.transaction();
    w.start(TxAttributes::default()).unwrap();
    w.store(a, 10).unwrap();

    let worker = thread::spawn(move || {
        let mut handle = serial;
        let mut seen = Vec::new();
        let outcome = handle
            .run_operation("serial_increment", TxAttributes::default(), |tx| {
                let n = tx.load(a)?;
                seen.push((n, tx.abort_reason()));
                tx.set_irrevocable(true)?;
                tx.store(a, n + 1)?;
                Ok::<_, TxError<()>>(n)
            })
            .unwrap();
        (outcome, seen, handle.counters_for("serial_increment"))
    });

    wait_until(Duration::from_secs(5), || {
        engine.manager().quiescence().holder() == Some(serial_slot)
    });
    writer.transaction().commit().unwrap();

    let (outcome, seen, counters) = worker.join().unwrap();
    assert_eq!(seen, vec![(0, None), (10, Some(AbortReason::Validate))]);
    assert_eq!(outcome, Outcome::Committed(10));
    assert_eq!((counters.successful, counters.aborted), (1, 1));
    assert_eq!(engine.peek(a), Some(11));
    assert_eq!(engine.manager().quiescence().holder(), None);
    assert_eq!(engine.manager().irrevocable_gate().holder(), None);
}

#[test]
fn global_lock_backend_serializes_workers() {
    const THREADS: usize = 4;
    const OPS: u64 = 250;

    let engine = Engine::new(small_config().with_backend(Backend::GlobalLock)).unwrap();
    let counter = engine.allocate(1).unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut handle = engine.register_thread().unwrap();
                barrier.wait();
                for _ in 0..OPS {
                    let outcome = handle
                        .run_operation("inc", TxAttributes::default(), |tx| {
                            let n = tx.load(counter)?;
                            tx.store(counter, n + 1)?;
                            Ok::<_, TxError<()>>(())
                        })
                        .unwrap();
                    assert!(outcome.is_committed());
                }
                handle.counters_for("inc")
            })
        })
        .collect();

    for w in workers {
        let counters = w.join().unwrap();
        assert_eq!(counters.successful, OPS);
        assert_eq!(counters.aborted, 0);
    }
    assert_eq!(engine.peek(counter), Some(THREADS as u64 * OPS));
}

#[test]
fn global_lock_backend_undoes_declined_operation() {
    let engine = Engine::new(small_config().with_backend(Backend::GlobalLock)).unwrap();
    let a = engine.allocate(1).unwrap();
    let mut handle = engine.register_thread().unwrap();

    let outcome: Outcome<(), &str> = handle
        .run_transactional(TxAttributes::default(), |tx| {
            tx.store(a, 10)?;
            Err(TxError::Declined("changed my mind"))
        })
        .unwrap();
    assert!(outcome.is_failed());
    assert_eq!(engine.peek(a), Some(0));
}
