//! Concurrency Stress Tests
//!
//! Conservation invariants under contention for every policy, plus a
//! single-threaded property check of masked stores against a model.

use crate::common::*;
use greenstm::prelude::*;
use parking_lot::Mutex;
use proptest::prelude::*;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const ACCOUNTS: usize = 8;
const INITIAL: u64 = 1_000;

fn open_bank(engine: &Arc<Engine>) -> Address {
    let base = engine.allocate(ACCOUNTS).unwrap();
    let mut handle = engine.register_thread().unwrap();
    for i in 0..ACCOUNTS {
        handle.unit_store(base.offset(i), INITIAL, FULL_MASK, None).unwrap();
    }
    base
}

fn run_bank(policy: ContentionPolicy, workers: usize, transfers: usize) {
    let engine = engine_with(policy);
    let base = open_bank(&engine);
    let stop = Arc::new(AtomicBool::new(false));
    let audits = Arc::new(Mutex::new(Vec::new()));
    let barrier = Arc::new(Barrier::new(workers + 1));

    let auditor = {
        let engine = Arc::clone(&engine);
        let stop = Arc::clone(&stop);
        let audits = Arc::clone(&audits);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let mut handle = engine.register_thread().unwrap();
            barrier.wait();
            while !stop.load(Ordering::SeqCst) {
                let outcome = handle
                    .run_operation("audit", TxAttributes::read_only(), |tx| {
                        let mut sum = 0;
                        for i in 0..ACCOUNTS {
                            sum += tx.load(base.offset(i))?;
                        }
                        Ok::<_, TxError<()>>(sum)
                    })
                    .unwrap();
                if let Outcome::Committed(sum) = outcome {
                    audits.lock().push(sum);
                }
            }
        })
    };

    let tellers: Vec<_> = (0..workers)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut handle = engine.register_thread().unwrap();
                let mut rng = rand::thread_rng();
                barrier.wait();
                for _ in 0..transfers {
                    let from = rng.gen_range(0..ACCOUNTS);
                    let to = rng.gen_range(0..ACCOUNTS);
                    let amount = rng.gen_range(1..=50);
                    handle
                        .run_operation("transfer", TxAttributes::default(), |tx| {
                            let balance = tx.load(base.offset(from))?;
                            if balance < amount {
                                return Err(TxError::Declined("insufficient funds"));
                            }
                            tx.store(base.offset(from), balance - amount)?;
                            let credit = tx.load(base.offset(to))?;
                            tx.store(base.offset(to), credit + amount)?;
                            Ok(())
                        })
                        .unwrap();
                }
                handle.counters_for("transfer")
            })
        })
        .collect();

    let mut total = OperationCounters::default();
    for t in tellers {
        total.merge(&t.join().unwrap());
    }
    stop.store(true, Ordering::SeqCst);
    auditor.join().unwrap();

    assert_eq!(total.total(), (workers * transfers) as u64, "policy {:?}", policy);
    let expected = INITIAL * ACCOUNTS as u64;
    for sum in audits.lock().iter() {
        assert_eq!(*sum, expected, "policy {:?} saw a torn snapshot", policy);
    }
    let final_sum: u64 = (0..ACCOUNTS)
        .map(|i| engine.peek(base.offset(i)).unwrap())
        .sum();
    assert_eq!(final_sum, expected, "policy {:?}", policy);
}

#[test]
fn bank_transfers_conserve_money_under_suicide() {
    init_tracing();
    run_bank(ContentionPolicy::Suicide, 4, 500);
}

#[test]
fn bank_transfers_conserve_money_under_delay() {
    run_bank(ContentionPolicy::Delay, 4, 500);
}

#[test]
fn bank_transfers_conserve_money_under_timestamp() {
    run_bank(ContentionPolicy::Timestamp, 4, 500);
}

#[test]
fn bank_transfers_conserve_money_under_karma() {
    run_bank(ContentionPolicy::Karma, 4, 500);
}

#[test]
fn every_registered_slot_can_be_reused() {
    let engine = engine();
    let counter = engine.allocate(1).unwrap();
    for _ in 0..3 {
        let workers: Vec<_> = (0..small_config().max_threads)
            .map(|_| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    let mut handle = engine.register_thread().unwrap();
                    handle
                        .run_transactional(TxAttributes::default(), |tx| {
                            let n = tx.load(counter)?;
                            tx.store(counter, n + 1)?;
                            Ok::<_, TxError<()>>(())
                        })
                        .unwrap()
                })
            })
            .collect();
        for w in workers {
            assert!(w.join().unwrap().is_committed());
        }
    }
    assert_eq!(engine.peek(counter), Some(3 * small_config().max_threads as u64));
    assert_eq!(engine.thread_count(), 0);
}

// ============================================================================
// Masked stores against a model
// ============================================================================

proptest! {
    #[test]
    fn masked_stores_match_model(
        ops in prop::collection::vec((0usize..4, any::<u64>(), any::<u64>(), any::<bool>()), 1..40)
    ) {
        let engine = engine();
        let base = engine.allocate(4).unwrap();
        let mut handle = engine.register_thread().unwrap();
        let mut model = [0u64; 4];

        let tx = handle.transaction();
        tx.start(TxAttributes::default()).unwrap();
        for (slot, value, mask, commit) in ops {
            tx.store_masked(base.offset(slot), value, mask).unwrap();
            model[slot] = (model[slot] & !mask) | (value & mask);
            prop_assert_eq!(tx.load(base.offset(slot)).unwrap(), model[slot]);
            if commit {
                tx.commit().unwrap();
                prop_assert_eq!(engine.peek(base.offset(slot)), Some(model[slot]));
                tx.start(TxAttributes::default()).unwrap();
            }
        }
        tx.commit().unwrap();

        for (i, expected) in model.iter().enumerate() {
            prop_assert_eq!(engine.peek(base.offset(i)), Some(*expected));
        }
    }
}
