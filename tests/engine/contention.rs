//! Contention Manager Tests
//!
//! Pairwise consistency of every policy and conflict handling through the
//! engine for each of them.

use crate::common::*;
use greenstm::prelude::*;
use greenstm::{ConflictKind, ContentionManager, Decision, SlotId, TxMeta};
use std::sync::{Arc, Barrier};
use std::thread;

fn all_metas() -> Vec<TxMeta> {
    let mut metas = Vec::new();
    for slot in 0..3u32 {
        for start in [0u64, 5, 9] {
            for (reads, writes) in [(0usize, 0usize), (2, 0), (0, 1), (4, 3)] {
                metas.push(TxMeta {
                    slot: SlotId::new(slot),
                    start,
                    reads,
                    writes,
                });
            }
        }
    }
    metas
}

// ============================================================================
// Pairwise consistency
// ============================================================================

#[test]
fn no_policy_lets_both_parties_kill() {
    let metas = all_metas();
    for policy in ContentionPolicy::ALL {
        if policy == ContentionPolicy::Aggressive {
            continue;
        }
        for x in &metas {
            for y in metas.iter().filter(|y| y.slot != x.slot) {
                for kind in [ConflictKind::ReadWrite, ConflictKind::WriteWrite] {
                    let xy = policy.decide(x, y, kind);
                    let yx = policy.decide(y, x, kind);
                    assert!(
                        !(xy == Decision::KillOther && yx == Decision::KillOther),
                        "{:?}: {:?} vs {:?} both kill",
                        policy,
                        x,
                        y
                    );
                }
            }
        }
    }
}

#[test]
fn ordering_policies_pick_exactly_one_winner() {
    let metas = all_metas();
    for policy in [ContentionPolicy::Timestamp, ContentionPolicy::Karma] {
        for x in &metas {
            for y in metas.iter().filter(|y| y.slot != x.slot) {
                let xy = policy.decide(x, y, ConflictKind::WriteWrite);
                let yx = policy.decide(y, x, ConflictKind::WriteWrite);
                assert_ne!(xy.yields(), yx.yields(), "{:?}: {:?} vs {:?}", policy, x, y);
            }
        }
    }
}

#[test]
fn karma_prefers_more_work() {
    let busy = TxMeta {
        slot: SlotId::new(1),
        start: 9,
        reads: 1,
        writes: 3,
    };
    let idle = TxMeta {
        slot: SlotId::new(0),
        start: 0,
        reads: 5,
        writes: 0,
    };
    let policy = ContentionPolicy::Karma;
    assert_eq!(policy.decide(&busy, &idle, ConflictKind::ReadWrite), Decision::KillOther);
    assert_eq!(policy.decide(&idle, &busy, ConflictKind::ReadWrite), Decision::KillSelf);
}

#[test]
fn delay_policy_marks_restart_delay() {
    let engine = engine_with(ContentionPolicy::Delay);
    let a = engine.allocate(1).unwrap();
    let mut holder = engine.register_thread().unwrap();
    let mut writer = engine.register_thread().unwrap();

    let h = holder.transaction();
    h.start(TxAttributes::default().with_visible_reads(true)).unwrap();
    h.load(a).unwrap();

    let w = writer.transaction();
    w.start(TxAttributes::default()).unwrap();
    w.store(a, 1).unwrap();
    assert!(w.commit().unwrap_err().reason().is_conflict());

    // Holder finishes; the delayed restart then goes through
    holder.transaction().commit().unwrap();
    let w = writer.transaction();
    w.restart().unwrap();
    w.store(a, 1).unwrap();
    w.commit().unwrap();
    assert_eq!(engine.peek(a), Some(1));
}

// ============================================================================
// Every policy makes progress
// ============================================================================

#[test]
fn every_policy_completes_contended_increments() {
    const THREADS: usize = 4;
    const OPS: u64 = 100;

    for policy in ContentionPolicy::ALL {
        let engine = engine_with(policy);
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

        let mut total = OperationCounters::default();
        for w in workers {
            total.merge(&w.join().unwrap());
        }
        assert_eq!(total.successful, THREADS as u64 * OPS, "{}", policy.name());
        assert_eq!(total.failed, 0);
        assert_eq!(engine.peek(counter), Some(THREADS as u64 * OPS), "{}", policy.name());
    }
}
