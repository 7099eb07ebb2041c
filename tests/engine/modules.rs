//! Module and Specific Slot Tests

use crate::common::*;
use greenstm::prelude::*;
use greenstm::{ModuleContext, SpecificKey, StatsModule, StmModule, MAX_MODULES};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Default)]
struct Lifecycle {
    inits: AtomicUsize,
    exits: AtomicUsize,
    starts: AtomicUsize,
    precommits: AtomicUsize,
    commits: AtomicUsize,
    aborts: AtomicUsize,
}

impl StmModule for Lifecycle {
    fn name(&self) -> &str {
        "lifecycle"
    }

    fn on_thread_init(&self, _ctx: &mut ModuleContext<'_>) {
        self.inits.fetch_add(1, Ordering::SeqCst);
    }

    fn on_thread_exit(&self, _ctx: &mut ModuleContext<'_>) {
        self.exits.fetch_add(1, Ordering::SeqCst);
    }

    fn on_start(&self, _ctx: &mut ModuleContext<'_>) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_precommit(&self, _ctx: &mut ModuleContext<'_>) {
        self.precommits.fetch_add(1, Ordering::SeqCst);
    }

    fn on_commit(&self, _ctx: &mut ModuleContext<'_>) {
        self.commits.fetch_add(1, Ordering::SeqCst);
    }

    fn on_abort(&self, _ctx: &mut ModuleContext<'_>) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn lifecycle_hooks_follow_retry_loop() {
    let engine = engine();
    let module = Arc::new(Lifecycle::default());
    engine.register_module(module.clone()).unwrap();
    let a = engine.allocate(1).unwrap();

    let mut handle = engine.register_thread().unwrap();
    assert_eq!(module.inits.load(Ordering::SeqCst), 1);

    let mut attempts = 0;
    handle
        .run_transactional(TxAttributes::default(), |tx| {
            attempts += 1;
            tx.store(a, attempts)?;
            if attempts == 1 {
                return Err(tx.abort(AbortReason::Explicit).into());
            }
            Ok::<_, TxError<()>>(())
        })
        .unwrap();

    assert_eq!(module.starts.load(Ordering::SeqCst), 2);
    assert_eq!(module.aborts.load(Ordering::SeqCst), 1);
    assert_eq!(module.precommits.load(Ordering::SeqCst), 1);
    assert_eq!(module.commits.load(Ordering::SeqCst), 1);

    handle.exit();
    assert_eq!(module.exits.load(Ordering::SeqCst), 1);
}

#[test]
fn module_registration_is_bounded() {
    let engine = engine();
    for _ in 0..MAX_MODULES {
        engine.register_module(Arc::new(Lifecycle::default())).unwrap();
    }
    let err = engine.register_module(Arc::new(Lifecycle::default())).unwrap_err();
    assert!(err.is_resource_exhausted());
}

struct Tagger {
    key: SpecificKey,
}

impl StmModule for Tagger {
    fn on_thread_init(&self, ctx: &mut ModuleContext<'_>) {
        let slot = ctx.slot().as_u32();
        ctx.set_specific(self.key, Box::new(slot));
    }
}

#[test]
fn specific_slots_are_per_thread() {
    let engine = engine();
    let key = engine.create_specific().unwrap();
    engine.register_module(Arc::new(Tagger { key })).unwrap();

    let workers: Vec<_> = (0..3)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut handle = engine.register_thread().unwrap();
                let slot = handle.slot().as_u32();
                let tx = handle.transaction();
                assert_eq!(tx.specific::<u32>(key), Some(&slot));
                tx.set_specific(key, Box::new(slot + 100));
                assert_eq!(tx.specific::<u32>(key), Some(&(slot + 100)));
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
}

#[test]
fn stats_module_folds_on_exit() {
    const THREADS: usize = 3;
    const OPS: u64 = 50;

    let engine = engine();
    let stats = StatsModule::register(&engine).unwrap();
    let counter = engine.allocate(1).unwrap();

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut handle = engine.register_thread().unwrap();
                for _ in 0..OPS {
                    handle
                        .run_transactional(TxAttributes::default(), |tx| {
                            let n = tx.load(counter)?;
                            tx.store(counter, n + 1)?;
                            Ok::<_, TxError<()>>(())
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    let global = stats.global_stats();
    assert_eq!(global.commits, THREADS as u64 * OPS);
    assert_eq!(global.retries, 0);
    assert_eq!(global.retries_cnt, global.commits);
    assert!(global.retries_min <= global.retries_max);
}
