//! Statistics module
//!
//! Counts commits and retries per thread in a transaction-specific slot and
//! folds them into process-wide totals when the thread exits.

use crate::engine::Engine;
use greenstm_concurrency::{ModuleContext, SpecificKey, StmModule, Transaction};
use greenstm_core::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Commit and retry accounting
///
/// `retries_*` describe the number of aborts that preceded each commit;
/// `retries_cnt` is the number of commits they were sampled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadStats {
    /// Committed transactions
    pub commits: u64,
    /// Aborts since the last commit
    pub retries: u64,
    /// Sum of the retries before each commit
    pub retries_acc: u64,
    /// Commits sampled into `retries_acc`
    pub retries_cnt: u64,
    /// Fewest retries before a commit
    pub retries_min: u64,
    /// Most retries before a commit
    pub retries_max: u64,
}

impl Default for ThreadStats {
    fn default() -> Self {
        ThreadStats {
            commits: 0,
            retries: 0,
            retries_acc: 0,
            retries_cnt: 0,
            retries_min: u64::MAX,
            retries_max: 0,
        }
    }
}

impl ThreadStats {
    fn record_commit(&mut self) {
        self.commits += 1;
        self.retries_acc += self.retries;
        self.retries_cnt += 1;
        self.retries_min = self.retries_min.min(self.retries);
        self.retries_max = self.retries_max.max(self.retries);
        self.retries = 0;
    }

    /// Mean retries per commit, 0 without commits
    pub fn avg_retries(&self) -> f64 {
        if self.retries_cnt == 0 {
            0.0
        } else {
            self.retries_acc as f64 / self.retries_cnt as f64
        }
    }
}

#[derive(Debug)]
struct GlobalStats {
    commits: AtomicU64,
    retries: AtomicU64,
    retries_acc: AtomicU64,
    retries_cnt: AtomicU64,
    retries_min: AtomicU64,
    retries_max: AtomicU64,
}

/// Module collecting [`ThreadStats`]
#[derive(Debug)]
pub struct StatsModule {
    key: SpecificKey,
    global: GlobalStats,
}

impl StatsModule {
    /// Reserve a specific slot and register with `engine`
    ///
    /// Threads registered before this call are not counted.
    pub fn register(engine: &Arc<Engine>) -> Result<Arc<Self>> {
        let key = engine.create_specific()?;
        let module = Arc::new(StatsModule {
            key,
            global: GlobalStats {
                commits: AtomicU64::new(0),
                retries: AtomicU64::new(0),
                retries_acc: AtomicU64::new(0),
                retries_cnt: AtomicU64::new(0),
                retries_min: AtomicU64::new(u64::MAX),
                retries_max: AtomicU64::new(0),
            },
        });
        engine.register_module(module.clone())?;
        Ok(module)
    }

    /// Statistics of the thread owning `tx`
    pub fn local_stats(&self, tx: &Transaction) -> Option<ThreadStats> {
        tx.specific::<ThreadStats>(self.key).copied()
    }

    /// Totals of every thread that has exited
    pub fn global_stats(&self) -> ThreadStats {
        let g = &self.global;
        ThreadStats {
            commits: g.commits.load(Ordering::Acquire),
            retries: g.retries.load(Ordering::Acquire),
            retries_acc: g.retries_acc.load(Ordering::Acquire),
            retries_cnt: g.retries_cnt.load(Ordering::Acquire),
            retries_min: g.retries_min.load(Ordering::Acquire),
            retries_max: g.retries_max.load(Ordering::Acquire),
        }
    }

    fn fold(&self, stats: &ThreadStats) {
        let g = &self.global;
        g.commits.fetch_add(stats.commits, Ordering::AcqRel);
        g.retries.fetch_add(stats.retries, Ordering::AcqRel);
        g.retries_acc.fetch_add(stats.retries_acc, Ordering::AcqRel);
        g.retries_cnt.fetch_add(stats.retries_cnt, Ordering::AcqRel);
        g.retries_min.fetch_min(stats.retries_min, Ordering::AcqRel);
        g.retries_max.fetch_max(stats.retries_max, Ordering::AcqRel);
    }
}

impl StmModule for StatsModule {
    fn name(&self) -> &str {
        "stats"
    }

    fn on_thread_init(&self, ctx: &mut ModuleContext<'_>) {
        ctx.set_specific(self.key, Box::new(ThreadStats::default()));
    }

    fn on_thread_exit(&self, ctx: &mut ModuleContext<'_>) {
        if let Some(stats) = ctx.specific::<ThreadStats>(self.key).copied() {
            self.fold(&stats);
        }
        ctx.take_specific(self.key);
    }

    fn on_commit(&self, ctx: &mut ModuleContext<'_>) {
        if let Some(stats) = ctx.specific_mut::<ThreadStats>(self.key) {
            stats.record_commit();
        }
    }

    fn on_abort(&self, ctx: &mut ModuleContext<'_>) {
        if let Some(stats) = ctx.specific_mut::<ThreadStats>(self.key) {
            stats.retries += 1;
        }
    }
}
