// Per-level hit/miss/write counters
// Author: kelexine (https://github.com/kelexine)

use super::models::{CacheLevel, CacheStats, LevelStats};
use crate::metrics::CacheMetrics;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter kinds tracked for every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Hit,
    Miss,
    Set,
    Delete,
    Error,
    Eviction,
    Promotion,
}

impl Counter {
    const COUNT: usize = 7;

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Counter::Hit => "hit",
            Counter::Miss => "miss",
            Counter::Set => "set",
            Counter::Delete => "delete",
            Counter::Error => "error",
            Counter::Eviction => "eviction",
            Counter::Promotion => "promotion",
        }
    }
}

#[derive(Default)]
struct LevelCounters {
    counters: [AtomicU64; Counter::COUNT],
}

impl LevelCounters {
    fn snapshot(&self) -> LevelStats {
        let load = |c: Counter| self.counters[c.index()].load(Ordering::Relaxed);
        LevelStats {
            hits: load(Counter::Hit),
            misses: load(Counter::Miss),
            sets: load(Counter::Set),
            deletes: load(Counter::Delete),
            errors: load(Counter::Error),
            evictions: load(Counter::Eviction),
            promotions: load(Counter::Promotion),
        }
    }
}

/// Lock-free statistics shared by all request tasks.
///
/// Every increment is mirrored into the Prometheus collectors when a
/// [`CacheMetrics`] is attached.
pub struct StatsCollector {
    levels: [LevelCounters; 3],
    total_hits: AtomicU64,
    total_misses: AtomicU64,
    metrics: Option<CacheMetrics>,
}

impl StatsCollector {
    pub fn new(metrics: Option<CacheMetrics>) -> Self {
        Self {
            levels: Default::default(),
            total_hits: AtomicU64::new(0),
            total_misses: AtomicU64::new(0),
            metrics,
        }
    }

    fn slot(level: CacheLevel) -> usize {
        match level {
            CacheLevel::Memory => 0,
            CacheLevel::Redis => 1,
            CacheLevel::Database => 2,
        }
    }

    pub fn metrics(&self) -> Option<&CacheMetrics> {
        self.metrics.as_ref()
    }

    pub fn incr(&self, level: CacheLevel, counter: Counter) {
        self.add(level, counter, 1);
    }

    pub fn add(&self, level: CacheLevel, counter: Counter, n: u64) {
        if n == 0 {
            return;
        }
        self.levels[Self::slot(level)].counters[counter.index()].fetch_add(n, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.record_n(level, counter.as_str(), n);
        }
    }

    /// Outcome of one whole `get` call across levels.
    pub fn record_lookup(&self, hit: bool) {
        if hit {
            self.total_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self, tracked_keys: usize, tags: usize) -> CacheStats {
        let levels: BTreeMap<CacheLevel, LevelStats> = CacheLevel::ALL
            .iter()
            .map(|&level| (level, self.levels[Self::slot(level)].snapshot()))
            .collect();

        let total_hits = self.total_hits.load(Ordering::Relaxed);
        let total_misses = self.total_misses.load(Ordering::Relaxed);
        let lookups = total_hits + total_misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            total_hits as f64 / lookups as f64
        };

        CacheStats {
            levels,
            total_hits,
            total_misses,
            hit_rate,
            tracked_keys,
            tags,
        }
    }

    pub fn reset(&self) {
        for level in &self.levels {
            for counter in &level.counters {
                counter.store(0, Ordering::Relaxed);
            }
        }
        self.total_hits.store(0, Ordering::Relaxed);
        self.total_misses.store(0, Ordering::Relaxed);
    }
}
