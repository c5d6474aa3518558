// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::CacheMetrics;

use crate::cache::CacheLevel;
use std::time::Instant;

impl CacheMetrics {
    /// Helper to record one per-level cache operation
    pub fn record(&self, level: CacheLevel, operation: &str) {
        self.operations
            .with_label_values(&[level.as_str(), operation])
            .inc();
    }

    /// Helper to record several identical per-level operations at once
    pub fn record_n(&self, level: CacheLevel, operation: &str, count: u64) {
        if count > 0 {
            self.operations
                .with_label_values(&[level.as_str(), operation])
                .inc_by(count as f64);
        }
    }

    /// Helper to record manager operation latency
    pub fn observe_since(&self, operation: &str, started: Instant) {
        self.duration
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());
    }

    pub fn update_entries(&self, level: CacheLevel, count: usize) {
        self.entries
            .with_label_values(&[level.as_str()])
            .set(count as f64);
    }
}
