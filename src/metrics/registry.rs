// Prometheus metrics registry and collectors
// Author: kelexine (https://github.com/kelexine)

use crate::error::{CacheError, Result};
use prometheus::{
    register_counter_vec_with_registry, register_gauge_vec_with_registry,
    register_histogram_vec_with_registry, CounterVec, Encoder, GaugeVec, HistogramOpts,
    HistogramVec, Opts, Registry, TextEncoder,
};

/// Prometheus collectors for one cache manager.
///
/// Owns its registry, so several managers (or tests) never collide on
/// metric registration.
#[derive(Clone)]
pub struct CacheMetrics {
    registry: Registry,

    // ============================================================================
    // CACHE METRICS
    // ============================================================================
    /// Cache operations per level
    pub operations: CounterVec,

    /// Manager-level operation latency
    pub duration: HistogramVec,

    /// Live entries per level
    pub entries: GaugeVec,
}

impl CacheMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("bdc".to_string()), None)?;

        let operations = register_counter_vec_with_registry!(
            Opts::new("cache_operations_total", "Total cache operations"),
            &["level", "operation"], // operation: hit, miss, set, delete, error, eviction, promotion
            registry
        )?;

        let duration = register_histogram_vec_with_registry!(
            HistogramOpts::new(
                "cache_operation_duration_seconds",
                "Cache manager operation duration in seconds"
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5, 1.0]),
            &["operation"], // operation: get, set, delete, invalidate
            registry
        )?;

        let entries = register_gauge_vec_with_registry!(
            Opts::new("cache_entries", "Current number of tracked cache entries"),
            &["level"],
            registry
        )?;

        Ok(Self {
            registry,
            operations,
            duration,
            entries,
        })
    }

    /// Gather all metrics and return as Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| CacheError::Internal(e.to_string()))
    }
}
