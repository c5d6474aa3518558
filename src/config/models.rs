//! Configuration data structures for bdc-cache.
//!
//! This module defines the schema for the application settings, including
//! the admin server, the cache levels and logging.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::cache::CacheLevel;
use crate::store::EvictionPolicy;
use serde::{Deserialize, Serialize};

/// The root configuration object for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Admin HTTP server settings (host, port, workers).
    #[serde(default)]
    pub server: ServerConfig,

    /// Cache manager and level settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the built-in admin HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The IP address or hostname the server should bind to.
    /// Default: `127.0.0.1`
    #[serde(default = "default_host")]
    pub host: String,

    /// The port number the server should listen on.
    /// Default: `8090`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads for the tokio runtime.
    /// Default: Number of logical CPU cores.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Settings for the cache manager itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied when a `set` does not specify one. `0` means no expiry.
    /// Default: `3600`
    #[serde(default = "default_ttl")]
    pub default_ttl_seconds: u64,

    /// Level lookup/write order used when a call does not name levels.
    /// Default: `["memory", "redis"]`
    #[serde(default = "default_levels")]
    pub default_levels: Vec<CacheLevel>,

    /// Hits after which a value found in a slower level is copied upward.
    /// Default: `5`
    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: u64,

    /// Number of per-key lock stripes guarding multi-level writes.
    /// Default: `64`
    #[serde(default = "default_lock_stripes")]
    pub lock_stripes: usize,

    /// Seconds between expiry sweeps. `0` disables the background task.
    /// Default: `60`
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_seconds: u64,

    /// In-process (L1) store settings.
    #[serde(default)]
    pub l1: MemoryConfig,

    /// Redis (L2) store settings.
    #[serde(default)]
    pub l2: RedisConfig,
}

/// Settings for the in-process L1 store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum number of entries held in memory.
    /// Default: `10000`
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Maximum total bytes of keys plus encoded values.
    /// Default: `67108864` (64 MiB)
    #[serde(default = "default_max_memory")]
    pub max_memory_bytes: usize,

    /// Eviction policy (`lru`, `lfu`).
    /// Default: `lru`
    #[serde(default)]
    pub eviction_policy: EvictionPolicy,
}

/// Settings for the Redis L2 store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Whether to connect to Redis at all.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Connection URL.
    /// Default: `redis://127.0.0.1:6379/0`
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Prefix applied to every key written to Redis.
    /// Default: `bdc:cache:`
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Seconds to wait for the initial connection.
    /// Default: `5`
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Retries for transient connection failures.
    /// Default: `3`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`, `compact`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default trait implementations linking to custom logic

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: default_ttl(),
            default_levels: default_levels(),
            promotion_threshold: default_promotion_threshold(),
            lock_stripes: default_lock_stripes(),
            maintenance_interval_seconds: default_maintenance_interval(),
            l1: MemoryConfig::default(),
            l2: RedisConfig::default(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_memory_bytes: default_max_memory(),
            eviction_policy: EvictionPolicy::default(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
            connect_timeout_seconds: default_connect_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Helper functions for serde defaults and shared constants
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_ttl() -> u64 {
    3600 // 1 hour
}

fn default_levels() -> Vec<CacheLevel> {
    vec![CacheLevel::Memory, CacheLevel::Redis]
}

fn default_promotion_threshold() -> u64 {
    5
}

fn default_lock_stripes() -> usize {
    64
}

fn default_maintenance_interval() -> u64 {
    60
}

fn default_max_entries() -> usize {
    10_000
}

fn default_max_memory() -> usize {
    64 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

fn default_key_prefix() -> String {
    "bdc:cache:".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
