//! Cache data model: levels, per-key entries, write options and statistics.

// Author: kelexine (https://github.com/kelexine)

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A cache tier. Ordering follows lookup priority: fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLevel {
    /// L1: process-local memory.
    #[serde(alias = "l1", alias = "l1_memory")]
    Memory,
    /// L2: remote Redis.
    #[serde(alias = "l2", alias = "l2_redis")]
    Redis,
    /// L3: backing database. Only used when a backend is registered for it.
    #[serde(alias = "l3", alias = "l3_database")]
    Database,
}

impl CacheLevel {
    pub const ALL: [CacheLevel; 3] = [CacheLevel::Memory, CacheLevel::Redis, CacheLevel::Database];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheLevel::Memory => "l1_memory",
            CacheLevel::Redis => "l2_redis",
            CacheLevel::Database => "l3_database",
        }
    }
}

impl fmt::Display for CacheLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "l1" | "l1_memory" => Ok(CacheLevel::Memory),
            "redis" | "l2" | "l2_redis" => Ok(CacheLevel::Redis),
            "database" | "l3" | "l3_database" => Ok(CacheLevel::Database),
            _ => Err(format!("Unknown cache level: {}", s)),
        }
    }
}

/// Bookkeeping for one logical key, independent of where its bytes live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Time to live in whole seconds (rounded up), for display.
    pub ttl: Option<u64>,
    /// Exact time to live in milliseconds; expiry is computed from this.
    pub ttl_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub size_bytes: usize,
    pub tags: BTreeSet<String>,
    /// Levels that acknowledged the last write of this key.
    pub levels: BTreeSet<CacheLevel>,
    /// Bumped on every `set`; promotion only proceeds against the version it read.
    pub version: u64,
}

impl CacheEntry {
    pub fn new(key: &str, ttl: Option<Duration>, size_bytes: usize, tags: BTreeSet<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.to_string(),
            ttl: ttl.map(|d| d.as_millis().div_ceil(1000) as u64),
            ttl_ms: ttl.map(|d| (d.as_millis() as u64).max(1)),
            created_at: now,
            last_accessed: now,
            access_count: 0,
            size_bytes,
            tags,
            levels: BTreeSet::new(),
            version: 0,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.ttl_ms
            .map(|ms| self.created_at + ChronoDuration::milliseconds(ms as i64))
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at().map(|exp| Utc::now() >= exp).unwrap_or(false)
    }

    /// Remaining lifetime, used when a promotion rewrites the value elsewhere.
    /// `None` means no expiry; `Some(ZERO)` means already expired.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at().map(|exp| {
            (exp - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
        })
    }

    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
        self.access_count += 1;
    }
}

/// Options for a single `set` call.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub levels: Option<Vec<CacheLevel>>,
    pub tags: Vec<String>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn ttl_secs(self, secs: u64) -> Self {
        self.ttl(Duration::from_secs(secs))
    }

    pub fn levels(mut self, levels: &[CacheLevel]) -> Self {
        self.levels = Some(levels.to_vec());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// Counters for a single level.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub evictions: u64,
    pub promotions: u64,
}

/// Snapshot of cache statistics across all levels.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub levels: BTreeMap<CacheLevel, LevelStats>,
    /// `get` calls answered by some level.
    pub total_hits: u64,
    /// `get` calls no level could answer.
    pub total_misses: u64,
    pub hit_rate: f64,
    pub tracked_keys: usize,
    pub tags: usize,
}

impl CacheStats {
    pub fn level(&self, level: CacheLevel) -> LevelStats {
        self.levels.get(&level).cloned().unwrap_or_default()
    }
}

/// Outcome of a warming pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmReport {
    pub loaded: usize,
    pub skipped: usize,
    pub failed: usize,
}
