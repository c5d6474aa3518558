// Cache manager - coordinates levels, metadata, promotion and invalidation
// Author: kelexine (https://github.com/kelexine)

use super::keys::glob_to_regex;
use super::locks::KeyLocks;
use super::metadata::MetadataTracker;
use super::models::{CacheEntry, CacheLevel, CacheStats, SetOptions, WarmReport};
use super::stats::{Counter, StatsCollector};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::metrics::CacheMetrics;
use crate::serializer;
use crate::store::{CacheBackend, MemoryStore, RedisStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Tier = (CacheLevel, Arc<dyn CacheBackend>);

/// Builder for [`CacheManager`]; backends are registered per level here.
pub struct CacheManagerBuilder {
    backends: HashMap<CacheLevel, Arc<dyn CacheBackend>>,
    default_levels: Vec<CacheLevel>,
    default_ttl: Option<Duration>,
    promotion_threshold: u64,
    lock_stripes: usize,
    metrics: Option<CacheMetrics>,
}

impl Default for CacheManagerBuilder {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl CacheManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take tuning knobs from config. Backends still have to be registered.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            backends: HashMap::new(),
            default_levels: config.default_levels.clone(),
            default_ttl: (config.default_ttl_seconds > 0)
                .then(|| Duration::from_secs(config.default_ttl_seconds)),
            promotion_threshold: config.promotion_threshold,
            lock_stripes: config.lock_stripes,
            metrics: None,
        }
    }

    pub fn backend(mut self, level: CacheLevel, backend: Arc<dyn CacheBackend>) -> Self {
        self.backends.insert(level, backend);
        self
    }

    pub fn default_levels(mut self, levels: &[CacheLevel]) -> Self {
        self.default_levels = levels.to_vec();
        self
    }

    pub fn default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn promotion_threshold(mut self, hits: u64) -> Self {
        self.promotion_threshold = hits.max(1);
        self
    }

    pub fn lock_stripes(mut self, stripes: usize) -> Self {
        self.lock_stripes = stripes;
        self
    }

    pub fn metrics(mut self, metrics: CacheMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<CacheManager> {
        if self.backends.is_empty() {
            return Err(CacheError::Config("no cache backends registered".to_string()));
        }

        let mut default_levels = Vec::new();
        for level in self.default_levels {
            if !self.backends.contains_key(&level) {
                warn!("Default level {} has no backend, skipping it", level);
            } else if !default_levels.contains(&level) {
                default_levels.push(level);
            }
        }
        if default_levels.is_empty() {
            let mut registered: Vec<CacheLevel> = self.backends.keys().copied().collect();
            registered.sort();
            default_levels = registered;
        }

        Ok(CacheManager {
            backends: self.backends,
            default_levels,
            default_ttl: self.default_ttl,
            promotion_threshold: self.promotion_threshold.max(1),
            metadata: MetadataTracker::new(),
            stats: StatsCollector::new(self.metrics),
            locks: KeyLocks::new(self.lock_stripes),
            maintenance: parking_lot::Mutex::new(None),
        })
    }
}

/// Multi-level cache orchestrator.
///
/// Reads are lock-free; writes, deletes and promotions of one key are
/// serialized through a striped per-key lock so every level ends up with the
/// value of the last writer.
pub struct CacheManager {
    backends: HashMap<CacheLevel, Arc<dyn CacheBackend>>,
    default_levels: Vec<CacheLevel>,
    default_ttl: Option<Duration>,
    promotion_threshold: u64,
    metadata: MetadataTracker,
    stats: StatsCollector,
    locks: KeyLocks,
    maintenance: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl CacheManager {
    pub fn builder() -> CacheManagerBuilder {
        CacheManagerBuilder::new()
    }

    /// Build the standard L1 memory + optional L2 Redis stack from config.
    ///
    /// A Redis that cannot be reached at startup is logged and left out, so
    /// the cache still serves from memory.
    pub async fn from_config(config: &CacheConfig, metrics: Option<CacheMetrics>) -> Result<Self> {
        let l1 = MemoryStore::new(
            config.l1.max_entries,
            config.l1.max_memory_bytes,
            config.l1.eviction_policy,
        );
        info!(
            "L1 memory store: {} entries / {} bytes, {} eviction",
            config.l1.max_entries, config.l1.max_memory_bytes, config.l1.eviction_policy
        );

        let mut builder = CacheManagerBuilder::from_config(config)
            .backend(CacheLevel::Memory, Arc::new(l1));

        if config.l2.enabled {
            match RedisStore::connect(&config.l2).await {
                Ok(store) => builder = builder.backend(CacheLevel::Redis, Arc::new(store)),
                Err(e) => warn!("Redis unavailable, running without L2: {}", e),
            }
        } else {
            info!("L2 Redis store disabled");
        }

        if let Some(metrics) = metrics {
            builder = builder.metrics(metrics);
        }
        builder.build()
    }

    /// Levels that have a backend, in priority order.
    pub fn levels(&self) -> Vec<CacheLevel> {
        let mut levels: Vec<CacheLevel> = self.backends.keys().copied().collect();
        levels.sort();
        levels
    }

    pub fn default_levels(&self) -> &[CacheLevel] {
        &self.default_levels
    }

    pub fn backend(&self, level: CacheLevel) -> Option<Arc<dyn CacheBackend>> {
        self.backends.get(&level).cloned()
    }

    pub fn metrics(&self) -> Option<&CacheMetrics> {
        self.stats.metrics()
    }

    /// Split requested levels into registered tiers and unknown levels,
    /// keeping order and dropping duplicates.
    fn resolve(&self, levels: &[CacheLevel]) -> (Vec<Tier>, Vec<CacheLevel>) {
        let mut tiers: Vec<Tier> = Vec::with_capacity(levels.len());
        let mut missing = Vec::new();
        for &level in levels {
            if tiers.iter().any(|(l, _)| *l == level) || missing.contains(&level) {
                continue;
            }
            match self.backends.get(&level) {
                Some(backend) => tiers.push((level, backend.clone())),
                None => missing.push(level),
            }
        }
        (tiers, missing)
    }

    fn check_key(key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(CacheError::InvalidRequest("cache key must not be empty".to_string()));
        }
        Ok(())
    }

    fn observe(&self, operation: &str, started: Instant) {
        if let Some(metrics) = self.stats.metrics() {
            metrics.observe_since(operation, started);
        }
    }

    /// Pull capacity evictions out of a backend and reflect them in metadata.
    fn absorb_evictions(&self, level: CacheLevel, backend: &Arc<dyn CacheBackend>) {
        let evicted = backend.drain_evictions();
        if evicted.is_empty() {
            return;
        }
        self.stats.add(level, Counter::Eviction, evicted.len() as u64);
        for key in &evicted {
            self.metadata.remove_levels(key, &[level]);
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Look `key` up in the default level order.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let levels = self.default_levels.clone();
        self.get_in(key, &levels).await
    }

    /// Look `key` up in `levels`, first hit wins.
    ///
    /// A level that fails is logged and skipped. The call only errors when
    /// every level failed or the stored bytes cannot be decoded as `T`.
    pub async fn get_in<T: DeserializeOwned>(
        &self,
        key: &str,
        levels: &[CacheLevel],
    ) -> Result<Option<T>> {
        Self::check_key(key)?;
        let started = Instant::now();
        let (tiers, missing) = self.resolve(levels);
        if tiers.is_empty() {
            let level = missing.first().copied().unwrap_or(CacheLevel::Memory);
            return Err(CacheError::LevelUnavailable(level));
        }

        // Version observed before any read; promotion must still see it.
        let observed_version = self.metadata.get(key).map(|e| e.version);

        let mut missed: Vec<usize> = Vec::new();
        let mut last_error = None;

        for (idx, (level, backend)) in tiers.iter().enumerate() {
            match backend.get(key).await {
                Ok(Some(bytes)) => {
                    self.stats.incr(*level, Counter::Hit);
                    self.stats.record_lookup(true);
                    debug!("Cache hit for {} on {}", key, level);

                    let value: T = serializer::deserialize(&bytes)?;

                    // Promotion is only safe against a version we saw before
                    // reading, or one we created ourselves.
                    let (entry, expected_version) = match observed_version {
                        Some(version) => (self.metadata.touch(key), Some(version)),
                        None => {
                            let (entry, created) =
                                self.metadata
                                    .adopt(key, *level, self.default_ttl, bytes.len());
                            let version = created.then_some(entry.version);
                            (Some(entry), version)
                        }
                    };

                    if idx > 0 && !missed.is_empty() {
                        if let (Some(entry), Some(version)) = (entry, expected_version) {
                            let targets: Vec<Tier> =
                                missed.iter().map(|&i| tiers[i].clone()).collect();
                            self.maybe_promote(key, &bytes, &entry, version, &targets)
                                .await;
                        }
                    }

                    self.observe("get", started);
                    return Ok(Some(value));
                }
                Ok(None) => {
                    self.stats.incr(*level, Counter::Miss);
                    missed.push(idx);
                }
                Err(e) => {
                    warn!("Cache get for {} failed on {}: {}", key, level, e);
                    self.stats.incr(*level, Counter::Error);
                    last_error = Some(e);
                }
            }
        }

        self.stats.record_lookup(false);
        self.observe("get", started);
        debug!("Cache miss for {}", key);

        match last_error {
            Some(e) if missed.is_empty() => Err(e),
            _ => Ok(None),
        }
    }

    /// `get` that answers `default` on a miss or any failure.
    pub async fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let levels = self.default_levels.clone();
        self.get_or_in(key, default, &levels).await
    }

    pub async fn get_or_in<T: DeserializeOwned>(
        &self,
        key: &str,
        default: T,
        levels: &[CacheLevel],
    ) -> T {
        match self.get_in(key, levels).await {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                warn!("Cache get for {} failed, using default: {}", key, e);
                default
            }
        }
    }

    /// Copy a value found in a slower level into the faster levels that missed.
    async fn maybe_promote(
        &self,
        key: &str,
        bytes: &[u8],
        entry: &CacheEntry,
        expected_version: u64,
        targets: &[Tier],
    ) {
        if entry.access_count < self.promotion_threshold {
            return;
        }

        let ttl = entry.ttl_remaining();
        if ttl == Some(Duration::ZERO) {
            return;
        }

        let _guard = self.locks.lock(key).await;
        // A write between our read and this lock makes `bytes` stale
        match self.metadata.get(key) {
            Some(current) if current.version == expected_version => {}
            _ => {
                debug!("Skipping promotion of {}: entry changed", key);
                return;
            }
        }

        for (level, backend) in targets {
            match backend.set(key, bytes.to_vec(), ttl).await {
                Ok(()) => {
                    self.metadata.add_level(key, *level, expected_version);
                    self.stats.incr(*level, Counter::Promotion);
                    self.absorb_evictions(*level, backend);
                    debug!("Promoted {} into {}", key, level);
                }
                Err(e) => {
                    warn!("Promotion of {} into {} failed: {}", key, level, e);
                    self.stats.incr(*level, Counter::Error);
                }
            }
        }
    }

    /// Whether `key` is live in metadata or present in any default level.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        if let Some(entry) = self.metadata.get(key) {
            if !entry.is_expired() {
                return Ok(true);
            }
        }

        let (tiers, _) = self.resolve(&self.default_levels);
        let mut last_error = None;
        for (level, backend) in &tiers {
            match backend.exists(key).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => {
                    warn!("Cache exists for {} failed on {}: {}", key, level, e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(false),
        }
    }

    /// Metadata for `key`, if this manager tracks it.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.metadata.get(key)
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Serialize once and write to every requested level.
    ///
    /// Metadata records exactly the levels that acknowledged the write. If
    /// any level failed, the stale copy there is deleted on a best-effort
    /// basis, metadata forgets the levels it was dropped from, and
    /// `PartialWrite` is returned.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<()> {
        Self::check_key(key)?;
        if options.ttl == Some(Duration::ZERO) {
            return Err(CacheError::InvalidRequest("ttl must be positive".to_string()));
        }

        let started = Instant::now();
        let bytes = serializer::serialize(value)?;
        let ttl = options.ttl.or(self.default_ttl);
        let levels = options.levels.unwrap_or_else(|| self.default_levels.clone());
        let (tiers, mut failed) = self.resolve(&levels);
        let tags: BTreeSet<String> = options.tags.into_iter().collect();

        let _guard = self.locks.lock(key).await;

        let mut written = BTreeSet::new();
        for (level, backend) in &tiers {
            match backend.set(key, bytes.clone(), ttl).await {
                Ok(()) => {
                    written.insert(*level);
                    self.stats.incr(*level, Counter::Set);
                    self.absorb_evictions(*level, backend);
                }
                Err(e) => {
                    warn!("Cache set for {} failed on {}: {}", key, level, e);
                    self.stats.incr(*level, Counter::Error);
                    failed.push(*level);
                }
            }
        }

        if !written.is_empty() {
            self.metadata
                .record_write(key, ttl, bytes.len(), tags, written);
        }

        self.observe("set", started);
        if failed.is_empty() {
            debug!("Cached {} ({} bytes)", key, bytes.len());
            return Ok(());
        }

        // A previous value left behind in a failed level would shadow the new one
        let mut dropped = Vec::new();
        for (level, backend) in tiers.iter().filter(|(l, _)| failed.contains(l)) {
            match backend.delete(key).await {
                Ok(_) => dropped.push(*level),
                Err(e) => debug!("Could not drop stale {} from {}: {}", key, level, e),
            }
        }
        // Those levels no longer hold any copy of the key
        self.metadata.remove_levels(key, &dropped);

        Err(CacheError::PartialWrite {
            operation: "set",
            failed,
        })
    }

    /// Delete `key` from every registered level.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let levels = self.levels();
        self.delete_in(key, &levels).await
    }

    /// Delete `key` from `levels`. Returns whether any level held it.
    ///
    /// Metadata forgets only the levels whose delete succeeded, so a key
    /// stuck in an unreachable level is still found by later invalidation.
    pub async fn delete_in(&self, key: &str, levels: &[CacheLevel]) -> Result<bool> {
        Self::check_key(key)?;
        let started = Instant::now();
        // Levels without a backend cannot hold the key
        let (tiers, _) = self.resolve(levels);

        let _guard = self.locks.lock(key).await;

        let mut existed = false;
        let mut cleared = Vec::new();
        let mut failed = Vec::new();
        for (level, backend) in &tiers {
            match backend.delete(key).await {
                Ok(found) => {
                    existed |= found;
                    cleared.push(*level);
                    if found {
                        self.stats.incr(*level, Counter::Delete);
                    }
                }
                Err(e) => {
                    warn!("Cache delete for {} failed on {}: {}", key, level, e);
                    self.stats.incr(*level, Counter::Error);
                    failed.push(*level);
                }
            }
        }

        self.metadata.remove_levels(key, &cleared);
        self.observe("delete", started);

        if failed.is_empty() {
            Ok(existed)
        } else {
            Err(CacheError::PartialWrite {
                operation: "delete",
                failed,
            })
        }
    }

    /// Delete every key carrying any of `tags`. Returns how many were removed.
    pub async fn invalidate_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> Result<usize> {
        let keys = self.metadata.keys_for_tags(tags);
        let count = self.invalidate_keys(keys).await?;
        info!(
            "Invalidated {} keys for tags [{}]",
            count,
            tags.iter().map(|t| t.as_ref()).collect::<Vec<_>>().join(", ")
        );
        Ok(count)
    }

    /// Delete every tracked key matching a `*`/`?` glob.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let regex = glob_to_regex(pattern)?;
        let keys = self.metadata.keys_matching(&regex);
        let count = self.invalidate_keys(keys).await?;
        info!("Invalidated {} keys matching {}", count, pattern);
        Ok(count)
    }

    async fn invalidate_keys(&self, keys: Vec<String>) -> Result<usize> {
        let started = Instant::now();
        let levels = self.levels();
        let mut count = 0;
        let mut failed: BTreeSet<CacheLevel> = BTreeSet::new();

        for key in &keys {
            match self.delete_in(key, &levels).await {
                Ok(_) => count += 1,
                Err(CacheError::PartialWrite { failed: f, .. }) => failed.extend(f),
                Err(e) => return Err(e),
            }
        }

        self.observe("invalidate", started);
        if failed.is_empty() {
            Ok(count)
        } else {
            warn!(
                "Invalidation left {} of {} keys behind",
                keys.len() - count,
                keys.len()
            );
            Err(CacheError::PartialWrite {
                operation: "invalidate",
                failed: failed.into_iter().collect(),
            })
        }
    }

    /// Pre-populate keys that are not cached yet.
    ///
    /// `loader` is called for each missing key; `Ok(None)` means there is
    /// nothing to cache and counts as skipped.
    pub async fn warm<T, I, F, Fut, E>(
        &self,
        keys: I,
        options: SetOptions,
        mut loader: F,
    ) -> Result<WarmReport>
    where
        T: Serialize,
        I: IntoIterator<Item = String>,
        F: FnMut(String) -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, E>>,
        E: std::fmt::Display,
    {
        let mut report = WarmReport::default();

        for key in keys {
            if self.exists(&key).await.unwrap_or(false) {
                report.skipped += 1;
                continue;
            }

            match loader(key.clone()).await {
                Ok(Some(value)) => match self.set(&key, &value, options.clone()).await {
                    Ok(()) => report.loaded += 1,
                    Err(e) => {
                        warn!("Warming {} failed to store: {}", key, e);
                        report.failed += 1;
                    }
                },
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    warn!("Warming {} failed to load: {}", key, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Cache warm: {} loaded, {} skipped, {} failed",
            report.loaded, report.skipped, report.failed
        );
        Ok(report)
    }

    /// Empty every level and forget all metadata.
    pub async fn clear(&self) -> Result<()> {
        let mut failed = Vec::new();
        for level in self.levels() {
            if let Some(backend) = self.backends.get(&level) {
                if let Err(e) = backend.clear().await {
                    warn!("Clearing {} failed: {}", level, e);
                    self.stats.incr(level, Counter::Error);
                    failed.push(level);
                }
            }
        }
        self.metadata.clear();
        info!("Cache cleared");

        if failed.is_empty() {
            Ok(())
        } else {
            Err(CacheError::PartialWrite {
                operation: "clear",
                failed,
            })
        }
    }

    // ------------------------------------------------------------------------
    // Stats and maintenance
    // ------------------------------------------------------------------------

    pub fn stats(&self) -> CacheStats {
        let snapshot = self
            .stats
            .snapshot(self.metadata.len(), self.metadata.tag_count());

        if let Some(metrics) = self.stats.metrics() {
            let counts = self.metadata.count_by_level();
            for level in self.levels() {
                metrics.update_entries(level, counts.get(&level).copied().unwrap_or(0));
            }
        }
        snapshot
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Drop expired entries from backends that do not expire on their own
    /// and from metadata. Returns the number of metadata entries removed.
    pub async fn purge_expired(&self) -> Result<usize> {
        for level in self.levels() {
            if let Some(backend) = self.backends.get(&level) {
                match backend.purge_expired().await {
                    Ok(0) => {}
                    Ok(n) => debug!("Purged {} expired entries from {}", n, level),
                    Err(e) => warn!("Expiry sweep on {} failed: {}", level, e),
                }
            }
        }

        let expired = self.metadata.expired_keys();
        for key in &expired {
            self.metadata.remove(key);
        }
        if !expired.is_empty() {
            debug!("Dropped metadata for {} expired keys", expired.len());
        }
        Ok(expired.len())
    }

    /// Run [`purge_expired`](Self::purge_expired) every `interval` until
    /// [`shutdown`](Self::shutdown) or the manager is dropped.
    pub fn start_maintenance(self: &Arc<Self>, interval: Duration) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = manager.purge_expired().await {
                    warn!("Cache maintenance failed: {}", e);
                }
            }
        });

        if let Some(previous) = self.maintenance.lock().replace(handle) {
            previous.abort();
        }
        info!("Cache maintenance every {}s", interval.as_secs());
    }

    /// Stop background maintenance.
    pub fn shutdown(&self) {
        if let Some(handle) = self.maintenance.lock().take() {
            handle.abort();
            info!("Cache maintenance stopped");
        }
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        if let Some(handle) = self.maintenance.get_mut().take() {
            handle.abort();
        }
    }
}
