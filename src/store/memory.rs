// Bounded in-process store (L1)
// Author: kelexine (https://github.com/kelexine)

use super::CacheBackend;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Which entry to drop when the store is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently used
    #[default]
    Lru,
    /// Least frequently used, ties broken by recency
    Lfu,
}

impl std::str::FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            _ => Err(format!("Unknown eviction policy: {}", s)),
        }
    }
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionPolicy::Lru => write!(f, "lru"),
            EvictionPolicy::Lfu => write!(f, "lfu"),
        }
    }
}

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
    access_count: u64,
    size: usize,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }
}

/// Process-local byte store bounded by entry count and total size.
///
/// Recency is tracked by the underlying `LruCache`; frequency by a per-entry
/// access counter. Expired entries are dropped lazily on read and eagerly by
/// [`CacheBackend::purge_expired`] or when space is needed.
pub struct MemoryStore {
    entries: Mutex<LruCache<String, MemoryEntry>>,
    max_entries: usize,
    max_bytes: usize,
    policy: EvictionPolicy,
    bytes_used: AtomicUsize,
    evicted: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new(max_entries: usize, max_bytes: usize, policy: EvictionPolicy) -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            max_entries: max_entries.max(1),
            max_bytes: max_bytes.max(1),
            policy,
            bytes_used: AtomicUsize::new(0),
            evicted: Mutex::new(Vec::new()),
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used.load(Ordering::Relaxed)
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn remove_locked(&self, entries: &mut LruCache<String, MemoryEntry>, key: &str) -> bool {
        match entries.pop(key) {
            Some(entry) => {
                self.bytes_used.fetch_sub(entry.size, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    fn purge_expired_locked(&self, entries: &mut LruCache<String, MemoryEntry>) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.remove_locked(entries, key);
        }
        expired.len()
    }

    fn pick_victim(&self, entries: &LruCache<String, MemoryEntry>) -> Option<String> {
        match self.policy {
            EvictionPolicy::Lru => entries.peek_lru().map(|(k, _)| k.clone()),
            // iter() runs most- to least-recent; reversing makes min_by_key
            // settle ties on the least recently used entry.
            EvictionPolicy::Lfu => entries
                .iter()
                .rev()
                .min_by_key(|(_, e)| e.access_count)
                .map(|(k, _)| k.clone()),
        }
    }

    /// Make room for `incoming` bytes under a new key.
    fn make_room(&self, entries: &mut LruCache<String, MemoryEntry>, incoming: usize) {
        let over = |entries: &LruCache<String, MemoryEntry>, used: usize| {
            entries.len() >= self.max_entries || used + incoming > self.max_bytes
        };

        if !over(entries, self.bytes_used()) {
            return;
        }

        let purged = self.purge_expired_locked(entries);
        if purged > 0 {
            debug!("Purged {} expired L1 entries under memory pressure", purged);
        }

        let mut evicted = Vec::new();
        while over(entries, self.bytes_used()) {
            let Some(victim) = self.pick_victim(entries) else {
                break;
            };
            self.remove_locked(entries, &victim);
            evicted.push(victim);
        }

        if !evicted.is_empty() {
            debug!("Evicted {} L1 entries ({})", evicted.len(), self.policy);
            self.evicted.lock().extend(evicted);
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        let expired = match entries.get_mut(key) {
            None => return Ok(None),
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => {
                entry.access_count += 1;
                return Ok(Some(entry.value.clone()));
            }
        };

        if expired {
            self.remove_locked(&mut entries, key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let size = key.len() + value.len();
        if size > self.max_bytes {
            return Err(CacheError::CapacityExceeded {
                size,
                limit: self.max_bytes,
            });
        }

        let mut entries = self.entries.lock();

        // An overwrite keeps the frequency history of the key.
        let access_count = entries.peek(key).map(|e| e.access_count).unwrap_or(0);
        self.remove_locked(&mut entries, key);
        self.make_room(&mut entries, size);

        entries.put(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
                access_count,
                size,
            },
        );
        self.bytes_used.fetch_add(size, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock();
        Ok(self.remove_locked(&mut entries, key))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let entries = self.entries.lock();
        Ok(entries
            .peek(key)
            .map(|e| !e.is_expired(Instant::now()))
            .unwrap_or(false))
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        self.bytes_used.store(0, Ordering::Relaxed);
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let entries = self.entries.lock();
        let now = Instant::now();
        Ok(entries.iter().filter(|(_, e)| !e.is_expired(now)).count())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let mut entries = self.entries.lock();
        Ok(self.purge_expired_locked(&mut entries))
    }

    fn drain_evictions(&self) -> Vec<String> {
        std::mem::take(&mut *self.evicted.lock())
    }
}
