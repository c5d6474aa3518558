// Per-key metadata table with a tag index
// Author: kelexine (https://github.com/kelexine)

use super::models::{CacheEntry, CacheLevel};
use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Duration;

#[derive(Default)]
struct Tables {
    entries: HashMap<String, CacheEntry>,
    /// tag → keys carrying it
    tags: HashMap<String, HashSet<String>>,
    /// Versions are unique across the tracker, so a key that is deleted and
    /// written again never repeats a version.
    next_version: u64,
}

impl Tables {
    fn unindex(&mut self, key: &str, tags: &BTreeSet<String>) {
        for tag in tags {
            if let Some(keys) = self.tags.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
    }

    fn index(&mut self, key: &str, tags: &BTreeSet<String>) {
        for tag in tags {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.unindex(key, &entry.tags);
        Some(entry)
    }

    fn bump_version(&mut self) -> u64 {
        let version = self.next_version;
        self.next_version += 1;
        version
    }
}

/// Bookkeeping for every key the manager has written.
///
/// Entries and the tag index are updated under one lock so they never
/// disagree about which keys carry a tag.
#[derive(Default)]
pub struct MetadataTracker {
    tables: RwLock<Tables>,
}

impl MetadataTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed write of `key` to `levels`. Returns the new version.
    ///
    /// An overwrite resets the lifetime and tag set but keeps the access
    /// history of the key.
    pub fn record_write(
        &self,
        key: &str,
        ttl: Option<Duration>,
        size_bytes: usize,
        tags: BTreeSet<String>,
        levels: BTreeSet<CacheLevel>,
    ) -> u64 {
        let mut tables = self.tables.write();
        let mut entry = CacheEntry::new(key, ttl, size_bytes, tags);
        entry.levels = levels;
        entry.version = tables.bump_version();

        if let Some(previous) = tables.remove(key) {
            entry.access_count = previous.access_count;
            entry.last_accessed = previous.last_accessed;
        }

        let version = entry.version;
        tables.index(key, &entry.tags);
        tables.entries.insert(key.to_string(), entry);
        version
    }

    /// Register a hit on `key` and return the updated entry.
    pub fn touch(&self, key: &str) -> Option<CacheEntry> {
        let mut tables = self.tables.write();
        let entry = tables.entries.get_mut(key)?;
        entry.touch();
        Some(entry.clone())
    }

    /// Start tracking a key found in `level` that has no entry yet, and
    /// register the hit. Returns the entry and whether this call created it.
    pub fn adopt(
        &self,
        key: &str,
        level: CacheLevel,
        ttl: Option<Duration>,
        size_bytes: usize,
    ) -> (CacheEntry, bool) {
        let mut tables = self.tables.write();
        if let Some(entry) = tables.entries.get_mut(key) {
            entry.touch();
            return (entry.clone(), false);
        }

        let mut entry = CacheEntry::new(key, ttl, size_bytes, BTreeSet::new());
        entry.levels.insert(level);
        entry.version = tables.bump_version();
        entry.touch();
        tables.entries.insert(key.to_string(), entry.clone());
        (entry, true)
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.tables.read().entries.get(key).cloned()
    }

    /// Mark `level` as holding `key`, but only if no write happened since
    /// `expected_version` was read.
    pub fn add_level(&self, key: &str, level: CacheLevel, expected_version: u64) -> bool {
        let mut tables = self.tables.write();
        match tables.entries.get_mut(key) {
            Some(entry) if entry.version == expected_version => {
                entry.levels.insert(level);
                true
            }
            _ => false,
        }
    }

    /// Forget that `levels` hold `key`. The entry is dropped once no level
    /// holds it. Returns the entry as it was before the call.
    pub fn remove_levels(&self, key: &str, levels: &[CacheLevel]) -> Option<CacheEntry> {
        let mut tables = self.tables.write();
        let entry = tables.entries.get_mut(key)?;
        let before = entry.clone();
        for level in levels {
            entry.levels.remove(level);
        }
        if entry.levels.is_empty() {
            tables.remove(key);
        }
        Some(before)
    }

    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.tables.write().remove(key)
    }

    /// Keys carrying any of `tags`, without scanning the entry table.
    pub fn keys_for_tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<String> {
        let tables = self.tables.read();
        let mut keys: BTreeSet<String> = BTreeSet::new();
        for tag in tags {
            if let Some(tagged) = tables.tags.get(tag.as_ref()) {
                keys.extend(tagged.iter().cloned());
            }
        }
        keys.into_iter().collect()
    }

    pub fn keys_matching(&self, pattern: &Regex) -> Vec<String> {
        let tables = self.tables.read();
        let mut keys: Vec<String> = tables
            .entries
            .keys()
            .filter(|k| pattern.is_match(k))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn expired_keys(&self) -> Vec<String> {
        self.tables
            .read()
            .entries
            .values()
            .filter(|e| e.is_expired())
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tables.read().entries.len()
    }

    pub fn tag_count(&self) -> usize {
        self.tables.read().tags.len()
    }

    /// Number of tracked keys held by each level.
    pub fn count_by_level(&self) -> BTreeMap<CacheLevel, usize> {
        let tables = self.tables.read();
        let mut counts = BTreeMap::new();
        for entry in tables.entries.values() {
            for level in &entry.levels {
                *counts.entry(*level).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn clear(&self) {
        let mut tables = self.tables.write();
        tables.entries.clear();
        tables.tags.clear();
    }
}
