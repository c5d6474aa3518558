//! Storage backends for the individual cache levels.
//!
//! Each level is served by a [`CacheBackend`]. Backends deal in raw encoded
//! bytes; the cache manager owns serialization, metadata and cross-level
//! coordination.
//!
//! # Submodules
//!
//! - `memory`: bounded in-process store with LRU/LFU eviction (L1).
//! - `redis`: Redis-backed remote store (L2).
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod memory;
pub mod redis;

pub use self::memory::{EvictionPolicy, MemoryStore};
pub use self::redis::RedisStore;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A single cache tier reachable by key.
///
/// `get` distinguishes absence (`Ok(None)`) from failure (`Err`).
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Returns whether the key was present.
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Remove every key this backend owns.
    async fn clear(&self) -> Result<()>;

    /// Number of live keys, when the backend can tell cheaply.
    async fn len(&self) -> Result<usize>;

    /// Round-trip check used by health reporting.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Drop expired entries the backend does not expire on its own.
    /// Returns the number removed.
    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }

    /// Keys evicted for capacity since the last call.
    fn drain_evictions(&self) -> Vec<String> {
        Vec::new()
    }
}
