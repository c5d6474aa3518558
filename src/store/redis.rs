// Redis-backed remote store (L2)
// Author: kelexine (https://github.com/kelexine)

use super::CacheBackend;
use crate::config::RedisConfig;
use crate::error::{CacheError, Result};
use crate::utils::logging::sanitize;
use crate::utils::retry::with_retry;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, info};

const SCAN_BATCH: usize = 500;

/// Remote store speaking to a single Redis server.
///
/// All keys are namespaced under `key_prefix`, so `clear` only touches keys
/// this cache wrote. Expiry is left to Redis itself.
pub struct RedisStore {
    connection: ConnectionManager,
    key_prefix: String,
    max_retries: u32,
}

impl RedisStore {
    /// Connect to Redis, retrying transient failures with backoff.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        let timeout = Duration::from_secs(config.connect_timeout_seconds);
        info!("Connecting to Redis at {}", sanitize(&config.url));

        let connection = with_retry("redis connect", config.max_retries, || {
            let client = client.clone();
            async move {
                match tokio::time::timeout(timeout, ConnectionManager::new(client)).await {
                    Ok(result) => result,
                    Err(_) => Err(redis::RedisError::from((
                        redis::ErrorKind::IoError,
                        "connect timed out",
                    ))),
                }
            }
        })
        .await?;

        let store = Self {
            connection,
            key_prefix: config.key_prefix.clone(),
            max_retries: config.max_retries,
        };
        store.ping().await?;
        info!("Redis connection established");
        Ok(store)
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Collect every key under our prefix with SCAN (never KEYS).
    async fn scan_own_keys(&self) -> Result<Vec<String>> {
        let pattern = format!("{}*", self.key_prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) =
                with_retry("redis SCAN", self.max_retries, || {
                    let mut conn = self.connection.clone();
                    let mut cmd = redis::cmd("SCAN");
                    cmd.arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH);
                    async move { cmd.query_async::<(u64, Vec<String>)>(&mut conn).await }
                })
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }
}

#[async_trait]
impl CacheBackend for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let full_key = self.namespaced(key);
        let value = with_retry("redis GET", self.max_retries, || {
            let mut conn = self.connection.clone();
            let full_key = full_key.clone();
            async move { conn.get::<_, Option<Vec<u8>>>(full_key).await }
        })
        .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let full_key = self.namespaced(key);
        // PX takes whole milliseconds and rejects 0
        let ttl_ms = ttl.map(|d| (d.as_millis() as u64).max(1));

        with_retry("redis SET", self.max_retries, || {
            let mut conn = self.connection.clone();
            let full_key = full_key.clone();
            let value = value.clone();
            async move {
                match ttl_ms {
                    Some(ms) => conn.pset_ex::<_, _, ()>(full_key, value, ms).await,
                    None => conn.set::<_, _, ()>(full_key, value).await,
                }
            }
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let full_key = self.namespaced(key);
        let removed = with_retry("redis DEL", self.max_retries, || {
            let mut conn = self.connection.clone();
            let full_key = full_key.clone();
            async move { conn.del::<_, i64>(full_key).await }
        })
        .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let full_key = self.namespaced(key);
        let found = with_retry("redis EXISTS", self.max_retries, || {
            let mut conn = self.connection.clone();
            let full_key = full_key.clone();
            async move { conn.exists::<_, bool>(full_key).await }
        })
        .await?;
        Ok(found)
    }

    async fn clear(&self) -> Result<()> {
        let keys = self.scan_own_keys().await?;
        if keys.is_empty() {
            return Ok(());
        }

        for chunk in keys.chunks(SCAN_BATCH) {
            with_retry("redis DEL", self.max_retries, || {
                let mut conn = self.connection.clone();
                let chunk = chunk.to_vec();
                async move { conn.del::<_, i64>(chunk).await }
            })
            .await?;
        }
        debug!("Cleared {} Redis keys under prefix {}", keys.len(), self.key_prefix);
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.scan_own_keys().await?.len())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(CacheError::from)
            .and_then(|reply| {
                if reply == "PONG" {
                    Ok(())
                } else {
                    Err(CacheError::Internal(format!("unexpected PING reply: {}", reply)))
                }
            })
    }
}
