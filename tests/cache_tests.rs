// Cache manager tests - public API across two in-process levels
// Author: kelexine (https://github.com/kelexine)

use async_trait::async_trait;
use bdc_cache::cache::{CacheLevel, CacheManager, SetOptions};
use bdc_cache::error::{CacheError, Result};
use bdc_cache::store::{CacheBackend, EvictionPolicy, MemoryStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const L1: CacheLevel = CacheLevel::Memory;
const L2: CacheLevel = CacheLevel::Redis;

/// A backend whose every call fails, standing in for an unreachable Redis.
struct FailingBackend;

#[async_trait]
impl CacheBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Err(CacheError::backend(L2, "connection refused"))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> Result<()> {
        Err(CacheError::backend(L2, "connection refused"))
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(CacheError::backend(L2, "connection refused"))
    }

    async fn clear(&self) -> Result<()> {
        Err(CacheError::backend(L2, "connection refused"))
    }

    async fn len(&self) -> Result<usize> {
        Err(CacheError::backend(L2, "connection refused"))
    }

    async fn ping(&self) -> Result<()> {
        Err(CacheError::backend(L2, "connection refused"))
    }
}

fn memory(max_entries: usize) -> Arc<dyn CacheBackend> {
    Arc::new(MemoryStore::new(
        max_entries,
        16 * 1024 * 1024,
        EvictionPolicy::Lru,
    ))
}

/// L1 memory plus a second memory store registered as the Redis level.
fn two_level(threshold: u64) -> CacheManager {
    CacheManager::builder()
        .backend(L1, memory(1000))
        .backend(L2, memory(1000))
        .default_levels(&[L1, L2])
        .promotion_threshold(threshold)
        .build()
        .unwrap()
}

fn degraded() -> CacheManager {
    CacheManager::builder()
        .backend(L1, memory(1000))
        .backend(L2, Arc::new(FailingBackend))
        .default_levels(&[L1, L2])
        .build()
        .unwrap()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
    roles: Vec<String>,
}

#[tokio::test]
async fn test_round_trip_structured_value() {
    let cache = two_level(5);
    let user = User {
        id: 1,
        name: "Ada".to_string(),
        roles: vec!["admin".to_string()],
    };

    cache.set("user:1", &user, SetOptions::new()).await.unwrap();

    let cached: Option<User> = cache.get("user:1").await.unwrap();
    assert_eq!(cached, Some(user.clone()));

    // Every default level holds its own copy
    let l2_only: Option<User> = cache.get_in("user:1", &[L2]).await.unwrap();
    assert_eq!(l2_only, Some(user));
}

#[tokio::test]
async fn test_user_profile_scenario() {
    let cache = two_level(5);
    let options = SetOptions::new()
        .ttl(Duration::from_secs(300))
        .tags(["user", "user:1"]);

    cache
        .set("user:1", &json!({"name": "Ada"}), options)
        .await
        .unwrap();

    let entry = cache.entry("user:1").unwrap();
    assert_eq!(entry.ttl, Some(300));
    assert!(entry.tags.contains("user:1"));
    assert!(entry.levels.contains(&L1) && entry.levels.contains(&L2));

    let value: Option<Value> = cache.get("user:1").await.unwrap();
    assert_eq!(value, Some(json!({"name": "Ada"})));

    let stats = cache.stats();
    assert_eq!(stats.level(L1).hits, 1);
    assert_eq!(stats.level(L1).sets, 1);
    assert_eq!(stats.level(L2).sets, 1);
    assert_eq!(stats.total_hits, 1);
    assert_eq!(stats.tracked_keys, 1);

    assert_eq!(cache.invalidate_by_tags(&["user:1"]).await.unwrap(), 1);
    let gone: Option<Value> = cache.get("user:1").await.unwrap();
    assert_eq!(gone, None);
}

#[tokio::test]
async fn test_delete_then_get_or_returns_default() {
    let cache = two_level(5);
    cache.set("session:9", &"token", SetOptions::new()).await.unwrap();

    assert!(cache.delete("session:9").await.unwrap());
    assert!(!cache.delete("session:9").await.unwrap());

    let value = cache.get_or("session:9", "fallback".to_string()).await;
    assert_eq!(value, "fallback");
    assert!(cache.entry("session:9").is_none());
    assert!(!cache.exists("session:9").await.unwrap());
}

#[tokio::test]
async fn test_tag_invalidation_leaves_other_keys() {
    let cache = two_level(5);
    cache
        .set("product:1", &1, SetOptions::new().tag("catalog"))
        .await
        .unwrap();
    cache
        .set("product:2", &2, SetOptions::new().tags(["catalog", "featured"]))
        .await
        .unwrap();
    cache
        .set("order:1", &3, SetOptions::new().tag("orders"))
        .await
        .unwrap();

    let removed = cache.invalidate_by_tags(&["catalog"]).await.unwrap();
    assert_eq!(removed, 2);

    assert_eq!(cache.get::<i32>("product:1").await.unwrap(), None);
    assert_eq!(cache.get::<i32>("product:2").await.unwrap(), None);
    assert_eq!(cache.get::<i32>("order:1").await.unwrap(), Some(3));

    // Nothing left under the tag
    assert_eq!(cache.invalidate_by_tags(&["catalog"]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_pattern_invalidation() {
    let cache = two_level(5);
    for key in ["report:2024:01", "report:2024:02", "report:2023:12", "user:1"] {
        cache.set(key, &key, SetOptions::new()).await.unwrap();
    }

    let removed = cache.invalidate_pattern("report:2024:*").await.unwrap();
    assert_eq!(removed, 2);
    assert!(cache.exists("report:2023:12").await.unwrap());
    assert!(cache.exists("user:1").await.unwrap());
    assert!(!cache.exists("report:2024:01").await.unwrap());
}

#[tokio::test]
async fn test_ttl_expiry() {
    let cache = two_level(5);
    cache
        .set(
            "short",
            &"soon gone",
            SetOptions::new().ttl(Duration::from_millis(100)),
        )
        .await
        .unwrap();
    assert_eq!(
        cache.get::<String>("short").await.unwrap().as_deref(),
        Some("soon gone")
    );

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(cache.get::<String>("short").await.unwrap(), None);
    assert_eq!(cache.get_in::<String>("short", &[L2]).await.unwrap(), None);
}

#[tokio::test]
async fn test_exists_and_warm_after_expiry() {
    let cache = two_level(5);
    cache
        .set(
            "flash",
            &"old",
            SetOptions::new().ttl(Duration::from_millis(100)),
        )
        .await
        .unwrap();
    assert!(cache.exists("flash").await.unwrap());

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(cache.get::<String>("flash").await.unwrap(), None);
    assert!(!cache.exists("flash").await.unwrap());

    let report = cache
        .warm(vec!["flash".to_string()], SetOptions::new(), |_| async {
            Ok::<_, String>(Some("fresh".to_string()))
        })
        .await
        .unwrap();
    assert_eq!(report.loaded, 1);
    assert_eq!(
        cache.get::<String>("flash").await.unwrap().as_deref(),
        Some("fresh")
    );
}

#[tokio::test]
async fn test_fractional_ttl_survives_purge_and_tag_invalidation() {
    let cache = two_level(5);
    cache
        .set(
            "user:7",
            &1,
            SetOptions::new()
                .ttl(Duration::from_millis(1900))
                .tag("users"),
        )
        .await
        .unwrap();

    // Past the whole second, still inside the real lifetime
    tokio::time::sleep(Duration::from_millis(1200)).await;

    assert_eq!(cache.purge_expired().await.unwrap(), 0);
    assert_eq!(cache.invalidate_by_tags(&["users"]).await.unwrap(), 1);
    assert_eq!(cache.get::<i32>("user:7").await.unwrap(), None);
}

#[tokio::test]
async fn test_promotion_after_threshold() {
    let cache = two_level(3);
    cache
        .set("hot", &"value", SetOptions::new().levels(&[L2]))
        .await
        .unwrap();
    assert_eq!(cache.get_in::<String>("hot", &[L1]).await.unwrap(), None);

    // Hits below the threshold stay in L2
    for _ in 0..2 {
        assert!(cache.get::<String>("hot").await.unwrap().is_some());
    }
    assert_eq!(cache.stats().level(L1).promotions, 0);

    // The third hit copies the value into L1
    assert!(cache.get::<String>("hot").await.unwrap().is_some());
    let stats = cache.stats();
    assert_eq!(stats.level(L1).promotions, 1);
    assert!(cache.entry("hot").unwrap().levels.contains(&L1));

    let before = cache.stats().level(L1).hits;
    assert!(cache.get::<String>("hot").await.unwrap().is_some());
    assert_eq!(cache.stats().level(L1).hits, before + 1);
}

#[tokio::test]
async fn test_concurrent_writers_leave_levels_consistent() {
    let cache = Arc::new(two_level(5));

    let mut handles = Vec::new();
    for i in 0..32u32 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache.set("contended", &i, SetOptions::new()).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let l1: Option<u32> = cache.get_in("contended", &[L1]).await.unwrap();
    let l2: Option<u32> = cache.get_in("contended", &[L2]).await.unwrap();
    assert!(l1.is_some());
    assert_eq!(l1, l2);
    assert_eq!(cache.stats().level(L1).sets, 32);
}

#[tokio::test]
async fn test_partial_write_reports_failed_level() {
    let cache = degraded();

    let err = cache
        .set("k", &"v", SetOptions::new())
        .await
        .unwrap_err();
    match err {
        CacheError::PartialWrite { operation, failed } => {
            assert_eq!(operation, "set");
            assert_eq!(failed, vec![L2]);
        }
        other => panic!("expected PartialWrite, got {:?}", other),
    }

    // The level that did accept the write still serves it
    let entry = cache.entry("k").unwrap();
    assert!(entry.levels.contains(&L1));
    assert!(!entry.levels.contains(&L2));
    assert_eq!(cache.get::<String>("k").await.unwrap().as_deref(), Some("v"));
    assert_eq!(cache.stats().level(L2).errors, 1);
}

#[tokio::test]
async fn test_set_failing_everywhere_forgets_dropped_copies() {
    let cache = CacheManager::builder()
        .backend(
            L1,
            Arc::new(MemoryStore::new(100, 64, EvictionPolicy::Lru)),
        )
        .default_levels(&[L1])
        .build()
        .unwrap();

    cache.set("k", &1, SetOptions::new()).await.unwrap();

    let oversized = "x".repeat(500);
    let err = cache
        .set("k", &oversized, SetOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::PartialWrite { .. }));

    // The old copy was dropped, so nothing may claim it is still cached
    assert_eq!(cache.get::<i32>("k").await.unwrap(), None);
    assert!(cache.entry("k").is_none());
    assert!(!cache.exists("k").await.unwrap());
    assert_eq!(cache.stats().tracked_keys, 0);

    let report = cache
        .warm(vec!["k".to_string()], SetOptions::new(), |_| async {
            Ok::<_, String>(Some(2))
        })
        .await
        .unwrap();
    assert_eq!(report.loaded, 1);
    assert_eq!(cache.get::<i32>("k").await.unwrap(), Some(2));
}

#[tokio::test]
async fn test_failing_level_skipped_on_read() {
    let cache = degraded();
    cache
        .set("only-l1", &7, SetOptions::new().levels(&[L1]))
        .await
        .unwrap();

    // L1 miss followed by an L2 failure is still a miss, not an error
    assert_eq!(cache.get::<i32>("absent").await.unwrap(), None);
    assert_eq!(cache.get::<i32>("only-l1").await.unwrap(), Some(7));

    // A read against nothing but the broken level surfaces the failure
    assert!(cache.get_in::<i32>("absent", &[L2]).await.is_err());
    assert_eq!(cache.get_or_in("absent", 42, &[L2]).await, 42);
}

#[tokio::test]
async fn test_deserialization_mismatch_is_error() {
    let cache = two_level(5);
    cache
        .set("shape", &json!({"id": "not a number"}), SetOptions::new())
        .await
        .unwrap();

    let result = cache.get::<User>("shape").await;
    assert!(matches!(result, Err(CacheError::Deserialization(_))));
}

#[tokio::test]
async fn test_l1_eviction_updates_stats_and_metadata() {
    let cache = CacheManager::builder()
        .backend(L1, memory(2))
        .default_levels(&[L1])
        .build()
        .unwrap();

    for key in ["a", "b", "c"] {
        cache.set(key, &key, SetOptions::new()).await.unwrap();
    }

    let stats = cache.stats();
    assert_eq!(stats.level(L1).evictions, 1);
    assert_eq!(stats.tracked_keys, 2);
    assert!(cache.entry("a").is_none());
    assert_eq!(cache.get::<String>("a").await.unwrap(), None);
    assert_eq!(cache.get::<String>("c").await.unwrap().as_deref(), Some("c"));
}

#[tokio::test]
async fn test_warm_loads_only_missing_keys() {
    let cache = two_level(5);
    cache.set("cfg:a", &"cached", SetOptions::new()).await.unwrap();

    let keys = vec![
        "cfg:a".to_string(),
        "cfg:b".to_string(),
        "cfg:c".to_string(),
        "cfg:broken".to_string(),
    ];
    let report = cache
        .warm(keys, SetOptions::new().tag("config"), |key| async move {
            match key.as_str() {
                "cfg:b" => Ok(Some(format!("loaded {}", key))),
                "cfg:broken" => Err("database unavailable"),
                _ => Ok(None),
            }
        })
        .await
        .unwrap();

    assert_eq!(report.loaded, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(
        cache.get::<String>("cfg:b").await.unwrap().as_deref(),
        Some("loaded cfg:b")
    );
    // Pre-existing value untouched
    assert_eq!(
        cache.get::<String>("cfg:a").await.unwrap().as_deref(),
        Some("cached")
    );
}

#[tokio::test]
async fn test_clear_empties_all_levels() {
    let cache = two_level(5);
    cache.set("x", &1, SetOptions::new().tag("t")).await.unwrap();
    cache.set("y", &2, SetOptions::new()).await.unwrap();

    cache.clear().await.unwrap();

    assert_eq!(cache.stats().tracked_keys, 0);
    assert_eq!(cache.get_in::<i32>("x", &[L2]).await.unwrap(), None);
    assert_eq!(cache.invalidate_by_tags(&["t"]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_hit_rate() {
    let cache = two_level(5);
    cache.set("k", &1, SetOptions::new()).await.unwrap();

    let _ = cache.get::<i32>("k").await.unwrap();
    let _ = cache.get::<i32>("k").await.unwrap();
    let _ = cache.get::<i32>("k").await.unwrap();
    let _ = cache.get::<i32>("missing").await.unwrap();

    let stats = cache.stats();
    assert_eq!(stats.total_hits, 3);
    assert_eq!(stats.total_misses, 1);
    assert!((stats.hit_rate - 0.75).abs() < f64::EPSILON);

    cache.reset_stats();
    assert_eq!(cache.stats().total_hits, 0);
}
