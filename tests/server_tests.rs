// Admin API tests - requests driven through the router with oneshot
// Author: kelexine (https://github.com/kelexine)

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bdc_cache::cache::{CacheLevel, CacheManager, SetOptions};
use bdc_cache::config::AppConfig;
use bdc_cache::metrics::CacheMetrics;
use bdc_cache::server::create_router;
use bdc_cache::store::{EvictionPolicy, MemoryStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

fn test_cache() -> Arc<CacheManager> {
    let cache = CacheManager::builder()
        .backend(
            CacheLevel::Memory,
            Arc::new(MemoryStore::new(100, 1024 * 1024, EvictionPolicy::Lru)),
        )
        .default_levels(&[CacheLevel::Memory])
        .metrics(CacheMetrics::new().unwrap())
        .build()
        .unwrap();
    Arc::new(cache)
}

fn test_app(cache: Arc<CacheManager>) -> Router {
    let mut config = AppConfig::default();
    config.cache.l2.enabled = false;
    create_router(config, cache)
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(json) => Body::from(json.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_reports_each_level() {
    let app = test_app(test_cache());
    let (status, body) = send(app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["l1_memory"]["status"], "ok");
    assert_eq!(body["checks"]["l1_memory"]["entries"], 0);
}

#[tokio::test]
async fn test_health_counts_live_keys() {
    let cache = test_cache();
    cache.set("a", &1, SetOptions::new()).await.unwrap();
    cache.set("b", &2, SetOptions::new()).await.unwrap();

    let (status, body) = send(test_app(cache), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["l1_memory"]["entries"], 2);
}

#[tokio::test]
async fn test_put_then_get() {
    let cache = test_cache();

    let (status, body) = send(
        test_app(cache.clone()),
        "PUT",
        "/v1/cache/user:1",
        Some(json!({"value": {"name": "Ada"}, "ttl_seconds": 60, "tags": ["user"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stored"], true);
    assert_eq!(body["levels"], json!(["memory"]));

    let (status, body) = send(test_app(cache.clone()), "GET", "/v1/cache/user:1", None).await;
    assert_eq!(status, StatusCode::OK);
    // The body is the cached value itself
    assert_eq!(body, json!({"name": "Ada"}));

    assert_eq!(cache.entry("user:1").unwrap().ttl, Some(60));
}

#[tokio::test]
async fn test_get_missing_key_is_404() {
    let app = test_app(test_cache());
    let (status, body) = send(app, "GET", "/v1/cache/nope", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "not_found_error");
}

#[tokio::test]
async fn test_put_rejects_malformed_body() {
    let app = test_app(test_cache());
    let (status, body) = send(app, "PUT", "/v1/cache/k", Some(json!({"ttl_seconds": 5}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_get_with_unknown_level_is_400() {
    let app = test_app(test_cache());
    let (status, _) = send(app, "GET", "/v1/cache/k?levels=memory,disk", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_key() {
    let cache = test_cache();
    cache.set("k", &1, SetOptions::new()).await.unwrap();

    let (status, body) = send(test_app(cache.clone()), "DELETE", "/v1/cache/k", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);
    assert!(cache.entry("k").is_none());
}

#[tokio::test]
async fn test_invalidate_by_tags_and_pattern() {
    let cache = test_cache();
    cache
        .set("a:1", &1, SetOptions::new().tag("group"))
        .await
        .unwrap();
    cache.set("b:1", &2, SetOptions::new()).await.unwrap();
    cache.set("b:2", &3, SetOptions::new()).await.unwrap();
    cache.set("c:1", &4, SetOptions::new()).await.unwrap();

    let (status, body) = send(
        test_app(cache.clone()),
        "POST",
        "/v1/cache/invalidate",
        Some(json!({"tags": ["group"], "pattern": "b:*"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invalidated"], 3);
    assert!(cache.entry("c:1").is_some());

    let (status, _) = send(
        test_app(cache),
        "POST",
        "/v1/cache/invalidate",
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stats_and_clear() {
    let cache = test_cache();
    cache.set("x", &"y", SetOptions::new()).await.unwrap();
    let _ = cache.get::<String>("x").await.unwrap();

    let (status, body) = send(test_app(cache.clone()), "GET", "/v1/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_hits"], 1);
    assert_eq!(body["tracked_keys"], 1);
    assert_eq!(body["levels"]["memory"]["sets"], 1);

    let (status, body) = send(test_app(cache.clone()), "DELETE", "/v1/cache", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], true);
    assert_eq!(cache.stats().tracked_keys, 0);
}

#[tokio::test]
async fn test_metrics_endpoint_renders_prometheus_text() {
    let cache = test_cache();
    cache.set("m", &1, SetOptions::new()).await.unwrap();

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = test_app(cache).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("bdc_cache_operations_total"));
    assert!(text.contains("bdc_cache_entries"));
}
