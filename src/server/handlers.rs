// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::cache::{CacheLevel, SetOptions};
use crate::error::{CacheError, Result};
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HashMap<String, HealthCheck>,
    pub timestamp: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
    /// Live keys reported by the backend, when it could count them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<usize>,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut checks = HashMap::new();
    let levels = state.cache.levels();
    let mut failing = 0;

    for level in &levels {
        let Some(backend) = state.cache.backend(*level) else {
            continue;
        };
        let check = match backend.ping().await {
            Ok(()) => HealthCheck {
                status: "ok".to_string(),
                message: format!("{} backend reachable", backend.name()),
                entries: backend.len().await.ok(),
            },
            Err(e) => {
                failing += 1;
                HealthCheck {
                    status: "error".to_string(),
                    message: e.to_string(),
                    entries: None,
                }
            }
        };
        checks.insert(level.to_string(), check);
    }

    // Configured but not connected
    if state.config.cache.l2.enabled && !levels.contains(&CacheLevel::Redis) {
        failing += 1;
        checks.insert(
            CacheLevel::Redis.to_string(),
            HealthCheck {
                status: "warning".to_string(),
                message: "Redis enabled but not connected".to_string(),
                entries: None,
            },
        );
    }

    let overall_status = if failing == 0 {
        HealthStatus::Healthy
    } else if failing < checks.len() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    };

    Json(HealthResponse {
        status: overall_status,
        checks,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Prometheus scrape endpoint
pub async fn metrics_handler(State(state): State<AppState>) -> Result<Response> {
    // Refresh entry gauges before rendering
    state.cache.stats();
    let body = match state.cache.metrics() {
        Some(metrics) => metrics.render()?,
        None => String::new(),
    };
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<crate::cache::CacheStats> {
    Json(state.cache.stats())
}

#[derive(Debug, Deserialize)]
pub struct LevelsQuery {
    /// Comma separated level list, e.g. `memory,redis`
    pub levels: Option<String>,
}

impl LevelsQuery {
    fn parse(&self) -> Result<Option<Vec<CacheLevel>>> {
        let Some(raw) = &self.levels else {
            return Ok(None);
        };
        raw.split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<CacheLevel>().map_err(CacheError::InvalidRequest))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<LevelsQuery>,
) -> Result<Json<Value>> {
    let value: Option<Value> = match query.parse()? {
        Some(levels) => state.cache.get_in(&key, &levels).await?,
        None => state.cache.get(&key).await?,
    };

    match value {
        Some(value) => Ok(Json(value)),
        None => Err(CacheError::NotFound(key)),
    }
}

#[derive(Debug, Deserialize)]
pub struct PutRequest {
    pub value: Value,
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub levels: Option<Vec<CacheLevel>>,
}

pub async fn put_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: String,
) -> Result<Json<Value>> {
    // Manually deserialize to get better error messages
    let req: PutRequest = serde_json::from_str(&body)
        .map_err(|e| CacheError::InvalidRequest(format!("JSON deserialization error: {}", e)))?;

    let mut options = SetOptions::new().tags(req.tags);
    if let Some(ttl) = req.ttl_seconds {
        options = options.ttl(Duration::from_secs(ttl));
    }
    if let Some(levels) = &req.levels {
        options = options.levels(levels);
    }

    debug!("PUT {} (ttl={:?})", key, req.ttl_seconds);
    state.cache.set(&key, &req.value, options).await?;

    let levels = state
        .cache
        .entry(&key)
        .map(|e| e.levels.into_iter().collect::<Vec<_>>())
        .unwrap_or_default();
    Ok(Json(json!({ "stored": true, "key": key, "levels": levels })))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>> {
    let deleted = state.cache.delete(&key).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    #[serde(default)]
    pub tags: Vec<String>,
    pub pattern: Option<String>,
}

pub async fn invalidate_handler(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<Value>> {
    let req: InvalidateRequest = serde_json::from_str(&body)
        .map_err(|e| CacheError::InvalidRequest(format!("JSON deserialization error: {}", e)))?;

    if req.tags.is_empty() && req.pattern.is_none() {
        return Err(CacheError::InvalidRequest(
            "provide tags, a pattern, or both".to_string(),
        ));
    }

    let mut invalidated = 0;
    if !req.tags.is_empty() {
        invalidated += state.cache.invalidate_by_tags(&req.tags).await?;
    }
    if let Some(pattern) = &req.pattern {
        invalidated += state.cache.invalidate_pattern(pattern).await?;
    }

    info!("Invalidation request removed {} keys", invalidated);
    Ok(Json(json!({ "invalidated": invalidated })))
}

pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<Value>> {
    state.cache.clear().await?;
    Ok(Json(json!({ "cleared": true })))
}
