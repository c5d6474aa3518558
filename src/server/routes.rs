// HTTP routes configuration
// Author: kelexine (https://github.com/kelexine)

use super::handlers::{
    clear_handler, delete_handler, get_handler, health_handler, invalidate_handler,
    metrics_handler, put_handler, stats_handler,
};
use super::middleware::{request_id_layers, track_requests};
use crate::cache::CacheManager;
use crate::config::AppConfig;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub cache: Arc<CacheManager>,
}

pub fn create_router(config: AppConfig, cache: Arc<CacheManager>) -> Router {
    let state = AppState { config, cache };

    let (set_request_id, propagate_request_id) = request_id_layers();
    let tracking = middleware::from_fn_with_state(state.clone(), track_requests);

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/stats", get(stats_handler))
        .route("/v1/cache", delete(clear_handler))
        .route("/v1/cache/invalidate", post(invalidate_handler))
        .route(
            "/v1/cache/:key",
            get(get_handler).put(put_handler).delete(delete_handler),
        )
        // Cached values are JSON documents; 8MB is generous
        .layer(tower_http::limit::RequestBodyLimitLayer::new(8 * 1024 * 1024))
        .layer(tracking)
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state)
}
