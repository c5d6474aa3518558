//! Axum-based admin HTTP server for bdc-cache.
//!
//! This module exposes one [`CacheManager`](crate::cache::CacheManager) over
//! HTTP: reads, writes, invalidation, statistics, health and Prometheus
//! metrics.
//!
//! # Components
//!
//! - `handlers`: Implementation of individual endpoints (cache, stats, health, metrics).
//! - `middleware`: Custom tower/axum middleware for request ID tracking.
//! - `routes`: The main router configuration that ties everything together.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod handlers;
mod middleware;
mod routes;

pub use handlers::{HealthResponse, HealthStatus};
pub use routes::{create_router, AppState};
