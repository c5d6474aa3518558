// Error types for bdc-cache
// Author: kelexine (https://github.com/kelexine)

use crate::cache::CacheLevel;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("{level} backend error: {message}")]
    Backend { level: CacheLevel, message: String },

    #[error("No backend registered for level {0}")]
    LevelUnavailable(CacheLevel),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Capacity exceeded: entry of {size} bytes exceeds limit of {limit} bytes")]
    CapacityExceeded { size: usize, limit: usize },

    #[error("{operation} failed on levels: {}", format_levels(.failed))]
    PartialWrite {
        operation: &'static str,
        failed: Vec<CacheLevel>,
    },

    #[error("Invalid key pattern: {0}")]
    InvalidPattern(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_levels(levels: &[CacheLevel]) -> String {
    levels
        .iter()
        .map(|l| l.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl CacheError {
    /// Wrap a store-level failure with the level it happened on
    pub fn backend(level: CacheLevel, message: impl Into<String>) -> Self {
        CacheError::Backend {
            level,
            message: message.into(),
        }
    }

    /// True for failures caused by an unreachable or misbehaving store,
    /// as opposed to bad input or a value that cannot be decoded.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            CacheError::Backend { .. } | CacheError::Redis(_) | CacheError::LevelUnavailable(_)
        )
    }
}

// Convert CacheError to HTTP responses for Axum
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            CacheError::InvalidRequest(_) | CacheError::InvalidPattern(_) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error", self.to_string())
            }
            CacheError::NotFound(_) => {
                (StatusCode::NOT_FOUND, "not_found_error", self.to_string())
            }
            CacheError::Serialization(_) | CacheError::Deserialization(_) | CacheError::Json(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "serialization_error", self.to_string())
            }
            CacheError::CapacityExceeded { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "capacity_error", self.to_string())
            }
            CacheError::Backend { .. } | CacheError::Redis(_) | CacheError::LevelUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "backend_error", self.to_string())
            }
            CacheError::PartialWrite { .. } => {
                (StatusCode::BAD_GATEWAY, "partial_write_error", self.to_string())
            }
            CacheError::Config(_) | CacheError::ConfigParsing(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error", self.to_string())
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "api_error", self.to_string()),
        };

        let body = json!({
            "type": "error",
            "error": {
                "type": error_type,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
