//! Utility functions and helpers for bdc-cache.
//!
//! This module provides cross-cutting concerns like structured logging,
//! credential masking, and retry with backoff for remote store calls.
//!
//! # Submodules
//!
//! - `logging`: Tracing initialization and connection-URL sanitizing.
//! - `retry`: Backoff-driven retries for transient Redis failures.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod logging;
pub mod retry;
