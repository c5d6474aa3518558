// bdc-cache - Multi-level cache manager with an admin API
// Author: kelexine (https://github.com/kelexine)

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod serializer;
pub mod server;
pub mod store;
pub mod utils;

pub use cache::{CacheLevel, CacheManager, SetOptions};
pub use error::{CacheError, Result};
