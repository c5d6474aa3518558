// Cache management module
// Author: kelexine (https://github.com/kelexine)

pub mod keys;
mod locks;
pub mod manager;
mod metadata;
pub mod models;
mod stats;

pub use manager::{CacheManager, CacheManagerBuilder};
pub use models::{CacheEntry, CacheLevel, CacheStats, LevelStats, SetOptions, WarmReport};
