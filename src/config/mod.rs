// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;

pub use models::*;

use crate::error::{CacheError, Result};
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. CLI arguments (highest, applied by the caller)
    /// 2. Environment variables (`BDC_CACHE_` prefix, `__` between sections)
    /// 3. Config file (`path`, or `~/.bdc-cache/config.toml` when absent)
    /// 4. Defaults (lowest)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, required) = match path {
            Some(p) => (p.to_string_lossy().to_string(), true),
            None => (Self::default_config_path(), false),
        };

        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&Self::default())?)
            // Load from config file if it exists
            .add_source(File::with_name(&file).required(required))
            // Override with environment variables, e.g. BDC_CACHE_CACHE__L2__URL
            .add_source(
                Environment::with_prefix("BDC_CACHE")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cache.default_levels")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CacheError::Config(e.to_string()))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| CacheError::Config(e.to_string()))?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Reject settings the cache cannot run with.
    pub fn validate(&self) -> Result<()> {
        let cache = &self.cache;
        if cache.default_levels.is_empty() {
            return Err(CacheError::Config(
                "cache.default_levels must name at least one level".to_string(),
            ));
        }
        if cache.l1.max_entries == 0 || cache.l1.max_memory_bytes == 0 {
            return Err(CacheError::Config(
                "cache.l1 capacity limits must be greater than zero".to_string(),
            ));
        }
        if cache.lock_stripes == 0 {
            return Err(CacheError::Config(
                "cache.lock_stripes must be greater than zero".to_string(),
            ));
        }
        if cache.promotion_threshold == 0 {
            return Err(CacheError::Config(
                "cache.promotion_threshold must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn default_config_path() -> String {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".bdc-cache")
            .join("config.toml")
            .to_string_lossy()
            .to_string()
    }
}
