// CLI module for bdc-cache
// Author: kelexine (https://github.com/kelexine)

use crate::config::AppConfig;
use clap::Parser;
use std::path::PathBuf;

/// bdc-cache - Multi-level cache manager with an admin API
#[derive(Parser, Debug)]
#[command(name = "bdc-cache", version, about, long_about = None)]
pub struct Args {
    /// Path to a TOML config file (default: ~/.bdc-cache/config.toml)
    #[arg(short, long, env = "BDC_CACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind the admin server to
    #[arg(long)]
    pub host: Option<String>,

    /// Port for the admin server
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Redis URL for the L2 level
    #[arg(long)]
    pub redis_url: Option<String>,

    /// Run with the in-memory level only
    #[arg(long)]
    pub no_redis: bool,
}

impl Args {
    /// Apply flags on top of the loaded configuration (highest precedence).
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(url) = &self.redis_url {
            config.cache.l2.url = url.clone();
        }
        if self.no_redis {
            config.cache.l2.enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "bdc-cache",
            "--port",
            "9000",
            "--redis-url",
            "redis://cache:6380",
            "--no-redis",
        ]);
        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.cache.l2.url, "redis://cache:6380");
        assert!(!config.cache.l2.enabled);
    }
}
