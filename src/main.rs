// bdc-cache - Multi-level cache manager with an admin API
// Author: kelexine (https://github.com/kelexine)

use anyhow::Result;
use bdc_cache::cache::CacheManager;
use bdc_cache::cli::Args;
use bdc_cache::config::AppConfig;
use bdc_cache::metrics::CacheMetrics;
use bdc_cache::server::create_router;
use bdc_cache::utils::logging;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration (CLI flags win over file and env)
    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()?;
    runtime.block_on(run(config))
}

async fn run(config: AppConfig) -> Result<()> {
    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    info!(
        "Starting bdc-cache v{} with {} worker threads",
        env!("CARGO_PKG_VERSION"),
        config.server.workers
    );

    // Phase 3: Build the cache levels
    let metrics = CacheMetrics::new()?;
    let cache = Arc::new(CacheManager::from_config(&config.cache, Some(metrics)).await?);
    info!(
        "Cache ready with levels [{}], default [{}]",
        join_levels(&cache.levels()),
        join_levels(cache.default_levels())
    );

    // Phase 4: Background maintenance
    if config.cache.maintenance_interval_seconds > 0 {
        cache.start_maintenance(Duration::from_secs(config.cache.maintenance_interval_seconds));
    }

    // Phase 5: Build and start HTTP server
    let app = create_router(config.clone(), cache.clone());
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    info!("Starting admin server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Phase 6: Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache.shutdown();
    info!("Server shut down gracefully");
    Ok(())
}

fn join_levels(levels: &[bdc_cache::CacheLevel]) -> String {
    levels
        .iter()
        .map(|l| l.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
