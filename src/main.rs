//! Asset enrichment sync daemon - main entry point

use std::time::Duration;

use tokio::signal;
use tokio::time::{Instant, interval_at};

use asset_enrichment::{
    Config,
    application::{IntegrationService, IntegrationServiceImpl},
    init_tracing,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration ({}), using defaults", e);
        Config::default()
    });

    // Initialize tracing
    init_tracing(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        build_date = option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown"),
        git_sha = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        "Starting asset enrichment daemon"
    );
    match &config.store.path {
        Some(path) => tracing::info!("Catalogue store: {}", path.display()),
        None => tracing::info!("Catalogue store: in-memory (set ENRICHMENT__STORE__PATH to persist)"),
    }

    let service = IntegrationServiceImpl::from_config(&config).await?;
    service.bootstrap().await?;

    let period = Duration::from_secs(config.scheduler.status_log_interval_seconds.max(1));
    let mut status_ticker = interval_at(Instant::now() + period, period);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = status_ticker.tick() => {
                let status = service.get_integration_status().await;
                let network = service.network_status().await;
                tracing::info!(
                    total_sources = status.total_sources,
                    active_sources = status.active_sources,
                    sync_errors = status.sync_errors,
                    last_sync = ?status.last_sync,
                    next_sync = ?status.next_sync,
                    online = network.is_online,
                    consecutive_failures = network.consecutive_failures,
                    "Integration status"
                );
            }
        }
    }

    service.shutdown().await;
    tracing::info!("Daemon shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
