//! Adaptive Cache - admin server
//!
//! Hosts one adaptive cache of JSON values behind a small HTTP API.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adaptive_cache::api::{create_router, AppState};
use adaptive_cache::cache::{AdaptiveCache, CacheEvent};
use adaptive_cache::config::Config;

/// Main entry point for the adaptive cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache and start its background tasks
/// 4. Start the prefetch intent logger
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adaptive_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Adaptive Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_size={}, default_ttl={}ms, port={}, cleanup_interval={}ms, prefetch_interval={}ms",
        config.max_size,
        config.default_ttl_ms,
        config.server_port,
        config.cleanup_interval_ms,
        config.prefetch_interval_ms
    );

    let state = AppState::from_config(&config).context("invalid cache configuration")?;
    info!("Cache initialized, background tasks started");

    spawn_intent_logger(&state.cache);

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.cache.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Logs prefetch intents. A deployment plugs its data source in with
/// `spawn_prefetch_fetcher` instead.
fn spawn_intent_logger(cache: &AdaptiveCache<serde_json::Value>) {
    let mut events = cache.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CacheEvent::Prefetch {
                    key,
                    reason,
                    predicted_by,
                }) => info!("Prefetch intent: {} ({:?}, predicted by {})", key, reason, predicted_by),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Intent logger lagged; {} events skipped", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
