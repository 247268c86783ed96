//! Cached Fields - Admin server
//!
//! Hosts the demo library model over an in-memory auxiliary store, with a
//! recalculation worker pool and the stuck-claim reaper running alongside.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::{signal, task::JoinHandle};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cached_fields::{create_router, demo, spawn_reaper_task, spawn_worker_pool, AppState, Config};

/// Main entry point for the cached fields admin server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Register the demo fields and declare their storage
/// 4. Start the worker pool and, if enabled, the reaper
/// 5. Serve the admin API until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cached_fields=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cached fields admin server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: default_expiration={}s, eager={}, use_tz={}, workers={}, port={}",
        config.default_expiration,
        config.eager_recalculation,
        config.use_timezone,
        config.worker_concurrency,
        config.server_port
    );

    let registry = demo::registry(config.field_defaults())?;
    let (state, receiver) = AppState::from_config(&config, registry);
    state
        .registry
        .declare_all(state.storage.as_ref())
        .await
        .context("declaring auxiliary storage")?;
    info!("{} cached fields registered", state.registry.len());

    let mut background = vec![spawn_worker_pool(
        state.worker.clone(),
        receiver,
        config.worker_concurrency,
    )];
    if config.reaper_enabled() {
        background.push(spawn_reaper_task(
            state.storage.clone(),
            state.clock.clone(),
            state.stats.clone(),
            config.reaper_interval,
            config.stuck_flag_timeout,
        ));
    } else {
        info!("Stuck claim reaper disabled");
    }

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(background))
        .await
        .context("serving admin API")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts the
/// background tasks.
async fn shutdown_signal(background: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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

    for handle in background {
        handle.abort();
    }
    warn!("Background tasks aborted");
}
