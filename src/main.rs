//! Course Cache bridge server
//!
//! Serves the course loader over a local HTTP bridge, backed by the
//! in-process data service.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use course_cache::api::create_router;
use course_cache::service::{MemoryDataService, SeedData};
use course_cache::{spawn_cleanup_task, AppState, Config};

/// Main entry point for the course cache bridge.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Load seed data and build the data service
/// 4. Create the session loader
/// 5. Start background TTL sweep task
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "course_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Course Cache bridge");

    let config = Config::from_env();
    info!(
        "Configuration loaded: course_ttl={}s, question_ttl={}s, breaker={}/{}ms, batch={}, port={}",
        config.course_ttl,
        config.question_ttl,
        config.breaker_ceiling,
        config.breaker_cooldown_ms,
        config.fetch_batch_size,
        config.server_port
    );

    let seed = match &config.seed_path {
        Some(path) => SeedData::from_json_file(path)?,
        None => {
            warn!("SEED_PATH not set, starting with an empty data service");
            SeedData::default()
        }
    };
    info!(
        "Seed loaded: {} courses, {} topics, {} questions",
        seed.courses.len(),
        seed.topics.len(),
        seed.questions.len()
    );

    let state = AppState::from_config(&config, Arc::new(MemoryDataService::new(seed)));

    let cleanup_handle = spawn_cleanup_task(state.loader.shared_cache(), config.cleanup_interval);
    info!("Background sweep task started");

    let app = create_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("serving HTTP bridge")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the sweep task and allows graceful shutdown.
async fn shutdown_signal(cleanup_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
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

    cleanup_handle.abort();
    warn!("Sweep task aborted");
}
