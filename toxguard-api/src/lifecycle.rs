//! Startup and graceful shutdown
//!
//! Startup binds the listener, connects the store in the background (degraded
//! mode until it succeeds), optionally preloads the model, then serves.
//! Shutdown stops accepting connections, lets in-flight requests finish, and
//! closes the store on every exit path before returning.

use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use toxguard_common::config::ServerConfig;
use toxguard_common::db::Database;
use tracing::{error, info, warn};

use crate::model::{ModelGate, ModelLoader};
use crate::{build_router, AppState};

/// Run the service until a shutdown signal arrives
pub async fn run(config: ServerConfig, loader: Arc<dyn ModelLoader>) -> Result<()> {
    run_until(config, loader, shutdown_signal()).await
}

/// Run the service until `shutdown` resolves
///
/// The listener is bound before the store connects; requests that need the
/// store fail with 500 until the background connect succeeds.
pub async fn run_until<F>(
    config: ServerConfig,
    loader: Arc<dyn ModelLoader>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address()))?;

    let db = Database::new(config.database_url.clone());
    let connector = db.spawn_connect(config.db_connect_attempts, config.db_retry_base);

    let state = AppState::new(config, db, loader);
    serve(listener, state, async move {
        shutdown.await;
        connector.abort();
    })
    .await
}

/// Serve `state` on `listener` until `shutdown` resolves, then close the store
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let db = state.db.clone();

    if state.config.preload_model {
        preload_model(state.gate.clone(), state.config.default_threshold);
    }

    let addr = listener.local_addr().context("Listener has no local address")?;
    info!("Server running on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let app = build_router(state);
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await;

    info!("HTTP server stopped, closing database");
    db.close().await;

    served.context("Server error")?;
    info!("Server and DB connections closed");
    Ok(())
}

/// Start loading the model in the background
fn preload_model(gate: ModelGate, threshold: f64) {
    tokio::spawn(async move {
        if let Err(e) = gate.ensure_loaded(threshold).await {
            warn!("Model preload failed, first request will retry: {}", e);
        }
    });
}

/// Graceful shutdown signal handler
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("SIGTERM received. Shutting down gracefully...");
        },
    }
}
