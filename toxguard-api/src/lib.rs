//! toxguard-api library - toxicity analysis HTTP service
//!
//! Exposes the router and application state for the binary and for
//! integration tests.

use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use toxguard_common::config::ServerConfig;
use toxguard_common::db::Database;

pub mod analysis;
pub mod api;
pub mod cli;
pub mod error;
pub mod lifecycle;
pub mod middleware;
pub mod model;

pub use crate::error::{ApiError, ApiResult};

use crate::analysis::AnalysisPipeline;
use crate::middleware::{cors_layer, FixedWindowLimiter, RateLimitLayer};
use crate::model::{ModelGate, ModelLoader};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Store handle; may be disconnected
    pub db: Database,
    /// Owner of the single model instance
    pub gate: ModelGate,
    pub pipeline: Arc<AnalysisPipeline>,
    pub config: Arc<ServerConfig>,
    /// Service startup instant for uptime tracking
    pub startup_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ServerConfig, db: Database, loader: Arc<dyn ModelLoader>) -> Self {
        let gate = ModelGate::new(loader);
        let pipeline = AnalysisPipeline::new(
            gate.clone(),
            db.clone(),
            config.default_threshold,
            config.freeze_threshold,
        );

        Self {
            db,
            gate,
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
            startup_time: Instant::now(),
        }
    }
}

/// Build application router
///
/// Layer order, outermost first: tracing, CORS (answers preflights before
/// they are counted), rate limiting, panic recovery.
pub fn build_router(state: AppState) -> Router {
    let limiter = Arc::new(FixedWindowLimiter::new(
        state.config.rate_limit_window,
        state.config.rate_limit_max,
    ));
    let cors = cors_layer(&state.config.cors_origin);

    Router::new()
        .merge(api::analysis_routes())
        .merge(api::history_routes())
        .merge(api::health_routes())
        .fallback(api::not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(RateLimitLayer::new(limiter))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
