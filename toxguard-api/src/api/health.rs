//! Health check endpoint
//!
//! Reads state only: it never connects to the database and never loads the
//! model, so it answers even when both are unavailable.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always "OK" while the process is serving
    pub status: String,
    /// Numeric store state: 0 disconnected, 1 connected, 2 connecting, 3 disconnecting
    pub db_state: u8,
    /// Name of `db_state`
    pub db_status: String,
    /// True once the model gate holds a ready instance
    pub model_loaded: bool,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_state = state.db.state();

    Json(HealthResponse {
        status: "OK".to_string(),
        db_state: db_state.code(),
        db_status: db_state.as_str().to_string(),
        model_loaded: state.gate.is_loaded(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.startup_time.elapsed().as_secs(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
