//! GET /history

use axum::{extract::State, routing::get, Json, Router};
use toxguard_common::db::{recent_analyses, AnalysisRecord, MAX_HISTORY_LIMIT};
use tracing::error;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /history
///
/// The ten most recent analyses, newest first.
pub async fn get_history(State(state): State<AppState>) -> ApiResult<Json<Vec<AnalysisRecord>>> {
    let records = recent_analyses(&state.db, MAX_HISTORY_LIMIT)
        .await
        .map_err(|e| {
            error!("History Error: {}", e);
            ApiError::Store
        })?;

    Ok(Json(records))
}

/// Build history routes
pub fn history_routes() -> Router<AppState> {
    Router::new().route("/history", get(get_history))
}
