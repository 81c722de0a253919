//! POST /analyze

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use toxguard_common::db::LabelScore;
use tracing::{debug, error};
use uuid::Uuid;

use crate::analysis::{AnalyzeError, THRESHOLD_OUT_OF_RANGE};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Request body; both fields may be absent
#[derive(Debug, Default, PartialEq)]
pub struct AnalyzeRequest {
    pub text: Option<String>,
    pub threshold: Option<f64>,
}

impl AnalyzeRequest {
    /// Read the fields from a parsed body
    ///
    /// A non-string `text` counts as missing and is rejected downstream. A
    /// `threshold` that is present but not a number is rejected here.
    pub fn from_json(body: &Value) -> Result<Self, &'static str> {
        let text = body.get("text").and_then(Value::as_str).map(str::to_string);
        let threshold = match body.get("threshold") {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_f64().ok_or(THRESHOLD_OUT_OF_RANGE)?),
        };
        Ok(Self { text, threshold })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub success: bool,
    pub results: Vec<LabelScore>,
    pub analysis_id: Uuid,
}

/// POST /analyze
///
/// Classifies `text` and stores the result. A body that is missing or not
/// JSON is treated as missing text (400).
pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let request = match payload {
        Ok(Json(body)) => AnalyzeRequest::from_json(&body).map_err(|message| {
            debug!("Rejected analyze request: {}", message);
            ApiError::Validation(message.to_string())
        })?,
        Err(rejection) => {
            debug!("Unusable analyze body: {}", rejection);
            AnalyzeRequest::default()
        }
    };

    let outcome = state
        .pipeline
        .analyze(request.text.as_deref(), request.threshold)
        .await
        .map_err(|e| match e {
            AnalyzeError::Validation(message) => {
                debug!("Rejected analyze request: {}", message);
                ApiError::Validation(message.to_string())
            }
            other => {
                error!("Analysis Error: {}", other);
                ApiError::analysis(&other, state.config.expose_error_details)
            }
        })?;

    debug!(
        "Analysis {} stored with {} matched labels at threshold {}",
        outcome.analysis_id,
        outcome.results.len(),
        outcome.threshold
    );

    Ok(Json(AnalyzeResponse {
        success: true,
        results: outcome.results,
        analysis_id: outcome.analysis_id,
    }))
}

/// Build analysis routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new().route("/analyze", post(analyze))
}
