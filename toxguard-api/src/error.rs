//! Error types for toxguard-api
//!
//! Handlers return [`ApiError`]; its `IntoResponse` impl is the single place
//! that decides status codes and what detail reaches the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::any::Any;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or too-short input (400)
    #[error("{0}")]
    Validation(String),

    /// Model or persistence failure during analysis (500)
    ///
    /// `details` is only populated when error details are exposed.
    #[error("Analysis failed")]
    Analysis { details: Option<String> },

    /// History read failure (500)
    #[error("Failed to fetch history")]
    Store,

    /// Client exceeded its request quota (429)
    #[error("Too many requests, please try again later.")]
    RateLimited { retry_after_secs: u64 },

    /// Unknown route (404)
    #[error("Not found")]
    NotFound,

    /// Anything unexpected (500)
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    /// Analysis failure, carrying `message` only when `expose_details` is set
    pub fn analysis(message: impl ToString, expose_details: bool) -> Self {
        ApiError::Analysis {
            details: expose_details.then(|| message.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Analysis { .. } | ApiError::Store | ApiError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        match self {
            ApiError::Analysis { details } => {
                (status, Json(json!({ "error": message, "details": details }))).into_response()
            }
            ApiError::RateLimited { retry_after_secs } => (
                status,
                [("retry-after", retry_after_secs.to_string())],
                Json(json!({ "error": message })),
            )
                .into_response(),
            _ => (status, Json(json!({ "error": message }))).into_response(),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Response for a panic caught inside a handler
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Server error: handler panicked: {}", detail);
    ApiError::Internal.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_details_hidden_by_default() {
        match ApiError::analysis("disk on fire", false) {
            ApiError::Analysis { details } => assert!(details.is_none()),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_analysis_details_exposed_when_enabled() {
        match ApiError::analysis("disk on fire", true) {
            ApiError::Analysis { details } => assert_eq!(details.as_deref(), Some("disk on fire")),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Store.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::RateLimited { retry_after_secs: 1 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_panic_response_is_generic() {
        let response = panic_response(Box::new("secret internals".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
