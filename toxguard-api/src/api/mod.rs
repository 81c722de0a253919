//! HTTP API handlers for toxguard-api

pub mod analyze;
pub mod health;
pub mod history;

pub use analyze::{analysis_routes, analyze};
pub use health::{health_check, health_routes};
pub use history::{get_history, history_routes};

use crate::error::ApiError;

/// Fallback for unknown routes
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
