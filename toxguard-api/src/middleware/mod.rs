//! HTTP middleware: cross-origin policy and rate limiting

pub mod rate_limit;

pub use rate_limit::{FixedWindowLimiter, RateDecision, RateLimitLayer};

use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing::error;

/// CORS policy: one origin, credentials allowed, GET/POST/OPTIONS only
pub fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = match HeaderValue::from_str(origin) {
        Ok(value) => AllowOrigin::exact(value),
        Err(e) => {
            // Unusable origin: refuse every cross-origin caller
            error!("Invalid CORS origin {:?}: {}", origin, e);
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
}
