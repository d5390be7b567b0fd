use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use super::error::ApiError;
use super::rate_limit::RateDecision;
use super::state::ApiState;

pub const API_SUPPORTED_VERSIONS: HeaderName = HeaderName::from_static("api-supported-versions");

/// Sits inside the output cache layer, so cache hits never spend a permit.
pub async fn api_rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(limiter) = state.rate_limiter.as_ref() else {
        return next.run(request).await;
    };

    match limiter.allow() {
        RateDecision::Allowed { remaining } => {
            debug!(
                target = "nebula::api::ratelimit",
                remaining,
                limit = limiter.limit(),
                "request admitted"
            );
            next.run(request).await
        }
        RateDecision::Limited { retry_after } => ApiError::rate_limited(retry_after),
    }
}

/// Advertise the API versions served by the route table on every API response.
pub async fn api_version_header(
    State(versions): State<HeaderValue>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(API_SUPPORTED_VERSIONS, versions);
    response
}
