pub mod api;
mod middleware;

pub use api::rate_limit::ApiRateLimiter;
pub use api::{API_ROUTES, ApiRoute, ApiState, ApiVersion, build_api_router};
pub use middleware::RequestContext;

use std::sync::Arc;

use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Router, middleware as axum_middleware, routing::get};

use crate::application::error::ErrorReport;
use crate::application::repos::{HealthRepo, RepoError};

#[derive(Clone)]
pub struct RouterState {
    pub api: ApiState,
    pub health: Arc<dyn HealthRepo>,
}

impl FromRef<RouterState> for ApiState {
    fn from_ref(state: &RouterState) -> Self {
        state.api.clone()
    }
}

/// Full application router: `/health` plus the versioned API.
pub fn build_router(state: RouterState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(build_api_router(&state))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

async fn health(State(state): State<RouterState>) -> Response {
    db_health_response(state.health.health_check().await)
}

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
