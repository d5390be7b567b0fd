//! Request id propagation and the per-response log line.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;
use crate::cache::X_CACHE;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const MAX_INBOUND_REQUEST_ID: usize = 128;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Adopt the caller's `x-request-id` when it is usable, otherwise mint one, and
/// echo it on the response.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = inbound_request_id(request.headers())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    request.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
    });

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

fn inbound_request_id(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(X_REQUEST_ID)?.to_str().ok()?.trim();
    let usable = !raw.is_empty()
        && raw.len() <= MAX_INBOUND_REQUEST_ID
        && raw.bytes().all(|b| b.is_ascii_graphic());
    usable.then(|| raw.to_string())
}

/// How a response was produced, as far as caching and validators are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    /// Served from the output cache.
    CacheHit,
    /// `304`: the client's validator was current.
    NotModified,
    /// Full body rendered by the handler.
    Rendered,
}

impl ReadOutcome {
    fn of(status: StatusCode, headers: &HeaderMap) -> Self {
        if headers.get(X_CACHE).is_some_and(|value| value == "HIT") {
            Self::CacheHit
        } else if status == StatusCode::NOT_MODIFIED {
            Self::NotModified
        } else {
            Self::Rendered
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::CacheHit => "cache_hit",
            Self::NotModified => "not_modified",
            Self::Rendered => "rendered",
        }
    }
}

/// One log line per response. Failures carry the attached [`ErrorReport`];
/// successes record whether the cache or a validator answered.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();
    let start = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis();

    if status.is_client_error() || status.is_server_error() {
        let (source, chain) = match response.extensions_mut().remove::<ErrorReport>() {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = chain.first().map(String::as_str).unwrap_or("no diagnostic");

        if status.is_server_error() {
            error!(
                target = "nebula::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms,
                source,
                detail,
                chain = ?chain,
                request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "nebula::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms,
                source,
                detail,
                request_id,
                "request rejected",
            );
        }
        return response;
    }

    let headers = response.headers();
    debug!(
        target = "nebula::http::response",
        status = status.as_u16(),
        method = %method,
        path = %uri.path(),
        elapsed_ms,
        outcome = ReadOutcome::of(status, headers).as_str(),
        etag = headers
            .get(header::ETAG)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(""),
        request_id,
        "request served",
    );
    response
}
