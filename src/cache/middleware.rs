//! Output cache middleware.
//!
//! Attached per route by the route table. Serves stored `GET 200` responses
//! until their TTL elapses; writes never purge entries, so a read may lag the
//! stored state by up to one TTL.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};

use super::{
    OutputCacheConfig,
    keys::{CacheKey, CachePolicy},
    store::{CacheStoreError, CachedResponse, OutputCacheStore},
};

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Shared output cache state.
#[derive(Clone)]
pub struct CacheState {
    pub config: OutputCacheConfig,
    pub store: Arc<OutputCacheStore>,
}

impl CacheState {
    pub fn new(config: OutputCacheConfig) -> Self {
        let store = Arc::new(OutputCacheStore::new(&config));
        Self { config, store }
    }

    /// Bind the shared store to one route's policy.
    pub fn for_route(&self, policy: CachePolicy) -> RouteCache {
        RouteCache {
            state: self.clone(),
            policy,
        }
    }
}

/// Middleware state for a single cached route.
#[derive(Clone)]
pub struct RouteCache {
    state: CacheState,
    policy: CachePolicy,
}

/// Serve and populate the output cache for one route.
///
/// Only `GET` participates and only `200 OK` is stored. Requests carrying
/// `If-None-Match` go straight to the handler so conditional reads always see
/// current storage state.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn output_cache_layer(
    State(route): State<RouteCache>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !route.state.config.enabled || request.method() != Method::GET {
        return next.run(request).await;
    }

    if request.headers().contains_key(header::IF_NONE_MATCH) {
        debug!(cache = "output", outcome = "bypass", "conditional request");
        return next.run(request).await;
    }

    let key = CacheKey::new(request.uri().path(), request.uri().query(), &route.policy);

    if let Some(cached) = route.state.store.get(&key) {
        debug!(cache = "output", outcome = "hit", "serving cached response");
        return build_response(cached);
    }

    debug!(cache = "output", outcome = "miss", "executing handler");
    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let limit = route.state.config.max_body_bytes;
    let (parts, bytes) = match buffer(response, limit).await {
        Ok(buffered) => buffered,
        Err(err) => {
            warn!(cache = "output", error = %err, "response not cacheable");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let cached = CachedResponse {
        status: parts.status.as_u16(),
        headers: parts
            .headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect(),
        body: bytes.clone(),
    };

    if let Some(evicted) = route.state.store.insert(key, cached) {
        debug!(cache = "output", evicted = evicted.path(), "evicted entry");
    }

    let mut response = Response::from_parts(parts, Body::from(bytes));
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static("MISS"));
    response
}

async fn buffer(
    response: Response,
    limit: usize,
) -> Result<(axum::http::response::Parts, bytes::Bytes), CacheStoreError> {
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|source| CacheStoreError::Buffer { limit, source })?;
    Ok((parts, bytes))
}

/// Build a response from cached data.
fn build_response(cached: CachedResponse) -> Response {
    let mut builder = Response::builder().status(cached.status);

    for (name, value) in cached.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }

    builder
        .header(X_CACHE, HeaderValue::from_static("HIT"))
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::{Router, middleware, routing::get};
    use tower::ServiceExt;

    use super::*;

    fn counting_router(state: &CacheState, policy: CachePolicy) -> (Router, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let router = Router::new()
            .route(
                "/items",
                get(move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        format!("call {n}")
                    }
                }),
            )
            .route_layer(middleware::from_fn_with_state(
                state.for_route(policy),
                output_cache_layer,
            ));
        (router, calls)
    }

    async fn send(router: &Router, request: Request<Body>) -> (Response, String) {
        let response = router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .expect("body should collect");
        let text = String::from_utf8(bytes.to_vec()).expect("utf8 body");
        (Response::from_parts(parts, Body::empty()), text)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request should build")
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let state = CacheState::new(OutputCacheConfig::default());
        let (router, calls) = counting_router(&state, CachePolicy::vary_by(&["page"]));

        let (first, first_body) = send(&router, get_request("/items?page=1")).await;
        let (second, second_body) = send(&router, get_request("/items?page=1&noise=2")).await;

        assert_eq!(first.headers()[X_CACHE], "MISS");
        assert_eq!(second.headers()[X_CACHE], "HIT");
        assert_eq!(first_body, second_body);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn conditional_requests_bypass_cache() {
        let state = CacheState::new(OutputCacheConfig::default());
        let (router, calls) = counting_router(&state, CachePolicy::PATH_ONLY);

        send(&router, get_request("/items")).await;
        let request = Request::builder()
            .uri("/items")
            .header(header::IF_NONE_MATCH, "\"0\"")
            .body(Body::empty())
            .expect("request should build");
        let (response, body) = send(&router, request).await;

        assert!(response.headers().get(X_CACHE).is_none());
        assert_eq!(body, "call 2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disabled_cache_always_runs_handler() {
        let state = CacheState::new(OutputCacheConfig {
            enabled: false,
            ..Default::default()
        });
        let (router, calls) = counting_router(&state, CachePolicy::PATH_ONLY);

        send(&router, get_request("/items")).await;
        send(&router, get_request("/items")).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn non_success_responses_are_not_stored() {
        let state = CacheState::new(OutputCacheConfig::default());
        let router = Router::new()
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .route_layer(middleware::from_fn_with_state(
                state.for_route(CachePolicy::PATH_ONLY),
                output_cache_layer,
            ));

        let (response, _) = send(&router, get_request("/missing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(state.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_refreshed() {
        let state = CacheState::new(OutputCacheConfig {
            ttl: Duration::from_secs(60),
            ..Default::default()
        });
        let (router, calls) = counting_router(&state, CachePolicy::PATH_ONLY);

        send(&router, get_request("/items")).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        let (_, cached) = send(&router, get_request("/items")).await;
        assert_eq!(cached, "call 1");

        tokio::time::advance(Duration::from_secs(31)).await;
        let (response, fresh) = send(&router, get_request("/items")).await;
        assert_eq!(fresh, "call 2");
        assert_eq!(response.headers()[X_CACHE], "MISS");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
