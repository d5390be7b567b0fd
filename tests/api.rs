use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use nebula::application::pagination::PageBounds;
use nebula::application::posts::PostService;
use nebula::application::users::UserService;
use nebula::cache::{CacheState, OutputCacheConfig};
use nebula::infra::http::{self, ApiRateLimiter, ApiState, RouterState};
use nebula::infra::memory::InMemoryRepositories;

fn build_app(cache: OutputCacheConfig, rate_limiter: Option<ApiRateLimiter>) -> Router {
    let repo = Arc::new(InMemoryRepositories::new());
    let state = RouterState {
        api: ApiState {
            posts: Arc::new(PostService::new(repo.clone(), repo.clone(), repo.clone())),
            users: Arc::new(UserService::new(repo.clone(), repo.clone())),
            pagination: PageBounds::default(),
            cache: CacheState::new(cache),
            rate_limiter: rate_limiter.map(Arc::new),
        },
        health: repo,
    };
    http::build_router(state)
}

fn uncached_app() -> Router {
    build_app(
        OutputCacheConfig {
            enabled: false,
            ..Default::default()
        },
        None,
    )
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body should be json")
    }

    fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

async fn send(router: &Router, request: Request<Body>) -> Reply {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let (parts, body) = response.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("body should collect")
        .to_vec();
    Reply {
        status: parts.status,
        headers: parts.headers,
        body,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

fn get_if_none_match(uri: &str, validator: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::IF_NONE_MATCH, validator)
        .body(Body::empty())
        .expect("request should build")
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

async fn create_user(router: &Router, name: &str) -> i32 {
    let reply = send(
        router,
        json_request(
            Method::POST,
            "/api/v1/users",
            json!({ "name": name, "email": format!("{}@example.com", name.to_lowercase()) }),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    reply.json()["id"].as_i64().expect("user id") as i32
}

async fn create_post(router: &Router, title: &str, user_id: i32) -> i32 {
    let reply = send(
        router,
        json_request(
            Method::POST,
            "/api/v1/posts",
            json!({ "title": title, "content": "body", "userId": user_id }),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    reply.json()["id"].as_i64().expect("post id") as i32
}

#[tokio::test]
async fn etag_round_trip_follows_version_changes() {
    let app = build_app(OutputCacheConfig::default(), None);

    let user = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/users",
            json!({ "name": "Ada", "email": "ada@example.com" }),
        ),
    )
    .await;
    assert_eq!(user.status, StatusCode::CREATED);
    assert_eq!(user.header(header::LOCATION), Some("/api/v1/users/1"));

    let created = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/posts",
            json!({ "title": "  Hello ", "content": "World", "userId": 1 }),
        ),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.header(header::LOCATION), Some("/api/v1/posts/1"));
    let body = created.json();
    assert_eq!(body["title"], "Hello");
    assert_eq!(body["userName"], "Ada");

    let first = send(&app, get("/api/v1/posts/1")).await;
    assert_eq!(first.status, StatusCode::OK);
    let etag = first.header(header::ETAG).expect("etag").to_string();
    assert_eq!(etag, "W/\"AAAAAAAAAAI=\"");
    assert_eq!(first.json()["content"], "World");

    let not_modified = send(&app, get_if_none_match("/api/v1/posts/1", &etag)).await;
    assert_eq!(not_modified.status, StatusCode::NOT_MODIFIED);
    assert_eq!(not_modified.header(header::ETAG), Some(etag.as_str()));
    assert!(not_modified.body.is_empty());

    let listed = send(
        &app,
        get_if_none_match("/api/v1/posts/1", &format!("W/\"b3RoZXI=\", {etag}")),
    )
    .await;
    assert_eq!(listed.status, StatusCode::NOT_MODIFIED);

    let updated = send(
        &app,
        json_request(
            Method::PUT,
            "/api/v1/posts/1",
            json!({ "title": "Hello again", "content": "World" }),
        ),
    )
    .await;
    assert_eq!(updated.status, StatusCode::NO_CONTENT);

    let fresh = send(&app, get_if_none_match("/api/v1/posts/1", &etag)).await;
    assert_eq!(fresh.status, StatusCode::OK);
    let new_etag = fresh.header(header::ETAG).expect("etag");
    assert_ne!(new_etag, etag);
    assert_eq!(fresh.json()["title"], "Hello again");
}

#[tokio::test]
async fn invalid_creates_are_bad_requests() {
    let app = uncached_app();
    let user_id = create_user(&app, "Ada").await;

    let blank_title = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/posts",
            json!({ "title": "   ", "content": "body", "userId": user_id }),
        ),
    )
    .await;
    assert_eq!(blank_title.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        blank_title.json()["error"]["hint"],
        "title must not be empty"
    );

    let unknown_user = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/posts",
            json!({ "title": "t", "content": "c", "userId": 42 }),
        ),
    )
    .await;
    assert_eq!(unknown_user.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        unknown_user.json()["error"]["hint"],
        "user 42 does not exist"
    );

    let missing_fields = send(&app, json_request(Method::POST, "/api/v1/users", json!({}))).await;
    assert_eq!(missing_fields.status, StatusCode::BAD_REQUEST);

    let bad_email = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/users",
            json!({ "name": "Grace", "email": "grace.example.com" }),
        ),
    )
    .await;
    assert_eq!(bad_email.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        bad_email.json()["error"]["code"],
        "validation_failed"
    );

    let malformed = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/users")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .expect("request should build"),
    )
    .await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
    assert_eq!(malformed.json()["error"]["code"], "bad_request");

    let invalid_update = send(
        &app,
        json_request(
            Method::PUT,
            &format!("/api/v1/users/{user_id}"),
            json!({ "name": "", "email": "ada@example.com" }),
        ),
    )
    .await;
    assert_eq!(invalid_update.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_resources_are_not_found() {
    let app = uncached_app();

    assert_eq!(
        send(&app, get("/api/v1/posts/999")).await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        send(&app, delete("/api/v1/posts/999")).await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        send(
            &app,
            json_request(
                Method::PUT,
                "/api/v1/users/999",
                json!({ "name": "Ghost", "email": "ghost@example.com" }),
            ),
        )
        .await
        .status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        send(&app, get("/api/v1/posts/not-a-number")).await.status,
        StatusCode::BAD_REQUEST
    );

    let user_id = create_user(&app, "Ada").await;
    let uri = format!("/api/v1/users/{user_id}");
    assert_eq!(send(&app, get(&uri)).await.status, StatusCode::OK);
    assert_eq!(send(&app, delete(&uri)).await.status, StatusCode::NO_CONTENT);
    assert_eq!(send(&app, get(&uri)).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_user_with_posts_conflicts() {
    let app = uncached_app();
    let user_id = create_user(&app, "Ada").await;
    let post_id = create_post(&app, "Hello", user_id).await;

    let conflict = send(&app, delete(&format!("/api/v1/users/{user_id}"))).await;
    assert_eq!(conflict.status, StatusCode::CONFLICT);

    assert_eq!(
        send(&app, delete(&format!("/api/v1/posts/{post_id}")))
            .await
            .status,
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        send(&app, delete(&format!("/api/v1/users/{user_id}")))
            .await
            .status,
        StatusCode::NO_CONTENT
    );
}

#[tokio::test]
async fn stale_if_match_is_rejected() {
    let app = uncached_app();
    let user_id = create_user(&app, "Ada").await;
    let uri = format!("/api/v1/users/{user_id}");

    let etag = send(&app, get(&uri))
        .await
        .header(header::ETAG)
        .expect("etag")
        .to_string();

    let conditional_put = |validator: &str, name: &str| {
        Request::builder()
            .method(Method::PUT)
            .uri(&uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::IF_MATCH, validator)
            .body(Body::from(
                json!({ "name": name, "email": "ada@example.com" }).to_string(),
            ))
            .expect("request should build")
    };

    let applied = send(&app, conditional_put(&etag, "Ada Lovelace")).await;
    assert_eq!(applied.status, StatusCode::NO_CONTENT);

    let stale = send(&app, conditional_put(&etag, "Someone Else")).await;
    assert_eq!(stale.status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(stale.json()["error"]["code"], "precondition_failed");

    let wildcard = send(&app, conditional_put("*", "Countess")).await;
    assert_eq!(wildcard.status, StatusCode::NO_CONTENT);

    let current = send(&app, get(&uri)).await;
    assert_eq!(current.json()["name"], "Countess");
}

#[tokio::test]
async fn list_pagination_is_lenient() {
    let app = uncached_app();
    let ada = create_user(&app, "Ada").await;
    let grace = create_user(&app, "Grace").await;
    let linus = create_user(&app, "Linus").await;

    let defaults = send(&app, get("/api/v1/users?page=0&pageSize=9999")).await;
    assert_eq!(defaults.status, StatusCode::OK);
    let ids: Vec<i64> = defaults
        .json()
        .as_array()
        .expect("array")
        .iter()
        .map(|user| user["id"].as_i64().expect("id"))
        .collect();
    assert_eq!(ids, vec![ada as i64, grace as i64, linus as i64]);

    let second_page = send(&app, get("/api/v1/users?page=2&pageSize=2")).await;
    let users = second_page.json();
    assert_eq!(users.as_array().expect("array").len(), 1);
    assert_eq!(users[0]["id"], linus);

    let garbled = send(&app, get("/api/v1/users?page=abc&pageSize=")).await;
    assert_eq!(garbled.status, StatusCode::OK);

    create_post(&app, "by ada", ada).await;
    create_post(&app, "by grace", grace).await;
    let filtered = send(&app, get(&format!("/api/v1/posts?userId={grace}"))).await;
    let posts = filtered.json();
    assert_eq!(posts.as_array().expect("array").len(), 1);
    assert_eq!(posts[0]["title"], "by grace");

    let bad_filter = send(&app, get("/api/v1/posts?userId=grace")).await;
    assert_eq!(bad_filter.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn responses_advertise_supported_versions() {
    let app = uncached_app();

    let ok = send(&app, get("/api/v1/users")).await;
    assert_eq!(ok.header("api-supported-versions"), Some("1.0"));
    assert!(ok.header("x-request-id").is_some());

    let missing = send(&app, get("/api/v1/users/404")).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.header("api-supported-versions"), Some("1.0"));
}

#[tokio::test]
async fn rate_limit_rejects_excess_requests() {
    let app = build_app(
        OutputCacheConfig::default(),
        Some(ApiRateLimiter::new(Duration::from_secs(60), 2)),
    );

    assert_eq!(send(&app, get("/api/v1/users")).await.status, StatusCode::OK);
    assert_eq!(send(&app, get("/api/v1/posts")).await.status, StatusCode::OK);

    let limited = send(&app, get("/api/v1/users?page=2")).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.json()["error"]["code"], "rate_limited");
    let retry_after: u64 = limited
        .header(header::RETRY_AFTER)
        .expect("retry-after")
        .parse()
        .expect("numeric retry-after");
    assert!((1..=60).contains(&retry_after));
    assert_eq!(limited.header("api-supported-versions"), Some("1.0"));

    assert_eq!(
        send(&app, get("/health")).await.status,
        StatusCode::NO_CONTENT,
        "health is outside the rate-limited API"
    );
}

#[tokio::test]
async fn cache_hits_do_not_spend_rate_limit_permits() {
    let app = build_app(
        OutputCacheConfig::default(),
        Some(ApiRateLimiter::new(Duration::from_secs(60), 2)),
    );

    let first = send(&app, get("/api/v1/users")).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.header("x-cache"), Some("MISS"));

    for _ in 0..5 {
        let hit = send(&app, get("/api/v1/users")).await;
        assert_eq!(hit.status, StatusCode::OK);
        assert_eq!(hit.header("x-cache"), Some("HIT"));
    }

    create_user(&app, "Ada").await;

    let limited = send(&app, get("/api/v1/users/1")).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);

    let still_cached = send(&app, get("/api/v1/users")).await;
    assert_eq!(still_cached.status, StatusCode::OK);
    assert_eq!(still_cached.header("x-cache"), Some("HIT"));
}
