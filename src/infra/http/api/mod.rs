//! Versioned REST API.
//!
//! Every endpoint is a row in [`API_ROUTES`]: method, path, version and output
//! cache policy. [`build_api_router`] turns the table into an axum router.
//! Each route is wrapped as output cache, then rate limit, then handler.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod state;

pub use state::ApiState;

use std::fmt;

use axum::{
    Router,
    http::HeaderValue,
    middleware as axum_middleware,
    routing::{MethodFilter, MethodRouter, on},
};

use crate::cache::{CachePolicy, output_cache_layer};
use crate::infra::http::RouterState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApiVersion {
    pub major: u8,
    pub minor: u8,
}

impl ApiVersion {
    pub const V1: Self = Self { major: 1, minor: 0 };

    /// URL prefix; only the major version appears in paths.
    pub fn prefix(&self) -> String {
        format!("/api/v{}", self.major)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

pub struct ApiRoute {
    pub method: MethodFilter,
    /// Path below the version prefix.
    pub path: &'static str,
    pub version: ApiVersion,
    /// `None` keeps the route out of the output cache.
    pub cache: Option<CachePolicy>,
    pub handler: fn(MethodFilter) -> MethodRouter<RouterState>,
}

impl ApiRoute {
    pub fn full_path(&self) -> String {
        format!("{}{}", self.version.prefix(), self.path)
    }
}

const POSTS_LIST_CACHE: CachePolicy = CachePolicy::vary_by(&["page", "pageSize", "userId"]);
const USERS_LIST_CACHE: CachePolicy = CachePolicy::vary_by(&["page", "pageSize"]);

pub static API_ROUTES: &[ApiRoute] = &[
    ApiRoute {
        method: MethodFilter::GET,
        path: "/posts",
        version: ApiVersion::V1,
        cache: Some(POSTS_LIST_CACHE),
        handler: |method| on(method, handlers::list_posts),
    },
    ApiRoute {
        method: MethodFilter::GET,
        path: "/posts/{id}",
        version: ApiVersion::V1,
        cache: Some(CachePolicy::PATH_ONLY),
        handler: |method| on(method, handlers::get_post),
    },
    ApiRoute {
        method: MethodFilter::POST,
        path: "/posts",
        version: ApiVersion::V1,
        cache: None,
        handler: |method| on(method, handlers::create_post),
    },
    ApiRoute {
        method: MethodFilter::PUT,
        path: "/posts/{id}",
        version: ApiVersion::V1,
        cache: None,
        handler: |method| on(method, handlers::update_post),
    },
    ApiRoute {
        method: MethodFilter::DELETE,
        path: "/posts/{id}",
        version: ApiVersion::V1,
        cache: None,
        handler: |method| on(method, handlers::delete_post),
    },
    ApiRoute {
        method: MethodFilter::GET,
        path: "/users",
        version: ApiVersion::V1,
        cache: Some(USERS_LIST_CACHE),
        handler: |method| on(method, handlers::list_users),
    },
    ApiRoute {
        method: MethodFilter::GET,
        path: "/users/{id}",
        version: ApiVersion::V1,
        cache: Some(CachePolicy::PATH_ONLY),
        handler: |method| on(method, handlers::get_user),
    },
    ApiRoute {
        method: MethodFilter::POST,
        path: "/users",
        version: ApiVersion::V1,
        cache: None,
        handler: |method| on(method, handlers::create_user),
    },
    ApiRoute {
        method: MethodFilter::PUT,
        path: "/users/{id}",
        version: ApiVersion::V1,
        cache: None,
        handler: |method| on(method, handlers::update_user),
    },
    ApiRoute {
        method: MethodFilter::DELETE,
        path: "/users/{id}",
        version: ApiVersion::V1,
        cache: None,
        handler: |method| on(method, handlers::delete_user),
    },
];

/// Comma separated list of the versions present in the route table.
pub fn supported_versions(routes: &[ApiRoute]) -> String {
    let mut versions: Vec<ApiVersion> = routes.iter().map(|route| route.version).collect();
    versions.sort_unstable();
    versions.dedup();
    versions
        .iter()
        .map(ApiVersion::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn build_api_router(state: &RouterState) -> Router<RouterState> {
    let api = state.api.clone();

    let mut router = Router::new();
    for route in API_ROUTES {
        let mut method_router = (route.handler)(route.method).layer(
            axum_middleware::from_fn_with_state(api.clone(), middleware::api_rate_limit),
        );
        if let Some(policy) = route.cache {
            method_router = method_router.layer(axum_middleware::from_fn_with_state(
                api.cache.for_route(policy),
                output_cache_layer,
            ));
        }
        router = router.route(&route.full_path(), method_router);
    }

    let versions = HeaderValue::from_str(&supported_versions(API_ROUTES))
        .unwrap_or_else(|_| HeaderValue::from_static("1.0"));

    router.layer(axum_middleware::from_fn_with_state(
        versions,
        middleware::api_version_header,
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_method_and_path_is_routed_once() {
        let mut seen = HashSet::new();
        for route in API_ROUTES {
            let key = (format!("{:?}", route.method), route.full_path());
            assert!(seen.insert(key), "duplicate route {}", route.full_path());
        }
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn only_reads_participate_in_the_cache() {
        for route in API_ROUTES {
            let is_get = route.method == MethodFilter::GET;
            assert_eq!(route.cache.is_some(), is_get, "{}", route.full_path());
        }
    }

    #[test]
    fn paths_carry_the_major_version() {
        let paths: Vec<String> = API_ROUTES.iter().map(ApiRoute::full_path).collect();
        assert!(paths.contains(&"/api/v1/posts".to_string()));
        assert!(paths.contains(&"/api/v1/users/{id}".to_string()));
    }

    #[test]
    fn supported_versions_are_deduplicated() {
        assert_eq!(supported_versions(API_ROUTES), "1.0");
    }
}
