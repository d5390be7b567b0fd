//! Output cache keys.
//!
//! A key is the request path plus the values of the query parameters a route
//! whitelists. Everything else in the query string is ignored, so requests that
//! differ only in unlisted parameters share one entry.

/// Per-route caching policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Query parameter names that take part in the key, matched case-insensitively.
    pub vary_by_query: &'static [&'static str],
}

impl CachePolicy {
    /// Key on the path alone.
    pub const PATH_ONLY: Self = Self { vary_by_query: &[] };

    pub const fn vary_by(vary_by_query: &'static [&'static str]) -> Self {
        Self { vary_by_query }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    path: String,
    /// `(whitelisted name, value)` in whitelist order, then request order.
    vary: Vec<(&'static str, String)>,
}

impl CacheKey {
    pub fn new(path: &str, query: Option<&str>, policy: &CachePolicy) -> Self {
        let pairs: Vec<(String, String)> = query
            .map(|raw| {
                url::form_urlencoded::parse(raw.as_bytes())
                    .map(|(name, value)| (name.into_owned(), value.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        let mut vary = Vec::new();
        for &name in policy.vary_by_query {
            for (candidate, value) in &pairs {
                if candidate.eq_ignore_ascii_case(name) {
                    vary.push((name, value.clone()));
                }
            }
        }

        Self {
            path: path.to_string(),
            vary,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}
