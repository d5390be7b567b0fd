//! Nebula output cache.
//!
//! A single process-local response cache in front of read endpoints. Entries
//! live for a fixed TTL from insertion and are never purged by writes, so a
//! cached read may be up to one TTL behind storage.
//!
//! ## Configuration
//!
//! ```toml
//! [output_cache]
//! enabled = true
//! ttl_seconds = 60
//! capacity = 1024
//! ```

mod config;
mod keys;
mod lock;
mod middleware;
mod store;

pub use config::OutputCacheConfig;
pub use keys::{CacheKey, CachePolicy};
pub use middleware::{CacheState, RouteCache, X_CACHE, output_cache_layer};
pub use store::{
    CacheStoreError, CachedResponse, METRIC_OUTPUT_CACHE_EVICT, METRIC_OUTPUT_CACHE_EXPIRED,
    METRIC_OUTPUT_CACHE_HIT, METRIC_OUTPUT_CACHE_MISS, OutputCacheStore,
};
