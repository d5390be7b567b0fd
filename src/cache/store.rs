//! TTL-bounded LRU store for whole HTTP responses.

use std::sync::RwLock;
use std::time::Duration;

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;
use tokio::time::Instant;

use super::config::OutputCacheConfig;
use super::keys::CacheKey;
use super::lock::{read_or_recover, write_or_recover};

pub const METRIC_OUTPUT_CACHE_HIT: &str = "nebula_output_cache_hit_total";
pub const METRIC_OUTPUT_CACHE_MISS: &str = "nebula_output_cache_miss_total";
pub const METRIC_OUTPUT_CACHE_EXPIRED: &str = "nebula_output_cache_expired_total";
pub const METRIC_OUTPUT_CACHE_EVICT: &str = "nebula_output_cache_evict_total";

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("response body could not be buffered within {limit} bytes")]
    Buffer {
        limit: usize,
        #[source]
        source: axum::Error,
    },
}

/// Cached HTTP response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

#[derive(Debug)]
struct StoredEntry {
    response: CachedResponse,
    expires_at: Instant,
}

/// Process-wide output cache.
///
/// Every access takes the write lock: the LRU order changes on reads, and the
/// expiry check must happen under the same lock that could replace the entry.
pub struct OutputCacheStore {
    entries: RwLock<LruCache<CacheKey, StoredEntry>>,
    ttl: Duration,
}

impl OutputCacheStore {
    pub fn new(config: &OutputCacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.capacity_non_zero())),
            ttl: config.ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the live entry for `key`. Expired entries are removed and reported as misses.
    pub fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        let now = Instant::now();
        let mut entries = write_or_recover(&self.entries, "get");

        let lookup = entries
            .get(key)
            .map(|entry| (now < entry.expires_at).then(|| entry.response.clone()));

        match lookup {
            Some(Some(response)) => {
                counter!(METRIC_OUTPUT_CACHE_HIT).increment(1);
                Some(response)
            }
            Some(None) => {
                entries.pop(key);
                counter!(METRIC_OUTPUT_CACHE_EXPIRED).increment(1);
                counter!(METRIC_OUTPUT_CACHE_MISS).increment(1);
                None
            }
            None => {
                counter!(METRIC_OUTPUT_CACHE_MISS).increment(1);
                None
            }
        }
    }

    /// Insert or replace `key`, returning the key evicted to make room, if any.
    pub fn insert(&self, key: CacheKey, response: CachedResponse) -> Option<CacheKey> {
        let entry = StoredEntry {
            response,
            expires_at: Instant::now() + self.ttl,
        };

        let mut entries = write_or_recover(&self.entries, "insert");
        let displaced = entries.push(key.clone(), entry);
        drop(entries);

        match displaced {
            Some((displaced_key, _)) if displaced_key != key => {
                counter!(METRIC_OUTPUT_CACHE_EVICT).increment(1);
                Some(displaced_key)
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        read_or_recover(&self.entries, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::Arc;

    use super::super::keys::CachePolicy;
    use super::*;

    fn key(path: &str) -> CacheKey {
        CacheKey::new(path, None, &CachePolicy::PATH_ONLY)
    }

    fn response(body: &'static str) -> CachedResponse {
        CachedResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn store(capacity: usize, ttl: Duration) -> OutputCacheStore {
        OutputCacheStore::new(&OutputCacheConfig {
            capacity,
            ttl,
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn entry_is_served_until_ttl_elapses() {
        let store = store(8, Duration::from_secs(60));
        store.insert(key("/a"), response("first"));

        tokio::time::advance(Duration::from_secs(59)).await;
        let cached = store.get(&key("/a")).expect("entry still fresh");
        assert_eq!(cached.body, Bytes::from_static(b"first"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get(&key("/a")).is_none());
        assert!(store.is_empty(), "expired entry is removed on access");
    }

    #[tokio::test(start_paused = true)]
    async fn reads_do_not_extend_lifetime() {
        let store = store(8, Duration::from_secs(10));
        store.insert(key("/a"), response("body"));

        for _ in 0..9 {
            tokio::time::advance(Duration::from_secs(1)).await;
            assert!(store.get(&key("/a")).is_some());
        }
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get(&key("/a")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_restarts_the_clock() {
        let store = store(8, Duration::from_secs(10));
        store.insert(key("/a"), response("old"));
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(store.insert(key("/a"), response("new")).is_none());

        tokio::time::advance(Duration::from_secs(8)).await;
        let cached = store.get(&key("/a")).expect("replacement still fresh");
        assert_eq!(cached.body, Bytes::from_static(b"new"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let store = store(2, Duration::from_secs(60));
        store.insert(key("/a"), response("a"));
        store.insert(key("/b"), response("b"));
        assert!(store.get(&key("/a")).is_some());

        let evicted = store.insert(key("/c"), response("c"));
        assert_eq!(evicted, Some(key("/b")));
        assert!(store.get(&key("/a")).is_some());
        assert!(store.get(&key("/b")).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_access_sees_whole_fresh_entries() {
        const TTL: Duration = Duration::from_millis(5);
        // Allowance for a task being descheduled between stamping and inserting.
        const SCHEDULING_SLACK: Duration = Duration::from_millis(250);
        let paths = ["/a", "/b", "/c", "/d", "/e", "/f"];
        let store = Arc::new(store(4, TTL));
        let origin = Instant::now();

        let workers: Vec<_> = (0..8u64)
            .map(|worker| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let mut hits = 0u64;
                    for round in 0..5_000u64 {
                        let path = paths[((worker + round) % paths.len() as u64) as usize];
                        if round % 3 == 0 {
                            let stamp = origin.elapsed().as_nanos().to_string();
                            store.insert(
                                key(path),
                                CachedResponse {
                                    status: 200,
                                    headers: vec![("x-stamp".to_string(), stamp.clone())],
                                    body: Bytes::from(stamp),
                                },
                            );
                        } else {
                            let read_at = origin.elapsed();
                            if let Some(cached) = store.get(&key(path)) {
                                let stamp = std::str::from_utf8(&cached.body)
                                    .expect("utf8 body")
                                    .to_string();
                                assert_eq!(cached.headers[0].1, stamp, "torn entry");
                                let written_at = Duration::from_nanos(
                                    stamp.parse::<u64>().expect("numeric stamp"),
                                );
                                assert!(
                                    read_at.saturating_sub(written_at) < TTL + SCHEDULING_SLACK,
                                    "entry served long after its ttl"
                                );
                                hits += 1;
                            }
                        }
                        if round % 64 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                    hits
                })
            })
            .collect();

        for worker in workers {
            worker.await.expect("worker should not panic");
        }
        assert!(store.len() <= 4);

        tokio::time::sleep(TTL * 2).await;
        for path in paths {
            assert!(store.get(&key(path)).is_none(), "{path} outlived its ttl");
        }
        assert!(store.is_empty());
    }

    #[test]
    fn store_recovers_from_poisoned_lock() {
        let store = store(4, Duration::from_secs(60));

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        store.insert(key("/a"), response("a"));
        assert!(store.get(&key("/a")).is_some());
    }
}
