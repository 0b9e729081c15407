//! Response cache.
//!
//! Entries are keyed by `"{METHOD}:{URL}:{params-json}"` unless the request's
//! [`CacheConfig`](crate::config::CacheConfig) supplies its own key function.
//! Writes are last-write-wins. The cache is unbounded by default and becomes
//! an LRU when the client is built with a capacity.

use crate::config::RequestConfig;
use crate::response::{Body, Response};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Builds the default cache key for a request.
pub(crate) fn cache_key(config: &RequestConfig) -> String {
    let params = config
        .params
        .as_ref()
        .and_then(|params| serde_json::to_string(params).ok())
        .unwrap_or_else(|| "{}".to_string());
    format!("{}:{}:{}", config.resolved_method(), config.url, params)
}

/// A cached response and when it was stored.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub response: Response<Body>,
    pub inserted_at: Instant,
}

impl CacheEntry {
    fn new(response: Response<Body>) -> Self {
        Self {
            response,
            inserted_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() < ttl
    }
}

pub(crate) struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl ResponseCache {
    pub(crate) fn new(capacity: Option<NonZeroUsize>) -> Self {
        let entries = match capacity {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Returns the cached response for `key` if it is younger than `ttl`.
    ///
    /// Stale entries stay in place until overwritten.
    pub(crate) fn get_fresh(&self, key: &str, ttl: Duration) -> Option<Response<Body>> {
        let mut entries = self.entries.lock();
        let entry = entries.get(key)?;
        entry.is_fresh(ttl).then(|| entry.response.clone())
    }

    pub(crate) fn insert(&self, key: String, response: Response<Body>) {
        self.entries.lock().put(key, CacheEntry::new(response));
    }

    pub(crate) fn remove(&self, key: &str) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
