//! In-memory TTL cache for prompt-ready search text.
//!
//! Keys are the lowercased, trimmed query. Only successful results are
//! inserted; sentinel text never enters the cache so a transient failure is
//! retried on the next request. Backed by [`moka`] for async-friendly
//! eviction.

use std::time::Duration;

use moka::future::Cache;

/// Maximum number of cached queries.
const MAX_CACHE_ENTRIES: u64 = 100;

/// Normalised cache key for a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from a raw query. Case and surrounding whitespace are ignored.
    pub fn new(query: &str) -> Self {
        Self(query.trim().to_lowercase())
    }
}

/// Per-client result cache.
#[derive(Clone)]
pub struct SearchCache {
    inner: Cache<CacheKey, String>,
}

impl std::fmt::Debug for SearchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

impl SearchCache {
    /// Create a cache with the given TTL, or `None` when `ttl_seconds` is 0.
    pub fn with_ttl(ttl_seconds: u64) -> Option<Self> {
        if ttl_seconds == 0 {
            return None;
        }
        let inner = Cache::builder()
            .max_capacity(MAX_CACHE_ENTRIES)
            .time_to_live(Duration::from_secs(ttl_seconds))
            .build();
        Some(Self { inner })
    }

    /// Look up cached text for `key`.
    pub async fn get(&self, key: &CacheKey) -> Option<String> {
        self.inner.get(key).await
    }

    /// Insert prompt text for `key`.
    pub async fn insert(&self, key: CacheKey, text: String) {
        self.inner.insert(key, text).await;
    }
}
