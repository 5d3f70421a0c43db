//! Query-result cache: raw provider responses keyed by provider and normalized lookup.

use moka::future::Cache;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::providers::Provider;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lookup {
    /// Normalized search term (see [`normalize_query`]).
    Search(String),
    /// Provider-native id, untransformed.
    Details(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub provider: Provider,
    pub lookup: Lookup,
}

impl CacheKey {
    pub fn search(provider: Provider, term: &str) -> Self {
        Self { provider, lookup: Lookup::Search(normalize_query(term)) }
    }

    pub fn details(provider: Provider, id: &str) -> Self {
        Self { provider, lookup: Lookup::Details(id.to_string()) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachedResponse {
    Candidates(Vec<Value>),
    Details(Value),
}

pub fn normalize_query(term: &str) -> String {
    term.trim().to_lowercase()
}

#[derive(Clone)]
pub struct QueryCache {
    inner: Cache<CacheKey, Arc<CachedResponse>>,
}

impl QueryCache {
    /// Bounded to `capacity` entries; `ttl` of `None` keeps entries until evicted or cleared.
    pub fn new(capacity: u64, ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder().max_capacity(capacity);
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }
        Self { inner: builder.build() }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Arc<CachedResponse>> {
        self.inner.get(key).await
    }

    /// Stores a successful upstream response. Empty candidate lists are never cached.
    pub async fn put(&self, key: CacheKey, value: CachedResponse) {
        if matches!(&value, CachedResponse::Candidates(c) if c.is_empty()) {
            return;
        }
        tracing::debug!(provider = %key.provider, lookup = ?key.lookup, "caching response");
        self.inner.insert(key, Arc::new(value)).await;
    }

    /// Drops every entry and returns how many there were.
    pub async fn clear(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        let count = self.inner.entry_count();
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
        count
    }

    pub async fn len(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
