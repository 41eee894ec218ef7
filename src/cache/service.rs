//! Read-through/write-through cache orchestration for one table

use crate::cache::key::{Fingerprint, cache_key};
use crate::cache::{CacheStore, DEFAULT_CACHE_LIFETIME};
use crate::core::error::Result;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Caller name whose entry lists the whole table
pub const ALL_CALLER: &str = "all";

/// Cache orchestration for the repository of one table.
///
/// Keys are tagged with the table name. On stores that support tags every
/// write flushes the whole tag; otherwise only the `all` listing is dropped.
#[derive(Clone)]
pub struct CacheService {
    store: Arc<dyn CacheStore>,
    tag: String,
    lifetime: Duration,
}

impl CacheService {
    pub fn new(store: Arc<dyn CacheStore>, tag: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            store,
            tag: tag.into(),
            lifetime,
        }
    }

    /// A service using [`DEFAULT_CACHE_LIFETIME`]
    pub fn with_default_lifetime(store: Arc<dyn CacheStore>, tag: impl Into<String>) -> Self {
        Self::new(store, tag, DEFAULT_CACHE_LIFETIME)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn cache_store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Key for `caller` invoked with `parameters` under the given repository state
    pub fn cache_key(&self, caller: &str, parameters: &Value, fingerprint: &Fingerprint) -> String {
        cache_key(&self.tag, caller, parameters, fingerprint)
    }

    /// Key of the full-table listing
    pub fn all_key(&self, fingerprint: &Fingerprint) -> String {
        self.cache_key(ALL_CALLER, &json!({ "columns": ["*"] }), fingerprint)
    }

    /// Cached value for `key`, if any
    pub async fn retrieve(&self, key: &str) -> Result<Option<Value>> {
        self.store.get(key).await
    }

    /// Serve `key` from the cache, or run `producer` and cache its result
    pub async fn retrieve_or_store<'a>(
        &'a self,
        key: &'a str,
        producer: BoxFuture<'a, Result<Value>>,
    ) -> Result<Value> {
        if let Some(value) = self.store.get(key).await? {
            tracing::debug!(tag = %self.tag, key = %key, "cache hit");
            return Ok(value);
        }
        tracing::debug!(tag = %self.tag, key = %key, "cache miss");
        self.store.remember(key, self.lifetime, producer).await
    }

    /// Write through: drop the listings this write makes stale, then cache
    /// what `producer` yields under `key`
    pub async fn store<'a>(
        &'a self,
        key: &'a str,
        fingerprint: &'a Fingerprint,
        producer: BoxFuture<'a, Result<Value>>,
    ) -> Result<Value> {
        self.invalidate_listings(fingerprint).await?;
        tracing::debug!(tag = %self.tag, key = %key, "cache store");
        self.store.remember(key, self.lifetime, producer).await
    }

    /// Forget `key`, then [`CacheService::store`]
    pub async fn refresh<'a>(
        &'a self,
        key: &'a str,
        fingerprint: &'a Fingerprint,
        producer: BoxFuture<'a, Result<Value>>,
    ) -> Result<Value> {
        self.forget(key).await?;
        self.store(key, fingerprint, producer).await
    }

    /// Invalidate one key
    pub async fn forget(&self, key: &str) -> Result<bool> {
        let removed = self.store.forget(key).await?;
        tracing::debug!(tag = %self.tag, key = %key, removed, "cache forget");
        Ok(removed)
    }

    /// Drop cached listings of this table
    pub async fn invalidate_listings(&self, fingerprint: &Fingerprint) -> Result<()> {
        if self.store.supports_tags() {
            let flushed = self.store.flush_tag(&self.tag).await?;
            tracing::debug!(tag = %self.tag, flushed, "cache tag flushed");
        } else {
            self.forget(&self.all_key(fingerprint)).await?;
        }
        Ok(())
    }
}
