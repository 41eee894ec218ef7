//! Cache stores and the read-through/write-through orchestration on top

pub mod in_memory;
pub mod key;
pub mod service;

pub use in_memory::InMemoryCacheStore;
pub use key::{Fingerprint, cache_key};
pub use service::CacheService;

use crate::core::error::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::time::Duration;

/// Default lifetime of a cached entry
pub const DEFAULT_CACHE_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Key/value cache with per-entry expiry.
///
/// Expired entries behave exactly like absent ones. Stores that can group
/// keys report it through [`CacheStore::supports_tags`]; a key's tag is the
/// segment before its first `.`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend name used in errors and logs
    fn backend(&self) -> &'static str;

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Remove a key, returning whether it was present
    async fn forget(&self, key: &str) -> Result<bool>;

    /// Return the cached value, or run `producer` and cache what it yields.
    ///
    /// A `null` result is returned but not cached.
    async fn remember<'a>(
        &'a self,
        key: &'a str,
        ttl: Duration,
        producer: BoxFuture<'a, Result<Value>>,
    ) -> Result<Value> {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }
        let value = producer.await?;
        if !value.is_null() {
            self.put(key, value.clone(), ttl).await?;
        }
        Ok(value)
    }

    fn supports_tags(&self) -> bool {
        false
    }

    /// Remove every key tagged `tag`, returning how many were removed
    async fn flush_tag(&self, _tag: &str) -> Result<u64> {
        Ok(0)
    }
}
