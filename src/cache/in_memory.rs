//! In-memory cache store for testing and single-process deployments

use crate::cache::CacheStore;
use crate::core::error::{CacheError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

const BACKEND: &str = "in_memory";

struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory cache store implementation
///
/// Entries expire lazily: an expired entry is dropped the next time it is
/// read. Tag support can be switched off to behave like a plain key/value
/// store.
#[derive(Clone)]
pub struct InMemoryCacheStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    tags: bool,
}

impl InMemoryCacheStore {
    /// Create a tag-aware in-memory cache store
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            tags: true,
        }
    }

    /// Create a store without tag support
    pub fn without_tags() -> Self {
        Self {
            tags: false,
            ..Self::new()
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unavailable(message: String) -> CacheError {
        CacheError::Unavailable {
            backend: BACKEND.to_string(),
            message,
        }
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = Instant::now();
        {
            let entries = self
                .entries
                .read()
                .map_err(|e| Self::unavailable(format!("Failed to acquire read lock: {}", e)))?;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                None => return Ok(None),
                Some(_) => {}
            }
        }

        let mut entries = self
            .entries
            .write()
            .map_err(|e| Self::unavailable(format!("Failed to acquire write lock: {}", e)))?;
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| Self::unavailable(format!("Failed to acquire write lock: {}", e)))?;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| Self::unavailable(format!("Failed to acquire write lock: {}", e)))?;
        let now = Instant::now();
        Ok(entries.remove(key).is_some_and(|entry| entry.is_live(now)))
    }

    fn supports_tags(&self) -> bool {
        self.tags
    }

    async fn flush_tag(&self, tag: &str) -> Result<u64> {
        if !self.tags {
            return Ok(0);
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|e| Self::unavailable(format!("Failed to acquire write lock: {}", e)))?;
        let prefix = format!("{}.", tag);
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(&prefix));
        Ok((before - entries.len()) as u64)
    }
}
