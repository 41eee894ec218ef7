//! RepositoryBuilder for assembling a repository from configuration

use crate::cache::{CacheService, CacheStore, InMemoryCacheStore};
use crate::config::RepositoryConfig;
use crate::core::error::Result;
use crate::query::criteria::CriteriaRegistry;
use crate::repository::{
    CachedRepository, DirectRepository, Repository, RepositoryCore, TransformerRegistry,
};
use crate::storage::DataStore;
use std::sync::Arc;

/// Builder for creating repositories over a data store
///
/// The cache strategy is chosen by `config.cache.enabled`. When caching is on
/// and no cache store was given, an in-memory store is used.
///
/// # Example
///
/// ```ignore
/// let users = RepositoryBuilder::new(store, RepositoryConfig::new("users").cached(30))
///     .with_transformers(TransformerRegistry::new().with("public", HideColumns::new(["password"])))
///     .build()?;
/// ```
pub struct RepositoryBuilder {
    store: Arc<dyn DataStore>,
    config: RepositoryConfig,
    cache_store: Option<Arc<dyn CacheStore>>,
    criteria: CriteriaRegistry,
    transformers: TransformerRegistry,
}

impl RepositoryBuilder {
    pub fn new(store: Arc<dyn DataStore>, config: RepositoryConfig) -> Self {
        Self {
            store,
            config,
            cache_store: None,
            criteria: CriteriaRegistry::with_defaults(),
            transformers: TransformerRegistry::new(),
        }
    }

    /// Share a cache store between repositories
    pub fn with_cache_store(mut self, cache_store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(cache_store);
        self
    }

    /// Replace the criteria available by name
    pub fn with_criteria_registry(mut self, criteria: CriteriaRegistry) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_transformers(mut self, transformers: TransformerRegistry) -> Self {
        self.transformers = transformers;
        self
    }

    fn core(&self) -> Result<RepositoryCore> {
        RepositoryCore::new(
            self.store.clone(),
            self.config.clone(),
            self.criteria.clone(),
            self.transformers.clone(),
        )
    }

    /// Build the strategy the configuration asks for
    pub fn build(self) -> Result<Arc<dyn Repository>> {
        if self.config.cache.enabled {
            Ok(Arc::new(self.build_cached()?))
        } else {
            Ok(Arc::new(self.build_direct()?))
        }
    }

    /// Build a repository that never caches, whatever the configuration says
    pub fn build_direct(self) -> Result<DirectRepository> {
        let core = self.core()?;
        tracing::info!(table = %core.table(), backend = %self.store.backend(), "repository ready");
        Ok(DirectRepository::new(core))
    }

    /// Build a caching repository, whatever the configuration says
    pub fn build_cached(self) -> Result<CachedRepository> {
        let core = self.core()?;
        let cache_store = self
            .cache_store
            .unwrap_or_else(|| Arc::new(InMemoryCacheStore::new()));
        let lifetime = self.config.cache.lifetime();

        tracing::info!(
            table = %core.table(),
            backend = %self.store.backend(),
            cache = %cache_store.backend(),
            lifetime_secs = lifetime.as_secs(),
            "cached repository ready"
        );
        let cache = CacheService::new(cache_store, core.table().to_string(), lifetime);
        Ok(CachedRepository::new(core, cache))
    }
}
