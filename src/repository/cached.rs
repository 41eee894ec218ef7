//! Repository strategy that serves reads through the cache
//!
//! Reads are keyed by operation name, parameters and the pending repository
//! state (criteria and eager loads). A hit never touches the data store and
//! drops the pending criteria, since the cached result already reflects them.
//! Writes go to the store first, then refresh the entity's entry and drop
//! the table's listings.

use crate::cache::{CacheService, Fingerprint};
use crate::core::error::{CacheError, RepositoryError, Result};
use crate::core::field::FieldValue;
use crate::core::pagination::Paginator;
use crate::core::record::{Attributes, Record, is_wildcard};
use crate::query::search::SearchColumns;
use crate::repository::{Condition, GridRequest, Repository, RepositoryCore};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Caller name of single-entity entries
const FIND_CALLER: &str = "find";

/// Caller name of `find` run under one-shot criteria
const SCOPED_FIND_CALLER: &str = "find_scoped";

pub struct CachedRepository {
    core: RepositoryCore,
    cache: CacheService,
}

impl CachedRepository {
    pub fn new(core: RepositoryCore, cache: CacheService) -> Self {
        Self { core, cache }
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    /// Key of the entry `find(id)` reads and writes refresh
    pub fn entity_key(&self, id: &FieldValue, fingerprint: &Fingerprint) -> String {
        self.cache
            .cache_key(FIND_CALLER, &json!({ "identifier": id }), fingerprint)
    }

    /// Serve `caller(parameters)` from the cache or run `producer`
    async fn read_through<'a, T>(
        &'a self,
        caller: &'a str,
        parameters: Value,
        producer: BoxFuture<'a, Result<Value>>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let fingerprint = self.core.fingerprint()?;
        self.read_keyed(caller, parameters, &fingerprint, producer).await
    }

    async fn read_keyed<'a, T>(
        &'a self,
        caller: &'a str,
        parameters: Value,
        fingerprint: &Fingerprint,
        producer: BoxFuture<'a, Result<Value>>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let key = self.cache.cache_key(caller, &parameters, fingerprint);
        let value = self.cache.retrieve_or_store(&key, producer).await?;
        // On a hit the producer never ran; on a miss it already took the state
        self.core.discard()?;
        decode(&key, value)
    }
}

fn encode<T: Serialize>(caller: &str, value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| {
        CacheError::Serialization {
            key: caller.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        CacheError::Serialization {
            key: key.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

fn column_list(columns: &[&str]) -> Vec<String> {
    if is_wildcard(columns) {
        vec!["*".to_string()]
    } else {
        columns.iter().map(|c| c.to_string()).collect()
    }
}

#[async_trait]
impl Repository for CachedRepository {
    fn core(&self) -> &RepositoryCore {
        &self.core
    }

    fn is_cached(&self) -> bool {
        true
    }

    async fn all(&self, columns: &[&str]) -> Result<Vec<Record>> {
        let parameters = json!({ "columns": column_list(columns) });
        let producer: BoxFuture<'_, Result<Value>> = Box::pin(async move {
            let records = self.core.all(columns).await?;
            encode("all", &records)
        });
        let records = self.read_through("all", parameters, producer).await?;
        self.core.transform_all(records)
    }

    async fn find(&self, id: &FieldValue, columns: &[&str]) -> Result<Option<Record>> {
        let parameters = json!({ "identifier": id });
        let producer: BoxFuture<'_, Result<Value>> = Box::pin(async move {
            let record = self.core.find(id, &[]).await?;
            encode(FIND_CALLER, &record)
        });
        // Writes refresh the entity entry, so one-shot criteria must not reach its key
        let record: Option<Record> = if self.core.has_pending_criteria()? {
            self.read_through(SCOPED_FIND_CALLER, parameters, producer).await?
        } else {
            let fingerprint = self.core.entity_fingerprint()?;
            self.read_keyed(FIND_CALLER, parameters, &fingerprint, producer)
                .await?
        };
        self.core.transform_one(record.map(|r| r.only(columns)))
    }

    async fn find_by(&self, column: &str, value: &FieldValue, columns: &[&str]) -> Result<Option<Record>> {
        let parameters = json!({ "column": column, "value": value, "columns": column_list(columns) });
        let producer: BoxFuture<'_, Result<Value>> = Box::pin(async move {
            let record = self.core.find_by(column, value, columns).await?;
            encode("find_by", &record)
        });
        let record = self.read_through("find_by", parameters, producer).await?;
        self.core.transform_one(record)
    }

    async fn find_where(&self, conditions: &Attributes, columns: &[&str]) -> Result<Vec<Record>> {
        let parameters = json!({ "conditions": conditions, "columns": column_list(columns) });
        let producer: BoxFuture<'_, Result<Value>> = Box::pin(async move {
            let records = self.core.find_where(conditions, columns).await?;
            encode("find_where", &records)
        });
        let records = self.read_through("find_where", parameters, producer).await?;
        self.core.transform_all(records)
    }

    async fn find_many(&self, ids: &[FieldValue], columns: &[&str]) -> Result<Vec<Record>> {
        let parameters = json!({ "identifiers": ids, "columns": column_list(columns) });
        let producer: BoxFuture<'_, Result<Value>> = Box::pin(async move {
            let records = self.core.find_many(ids, columns).await?;
            encode("find_many", &records)
        });
        let records = self.read_through("find_many", parameters, producer).await?;
        self.core.transform_all(records)
    }

    async fn where_(&self, condition: &Condition, columns: &[&str]) -> Result<Vec<Record>> {
        let parameters = json!({ "condition": condition, "columns": column_list(columns) });
        let producer: BoxFuture<'_, Result<Value>> = Box::pin(async move {
            let records = self.core.where_(condition, columns).await?;
            encode("where", &records)
        });
        let records = self.read_through("where", parameters, producer).await?;
        self.core.transform_all(records)
    }

    async fn create(&self, attributes: Attributes) -> Result<Record> {
        let fingerprint = self.core.entity_fingerprint()?;
        let record = self.core.create(attributes).await?;

        let key = self.entity_key(&record.key(), &fingerprint);
        let value = encode("create", &record)?;
        self.cache
            .store(&key, &fingerprint, Box::pin(async move { Ok::<_, RepositoryError>(value) }))
            .await?;
        Ok(record)
    }

    async fn update(&self, id: &FieldValue, attributes: Attributes) -> Result<Record> {
        let fingerprint = self.core.entity_fingerprint()?;
        let key = self.entity_key(id, &fingerprint);
        let producer: BoxFuture<'_, Result<Value>> = Box::pin(async move {
            let record = self.core.update(id, attributes).await?;
            encode("update", &record)
        });
        let value = self.cache.refresh(&key, &fingerprint, producer).await?;
        decode(&key, value)
    }

    async fn delete(&self, id: &FieldValue) -> Result<bool> {
        let fingerprint = self.core.entity_fingerprint()?;
        let deleted = self.core.delete(id).await?;

        self.cache.forget(&self.entity_key(id, &fingerprint)).await?;
        self.cache.invalidate_listings(&fingerprint).await?;
        Ok(deleted)
    }

    async fn count(&self) -> Result<u64> {
        let producer: BoxFuture<'_, Result<Value>> = Box::pin(async move {
            let total = self.core.count().await?;
            encode("count", &total)
        });
        self.read_through("count", json!({}), producer).await
    }

    async fn paginate_page(
        &self,
        page: usize,
        per_page: Option<usize>,
        columns: &[&str],
    ) -> Result<Paginator<Record>> {
        let per_page = per_page.unwrap_or(self.core.config().per_page);
        let parameters = json!({ "page": page, "per_page": per_page, "columns": column_list(columns) });
        let producer: BoxFuture<'_, Result<Value>> = Box::pin(async move {
            let paginator = self.core.paginate(page, Some(per_page), columns).await?;
            encode("paginate", &paginator)
        });
        let paginator = self.read_through("paginate", parameters, producer).await?;
        self.core.transform_page(paginator)
    }

    async fn fetch(&self, request: &GridRequest) -> Result<Paginator<Record>> {
        let parameters = json!({
            "request": request,
            "per_page": request.page_size(self.core.config().per_page),
        });
        let producer: BoxFuture<'_, Result<Value>> = Box::pin(async move {
            let paginator = self.core.fetch(request).await?;
            encode("fetch", &paginator)
        });
        let paginator = self.read_through("fetch", parameters, producer).await?;
        self.core.transform_page(paginator)
    }

    async fn simple_fetch(&self, request: &GridRequest) -> Result<Vec<Record>> {
        let parameters = json!({
            "request": request,
            "per_page": request.page_size(self.core.config().per_page),
        });
        let producer: BoxFuture<'_, Result<Value>> = Box::pin(async move {
            let records = self.core.simple_fetch(request).await?;
            encode("simple_fetch", &records)
        });
        let records = self.read_through("simple_fetch", parameters, producer).await?;
        self.core.transform_all(records)
    }

    async fn search(&self, phrase: &str, columns: &SearchColumns, threshold: Option<f64>) -> Result<Vec<Record>> {
        let parameters = json!({ "phrase": phrase, "columns": columns, "threshold": threshold });
        let producer: BoxFuture<'_, Result<Value>> = Box::pin(async move {
            let records = self.core.search(phrase, columns, threshold).await?;
            encode("search", &records)
        });
        let records = self.read_through("search", parameters, producer).await?;
        self.core.transform_all(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, InMemoryCacheStore};
    use crate::config::RepositoryConfig;
    use crate::core::record::attributes;
    use crate::core::schema::{Schema, TableSchema};
    use crate::query::criteria::CriteriaRegistry;
    use crate::repository::TransformerRegistry;
    use crate::storage::{DataStore, InMemoryDataStore};
    use std::sync::Arc;

    async fn repository(store: Arc<dyn CacheStore>) -> CachedRepository {
        let data = Arc::new(InMemoryDataStore::new(
            Schema::new().with_table(TableSchema::new("users", "id").columns(["id", "email"])),
        ));
        for i in 1..=3 {
            data.create("users", attributes([("email", format!("u{}@x.io", i).into())]))
                .await
                .unwrap();
        }
        let core = RepositoryCore::new(
            data,
            RepositoryConfig::new("users").cached(30),
            CriteriaRegistry::with_defaults(),
            TransformerRegistry::new(),
        )
        .unwrap();
        CachedRepository::new(core, CacheService::with_default_lifetime(store, "users"))
    }

    #[tokio::test]
    async fn test_find_projects_after_cache() {
        let store = Arc::new(InMemoryCacheStore::new());
        let repository = repository(store.clone()).await;

        let full = repository.find(&FieldValue::Integer(1), &[]).await.unwrap().unwrap();
        let email = repository
            .find(&FieldValue::Integer(1), &["email"])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(full.attributes().len(), 2);
        assert_eq!(email.attributes().len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_record_is_not_cached() {
        let store = Arc::new(InMemoryCacheStore::new());
        let repository = repository(store.clone()).await;
        assert!(repository.find(&FieldValue::Integer(42), &[]).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_create_caches_entity_and_drops_listing() {
        let store = Arc::new(InMemoryCacheStore::without_tags());
        let repository = repository(store.clone()).await;

        assert_eq!(repository.all(&[]).await.unwrap().len(), 3);
        let all_key = repository.cache().all_key(&Fingerprint::default());
        assert!(store.has(&all_key).await.unwrap());

        let created = repository
            .create(attributes([("email", "new@x.io".into())]))
            .await
            .unwrap();
        assert!(!store.has(&all_key).await.unwrap());

        let key = repository.entity_key(&created.key(), &Fingerprint::default());
        assert!(store.has(&key).await.unwrap());
        assert_eq!(repository.all(&[]).await.unwrap().len(), 4);
    }
}
