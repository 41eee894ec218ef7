//! Integration tests for `CachedRepository` using the repository test harness.
//!
//! Runs the shared `Repository` contract against the caching strategy, then
//! checks read-through and write-invalidation behavior against a
//! [`CountingDataStore`].

#[macro_use]
mod repository_harness;

use repository_harness::*;

repository_contract_tests!(cached);

mod cache_behavior {
    use super::*;
    use repository::cache::{CacheService, CacheStore, Fingerprint, InMemoryCacheStore};
    use repository::config::{CriteriaConfig, RepositoryConfig};
    use repository::core::record::attributes;
    use repository::query::builder::Operator;
    use repository::query::criteria::{CriteriaRegistry, WhereCriterion};
    use repository::repository::{
        CachedRepository, GridRequest, Repository, RepositoryBuilder, RepositoryCore,
        TransformerRegistry,
    };
    use std::sync::Arc;
    use std::time::Duration;

    async fn counted(cache: Arc<dyn CacheStore>) -> (Arc<CountingDataStore>, CachedRepository) {
        let counting = Arc::new(CountingDataStore::new(seeded_store().await));
        let repository = cached_with(counting.clone(), cache);
        (counting, repository)
    }

    #[tokio::test]
    async fn test_second_read_skips_the_store() {
        let (counting, repository) = counted(Arc::new(InMemoryCacheStore::new())).await;

        let first = repository.all(&[]).await.unwrap();
        let second = repository.all(&[]).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(counting.reads(), 1);

        let request = GridRequest::new().per_page(5).filter("password", "not");
        let page = repository.fetch(&request).await.unwrap();
        let again = repository.fetch(&request).await.unwrap();
        assert_eq!(page, again);
        assert_eq!(counting.reads(), 3);
    }

    #[tokio::test]
    async fn test_distinct_parameters_use_distinct_entries() {
        let (counting, repository) = counted(Arc::new(InMemoryCacheStore::new())).await;

        repository.find(&id(1), &[]).await.unwrap();
        repository.find(&id(2), &[]).await.unwrap();
        repository.paginate_page(1, Some(5), &[]).await.unwrap();
        repository.paginate_page(2, Some(5), &[]).await.unwrap();
        assert_eq!(counting.reads(), 4);
    }

    #[tokio::test]
    async fn test_criteria_change_the_key() {
        let (counting, repository) = counted(Arc::new(InMemoryCacheStore::new())).await;

        assert_eq!(repository.all(&[]).await.unwrap().len(), USERS);
        repository
            .push_criteria(Arc::new(WhereCriterion::new("active", Operator::Eq, true)))
            .unwrap();
        assert_eq!(repository.all(&[]).await.unwrap().len(), USERS / 2);
        assert_eq!(counting.reads(), 2);

        // Same criteria again: served from the cache, and still consumed
        repository
            .push_criteria(Arc::new(WhereCriterion::new("active", Operator::Eq, true)))
            .unwrap();
        assert_eq!(repository.all(&[]).await.unwrap().len(), USERS / 2);
        assert_eq!(counting.reads(), 2);
        assert!(!repository.criteria().unwrap().has_criteria());
        assert_eq!(repository.all(&[]).await.unwrap().len(), USERS);
    }

    #[tokio::test]
    async fn test_update_refreshes_entity_entry() {
        let cache = Arc::new(InMemoryCacheStore::new());
        let (counting, repository) = counted(cache.clone()).await;

        repository.find(&id(1), &[]).await.unwrap();
        repository
            .update(&id(1), attributes([("name", "Renamed".into())]))
            .await
            .unwrap();

        let found = repository.find(&id(1), &[]).await.unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&"Renamed".into()));
        // The refreshed entry serves the second find
        assert_eq!(counting.reads(), 1);

        let key = repository.entity_key(&id(1), &Fingerprint::default());
        assert!(cache.has(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_forgets_entity_entry() {
        let cache = Arc::new(InMemoryCacheStore::new());
        let (_, repository) = counted(cache.clone()).await;
        let key = repository.entity_key(&id(3), &Fingerprint::default());

        repository.find(&id(3), &[]).await.unwrap();
        assert!(cache.has(&key).await.unwrap());

        assert!(repository.delete(&id(3)).await.unwrap());
        assert!(!cache.has(&key).await.unwrap());
        assert!(repository.find(&id(3), &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writes_flush_tagged_listings() {
        let cache = Arc::new(InMemoryCacheStore::new());
        let (counting, repository) = counted(cache.clone()).await;

        assert_eq!(repository.count().await.unwrap(), USERS as u64);
        repository.create(user_attributes("new@example.com")).await.unwrap();
        assert_eq!(repository.count().await.unwrap(), USERS as u64 + 1);
        assert_eq!(counting.reads(), 2);
    }

    #[tokio::test]
    async fn test_untagged_store_only_drops_all_listing() {
        let cache = Arc::new(InMemoryCacheStore::without_tags());
        let (_, repository) = counted(cache.clone()).await;

        assert_eq!(repository.all(&[]).await.unwrap().len(), USERS);
        assert_eq!(repository.count().await.unwrap(), USERS as u64);
        repository.create(user_attributes("new@example.com")).await.unwrap();

        assert_eq!(repository.all(&[]).await.unwrap().len(), USERS + 1);
        // Other listings stay until their lifetime runs out
        assert_eq!(repository.count().await.unwrap(), USERS as u64);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let counting = Arc::new(CountingDataStore::new(seeded_store().await));
        let core = RepositoryCore::new(
            counting.clone(),
            RepositoryConfig::new("users").cached(30),
            CriteriaRegistry::with_defaults(),
            TransformerRegistry::new(),
        )
        .unwrap();
        let cache = CacheService::new(
            Arc::new(InMemoryCacheStore::new()),
            "users",
            Duration::from_millis(20),
        );
        let repository = CachedRepository::new(core, cache);

        repository.all(&[]).await.unwrap();
        repository.all(&[]).await.unwrap();
        assert_eq!(counting.reads(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        repository.all(&[]).await.unwrap();
        assert_eq!(counting.reads(), 2);
    }

    #[tokio::test]
    async fn test_missing_record_is_not_cached() {
        let (counting, repository) = counted(Arc::new(InMemoryCacheStore::new())).await;
        assert!(repository.find(&id(404), &[]).await.unwrap().is_none());
        assert!(repository.find(&id(404), &[]).await.unwrap().is_none());
        assert_eq!(counting.reads(), 2);
    }

    #[tokio::test]
    async fn test_configured_criteria_share_the_entity_entry() {
        let mut config = RepositoryConfig::new("users").cached(30);
        config.criteria.push(CriteriaConfig {
            name: "order_by".to_string(),
            args: serde_json::json!({ "column": "email" }),
        });
        let repository = RepositoryBuilder::new(seeded_store().await, config)
            .with_cache_store(Arc::new(InMemoryCacheStore::without_tags()))
            .build_cached()
            .unwrap();

        let before = repository.find(&id(1), &[]).await.unwrap().unwrap();
        assert_ne!(before.get("email"), Some(&"renamed@example.com".into()));

        repository
            .update(&id(1), attributes([("email", "renamed@example.com".into())]))
            .await
            .unwrap();
        let after = repository.find(&id(1), &[]).await.unwrap().unwrap();
        assert_eq!(after.get("email"), Some(&"renamed@example.com".into()));

        assert!(repository.delete(&id(1)).await.unwrap());
        assert!(repository.find(&id(1), &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_one_shot_criteria_do_not_shadow_the_entity_entry() {
        let cache = Arc::new(InMemoryCacheStore::without_tags());
        let (_, repository) = counted(cache.clone()).await;

        repository
            .push_criteria(Arc::new(WhereCriterion::new("active", Operator::Eq, true)))
            .unwrap();
        assert!(repository.find(&id(1), &[]).await.unwrap().is_some());
        let key = repository.entity_key(&id(1), &Fingerprint::default());
        assert!(!cache.has(&key).await.unwrap());

        repository
            .update(&id(1), attributes([("name", "Renamed".into())]))
            .await
            .unwrap();
        let found = repository.find(&id(1), &[]).await.unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&"Renamed".into()));
    }
}
