//! Shared test harness for repository testing
//!
//! Provides the `users` / `password_resets` schema, a seeded in-memory store,
//! [`CountingDataStore`] to observe store traffic, and builders for both
//! repository strategies.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod repository_harness;
//! use repository_harness::*;
//! ```

#![allow(dead_code)]

pub mod contract_tests;

use async_trait::async_trait;
use repository::cache::{CacheStore, InMemoryCacheStore};
use repository::config::RepositoryConfig;
use repository::core::error::Result;
use repository::core::field::FieldValue;
use repository::core::pagination::Paginator;
use repository::core::record::{Attributes, Record, attributes};
use repository::core::schema::{Schema, TableSchema};
use repository::query::builder::Query;
use repository::repository::{CachedRepository, DirectRepository, Repository, RepositoryBuilder};
use repository::storage::{DataStore, InMemoryDataStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of seeded users
pub const USERS: usize = 20;

/// Seeded users whose password contains "not"
pub const NOT_SECRET_USERS: usize = 5;

/// `users` has one `password` (its reset token row); `password_resets`
/// belongs to `user`.
pub fn schema() -> Schema {
    Schema::new()
        .with_table(
            TableSchema::new("users", "id")
                .columns(["id", "email", "name", "password", "active"])
                .has_one("password", "password_resets", "user_id", "id"),
        )
        .with_table(
            TableSchema::new("password_resets", "id")
                .columns(["id", "user_id", "token"])
                .belongs_to("user", "users", "user_id", "id"),
        )
}

/// Token of user `i`; tokens sort in reverse user order
pub fn token_for(i: usize) -> String {
    format!("token-{:02}", USERS + 1 - i)
}

/// Insert [`USERS`] users. The first [`NOT_SECRET_USERS`] have a
/// `notSecret` password, odd users are active, every user has one token.
pub async fn seed(store: &dyn DataStore) {
    for i in 1..=USERS {
        let password = if i <= NOT_SECRET_USERS {
            format!("notSecret{}", i)
        } else {
            format!("hunter{}", i)
        };
        let user = store
            .create(
                "users",
                attributes([
                    ("email", format!("user{}@example.com", i).into()),
                    ("name", format!("User {}", i).into()),
                    ("password", password.into()),
                    ("active", (i % 2 == 1).into()),
                ]),
            )
            .await
            .unwrap();
        store
            .create(
                "password_resets",
                attributes([("user_id", user.key()), ("token", token_for(i).into())]),
            )
            .await
            .unwrap();
    }
}

/// Insert `count` bare users without tokens
pub async fn add_users(store: &dyn DataStore, count: usize) {
    for i in 1..=count {
        store
            .create(
                "users",
                attributes([
                    ("email", format!("user{}@example.com", i).into()),
                    ("active", true.into()),
                ]),
            )
            .await
            .unwrap();
    }
}

/// In-memory store holding the [`seed`] data
pub async fn seeded_store() -> Arc<InMemoryDataStore> {
    let store = Arc::new(InMemoryDataStore::new(schema()));
    seed(store.as_ref()).await;
    store
}

/// In-memory store with `count` bare users
pub async fn store_with_users(count: usize) -> Arc<InMemoryDataStore> {
    let store = Arc::new(InMemoryDataStore::new(schema()));
    add_users(store.as_ref(), count).await;
    store
}

pub fn user_attributes(email: &str) -> Attributes {
    attributes([
        ("email", email.into()),
        ("name", "New".into()),
        ("password", "changeme".into()),
        ("active", true.into()),
    ])
}

pub fn id(i: i64) -> FieldValue {
    FieldValue::Integer(i)
}

pub fn ids(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|r| r.key().as_integer())
        .collect()
}

/// Repository over `store` without caching
pub fn direct(store: Arc<dyn DataStore>) -> Arc<dyn Repository> {
    RepositoryBuilder::new(store, RepositoryConfig::new("users"))
        .build()
        .unwrap()
}

/// Repository over `store` caching into `cache`
pub fn cached_with(store: Arc<dyn DataStore>, cache: Arc<dyn CacheStore>) -> CachedRepository {
    RepositoryBuilder::new(store, RepositoryConfig::new("users").cached(30))
        .with_cache_store(cache)
        .build_cached()
        .unwrap()
}

pub fn cached(store: Arc<dyn DataStore>) -> Arc<dyn Repository> {
    Arc::new(cached_with(store, Arc::new(InMemoryCacheStore::new())))
}

pub fn direct_repository(store: Arc<dyn DataStore>) -> DirectRepository {
    RepositoryBuilder::new(store, RepositoryConfig::new("users"))
        .build_direct()
        .unwrap()
}

// ---------------------------------------------------------------------------
// CountingDataStore: records how often reads reach the store
// ---------------------------------------------------------------------------

/// Wraps a store and counts read calls (`find`, `get`, `count`, `paginate`)
pub struct CountingDataStore {
    inner: Arc<dyn DataStore>,
    reads: AtomicUsize,
}

impl CountingDataStore {
    pub fn new(inner: Arc<dyn DataStore>) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataStore for CountingDataStore {
    fn backend(&self) -> &'static str {
        "counting"
    }

    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    async fn find(&self, table: &str, id: &FieldValue, columns: &[&str]) -> Result<Option<Record>> {
        self.hit();
        self.inner.find(table, id, columns).await
    }

    async fn get(&self, query: &Query, columns: &[&str]) -> Result<Vec<Record>> {
        self.hit();
        self.inner.get(query, columns).await
    }

    async fn count(&self, query: &Query) -> Result<u64> {
        self.hit();
        self.inner.count(query).await
    }

    async fn paginate(
        &self,
        query: &Query,
        per_page: usize,
        page: usize,
        columns: &[&str],
    ) -> Result<Paginator<Record>> {
        self.hit();
        self.inner.paginate(query, per_page, page, columns).await
    }

    async fn create(&self, table: &str, attributes: Attributes) -> Result<Record> {
        self.inner.create(table, attributes).await
    }

    async fn update(&self, table: &str, id: &FieldValue, attributes: Attributes) -> Result<Record> {
        self.inner.update(table, id, attributes).await
    }

    async fn delete(&self, table: &str, id: &FieldValue) -> Result<bool> {
        self.inner.delete(table, id).await
    }
}
