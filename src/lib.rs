//! # This-RS Repository
//!
//! A repository layer over pluggable data stores, with read-through caching,
//! one-shot criteria and filter/sort/paginate grids.
//!
//! ## Features
//!
//! - **Two Strategies**: [`repository::DirectRepository`] always queries the store,
//!   [`repository::CachedRepository`] serves reads from a cache store
//! - **Deterministic Cache Keys**: operation, parameters and pending state hash to `table.sha256`
//! - **Criteria Stack**: reusable query constraints applied to the next operation only
//! - **Grid Requests**: filter and sort on columns and relation paths (`password.token`), then paginate
//! - **Relevance Search**: weighted multi-column scoring with a threshold
//! - **Transformers**: named post-processing of every read result
//! - **Configuration-Based**: repositories and schemas from YAML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use repository::prelude::*;
//!
//! let schema = Schema::new()
//!     .with_table(TableSchema::new("users", "id").columns(["id", "email"])
//!         .has_one("password", "password_resets", "user_id", "id"))
//!     .with_table(TableSchema::new("password_resets", "id").columns(["id", "user_id", "token"]));
//!
//! let store = Arc::new(InMemoryDataStore::new(schema));
//! let users = RepositoryBuilder::new(store, RepositoryConfig::new("users").cached(30)).build()?;
//!
//! let page = users
//!     .fetch(&GridRequest::new().filter("password.token", "not").per_page(5))
//!     .await?;
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod logging;
pub mod query;
pub mod repository;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core Types ===
    pub use crate::core::{
        error::{RepositoryError, Result},
        field::FieldValue,
        pagination::Paginator,
        record::{Attributes, Record, attributes},
        schema::{Relation, RelationKind, Schema, TableSchema},
    };

    // === Configuration ===
    pub use crate::config::{CacheConfig, CriteriaConfig, RepositoryConfig, SchemaConfig};

    // === Query Composition ===
    pub use crate::query::{
        CriteriaRegistry, CriteriaStack, Criterion, Direction, FilterSpec, FnCriterion, Operator,
        OrderByCriterion, Query, SearchColumns, SortSpec, WhereCriterion,
    };

    // === Repositories ===
    pub use crate::repository::{
        CachedRepository, Condition, DirectRepository, GridRequest, HideColumns, OnlyColumns,
        Repository, RepositoryBuilder, Transformer, TransformerRegistry,
    };

    // === Stores ===
    pub use crate::cache::{CacheService, CacheStore, InMemoryCacheStore};
    pub use crate::storage::{DataStore, InMemoryDataStore};

    #[cfg(feature = "postgres")]
    pub use crate::storage::PostgresDataStore;

    // === Common Dependencies ===
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;
}
