//! The repository surface and its two strategies
//!
//! [`DirectRepository`] runs every operation against the data store.
//! [`CachedRepository`] serves reads through the cache and keeps it
//! consistent on writes. [`RepositoryBuilder`] picks one from configuration.

pub mod builder;
pub mod cached;
pub mod database;
pub mod direct;
pub mod dispatch;
pub mod eager;
pub mod grid;
pub mod transform;

pub use builder::RepositoryBuilder;
pub use cached::CachedRepository;
pub use database::{Condition, RepositoryCore};
pub use direct::DirectRepository;
pub use grid::GridRequest;
pub use transform::{HideColumns, OnlyColumns, Transformer, TransformerRegistry};

use crate::core::error::Result;
use crate::core::field::FieldValue;
use crate::core::pagination::Paginator;
use crate::core::record::{Attributes, Record};
use crate::query::criteria::{CriteriaStack, Criterion};
use crate::query::search::SearchColumns;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Data access for one table.
///
/// Pending criteria and eager loads (`push_criteria`, `with`) apply to the
/// next operation only. Lookups that match nothing return `None` or an empty
/// list. Configured transformers run on every read result.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Shared state and the uncached pipeline
    fn core(&self) -> &RepositoryCore;

    /// Whether reads are served through a cache
    fn is_cached(&self) -> bool;

    fn table(&self) -> &str {
        self.core().table()
    }

    fn push_criteria(&self, criterion: Arc<dyn Criterion>) -> Result<()> {
        self.core().push_criteria(criterion)
    }

    /// Push a criterion from the registry; unknown names are `InvalidCriteria`
    fn push_criteria_by_name(&self, name: &str, args: &Value) -> Result<()> {
        self.core().push_criteria_by_name(name, args)
    }

    /// Remove pending criteria named `name`, or all of them when empty
    fn remove_criteria(&self, name: &str) -> Result<bool> {
        self.core().remove_criteria(name)
    }

    /// Snapshot of the pending criteria
    fn criteria(&self) -> Result<CriteriaStack> {
        self.core().criteria()
    }

    /// Eager-load `relations` with the next operation
    fn with(&self, relations: &[&str]) -> Result<()> {
        self.core().with(relations)
    }

    /// Select the transformer applied to reads; unknown names are
    /// `InvalidTransformer`
    fn set_transformer(&self, name: Option<&str>) -> Result<()> {
        self.core().set_transformer(name)
    }

    async fn all(&self, columns: &[&str]) -> Result<Vec<Record>>;

    async fn find(&self, id: &FieldValue, columns: &[&str]) -> Result<Option<Record>>;

    /// First record whose `column` equals `value`
    async fn find_by(&self, column: &str, value: &FieldValue, columns: &[&str]) -> Result<Option<Record>>;

    /// Records matching every `column = value` pair
    async fn find_where(&self, conditions: &Attributes, columns: &[&str]) -> Result<Vec<Record>>;

    async fn find_many(&self, ids: &[FieldValue], columns: &[&str]) -> Result<Vec<Record>>;

    async fn where_(&self, condition: &Condition, columns: &[&str]) -> Result<Vec<Record>>;

    async fn create(&self, attributes: Attributes) -> Result<Record>;

    async fn update(&self, id: &FieldValue, attributes: Attributes) -> Result<Record>;

    async fn delete(&self, id: &FieldValue) -> Result<bool>;

    async fn count(&self) -> Result<u64>;

    /// First page; `per_page` defaults to the configured page size
    async fn paginate(&self, per_page: Option<usize>, columns: &[&str]) -> Result<Paginator<Record>> {
        self.paginate_page(1, per_page, columns).await
    }

    async fn paginate_page(
        &self,
        page: usize,
        per_page: Option<usize>,
        columns: &[&str],
    ) -> Result<Paginator<Record>>;

    /// Filter, sort and window in one call, with the filtered total
    async fn fetch(&self, request: &GridRequest) -> Result<Paginator<Record>>;

    /// [`Repository::fetch`] without the total
    async fn simple_fetch(&self, request: &GridRequest) -> Result<Vec<Record>>;

    /// Relevance search, best matches first
    async fn search(&self, phrase: &str, columns: &SearchColumns, threshold: Option<f64>) -> Result<Vec<Record>>;

    /// Run an operation by name with JSON parameters
    async fn call(&self, operation: &str, parameters: Value) -> Result<Value> {
        dispatch::call(self, operation, parameters).await
    }
}
