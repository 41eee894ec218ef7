//! Data store abstraction and its implementations

mod evaluate;
pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryDataStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDataStore;

use crate::core::error::Result;
use crate::core::field::FieldValue;
use crate::core::pagination::Paginator;
use crate::core::record::{Attributes, Record};
use crate::core::schema::Schema;
use crate::query::builder::Query;
use async_trait::async_trait;

/// The query backend repositories run against.
///
/// `columns` arguments select output columns; an empty list or `*` keeps
/// every column. Lookups that match nothing return `None` or an empty list.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Short backend name used in errors and logs
    fn backend(&self) -> &'static str;

    /// Tables, keys and relations this store knows about
    fn schema(&self) -> &Schema;

    /// Fetch one record by primary key
    async fn find(&self, table: &str, id: &FieldValue, columns: &[&str]) -> Result<Option<Record>>;

    /// Fetch every record matching a query, honouring its order and window
    async fn get(&self, query: &Query, columns: &[&str]) -> Result<Vec<Record>>;

    /// Count records matching a query, ignoring its order and window
    async fn count(&self, query: &Query) -> Result<u64>;

    /// One page of a query together with the unwindowed total
    async fn paginate(
        &self,
        query: &Query,
        per_page: usize,
        page: usize,
        columns: &[&str],
    ) -> Result<Paginator<Record>> {
        let total = self.count(query).await?;
        let items = self
            .get(&query.clone().for_page(page, per_page), columns)
            .await?;
        Ok(Paginator::new(items, total, per_page, page))
    }

    /// Insert a record; the store assigns the primary key when it is absent
    async fn create(&self, table: &str, attributes: Attributes) -> Result<Record>;

    /// Overwrite attributes of an existing record
    async fn update(&self, table: &str, id: &FieldValue, attributes: Attributes) -> Result<Record>;

    /// Delete a record, returning whether one existed
    async fn delete(&self, table: &str, id: &FieldValue) -> Result<bool>;
}
