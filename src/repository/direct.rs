//! Repository strategy that always goes to the data store

use crate::core::error::Result;
use crate::core::field::FieldValue;
use crate::core::pagination::Paginator;
use crate::core::record::{Attributes, Record};
use crate::query::search::SearchColumns;
use crate::repository::{Condition, GridRequest, Repository, RepositoryCore};
use async_trait::async_trait;

pub struct DirectRepository {
    core: RepositoryCore,
}

impl DirectRepository {
    pub fn new(core: RepositoryCore) -> Self {
        Self { core }
    }
}

#[async_trait]
impl Repository for DirectRepository {
    fn core(&self) -> &RepositoryCore {
        &self.core
    }

    fn is_cached(&self) -> bool {
        false
    }

    async fn all(&self, columns: &[&str]) -> Result<Vec<Record>> {
        let records = self.core.all(columns).await?;
        self.core.transform_all(records)
    }

    async fn find(&self, id: &FieldValue, columns: &[&str]) -> Result<Option<Record>> {
        let record = self.core.find(id, columns).await?;
        self.core.transform_one(record)
    }

    async fn find_by(&self, column: &str, value: &FieldValue, columns: &[&str]) -> Result<Option<Record>> {
        let record = self.core.find_by(column, value, columns).await?;
        self.core.transform_one(record)
    }

    async fn find_where(&self, conditions: &Attributes, columns: &[&str]) -> Result<Vec<Record>> {
        let records = self.core.find_where(conditions, columns).await?;
        self.core.transform_all(records)
    }

    async fn find_many(&self, ids: &[FieldValue], columns: &[&str]) -> Result<Vec<Record>> {
        let records = self.core.find_many(ids, columns).await?;
        self.core.transform_all(records)
    }

    async fn where_(&self, condition: &Condition, columns: &[&str]) -> Result<Vec<Record>> {
        let records = self.core.where_(condition, columns).await?;
        self.core.transform_all(records)
    }

    async fn create(&self, attributes: Attributes) -> Result<Record> {
        self.core.create(attributes).await
    }

    async fn update(&self, id: &FieldValue, attributes: Attributes) -> Result<Record> {
        self.core.update(id, attributes).await
    }

    async fn delete(&self, id: &FieldValue) -> Result<bool> {
        self.core.delete(id).await
    }

    async fn count(&self) -> Result<u64> {
        self.core.count().await
    }

    async fn paginate_page(
        &self,
        page: usize,
        per_page: Option<usize>,
        columns: &[&str],
    ) -> Result<Paginator<Record>> {
        let paginator = self.core.paginate(page, per_page, columns).await?;
        self.core.transform_page(paginator)
    }

    async fn fetch(&self, request: &GridRequest) -> Result<Paginator<Record>> {
        let paginator = self.core.fetch(request).await?;
        self.core.transform_page(paginator)
    }

    async fn simple_fetch(&self, request: &GridRequest) -> Result<Vec<Record>> {
        let records = self.core.simple_fetch(request).await?;
        self.core.transform_all(records)
    }

    async fn search(&self, phrase: &str, columns: &SearchColumns, threshold: Option<f64>) -> Result<Vec<Record>> {
        let records = self.core.search(phrase, columns, threshold).await?;
        self.core.transform_all(records)
    }
}
