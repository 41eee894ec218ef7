//! The direct query pipeline shared by every repository strategy
//!
//! [`RepositoryCore`] owns the per-repository state (pending criteria,
//! pending eager loads, the active transformer) and runs operations straight
//! against the data store. Results leave it untransformed so the cached
//! strategy can store them as they came from the store.

use crate::cache::Fingerprint;
use crate::config::RepositoryConfig;
use crate::core::error::{ModelError, RepositoryError, Result, StorageError};
use crate::core::field::FieldValue;
use crate::core::pagination::Paginator;
use crate::core::record::{Attributes, Record};
use crate::core::schema::Schema;
use crate::query::builder::{Boolean, ColumnRef, Operator, Predicate, Query, Where};
use crate::query::criteria::{CriteriaRegistry, CriteriaStack, Criterion};
use crate::query::search::{SearchColumns, apply_search};
use crate::repository::eager;
use crate::repository::grid::{self, GridRequest, SearchSettings};
use crate::repository::transform::{NamedTransformer, TransformerRegistry};
use crate::storage::DataStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

const LOCK_OWNER: &str = "repository";

fn default_operator() -> String {
    "=".to_string()
}

/// A single `where` condition.
///
/// `operator` is one of `=`, `!=`, `<`, `<=`, `>`, `>=`, `like` or `in`;
/// `in` takes an array value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub boolean: Boolean,
}

impl Condition {
    pub fn new(column: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator: operator.into(),
            value: value.into(),
            boolean: Boolean::And,
        }
    }

    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, "=", value)
    }

    pub fn or(mut self) -> Self {
        self.boolean = Boolean::Or;
        self
    }

    pub fn apply(&self, query: Query, schema: &Schema) -> Result<Query> {
        let column = ColumnRef::parse(&self.column);
        if column.table.is_none() {
            schema.table(&query.table)?.ensure_column(&column.column)?;
        }

        let predicate = if self.operator.trim().eq_ignore_ascii_case("in") {
            let values = match &self.value {
                Value::Array(items) => items.iter().map(FieldValue::from_json).collect(),
                other => vec![FieldValue::from_json(other)],
            };
            Predicate::In { column, values }
        } else {
            Predicate::Compare {
                column,
                operator: Operator::from_str(&self.operator)?,
                value: FieldValue::from_json(&self.value),
            }
        };
        Ok(query.push_where(Where {
            boolean: self.boolean,
            predicate,
        }))
    }
}

/// State consumed by the next operation
#[derive(Debug, Default)]
struct Pending {
    criteria: CriteriaStack,
    eager: Vec<String>,
}

/// What one operation took from the pending state
pub(crate) struct Operation {
    criteria: CriteriaStack,
    eager: Vec<String>,
}

/// Per-repository state and the uncached pipeline
pub struct RepositoryCore {
    config: RepositoryConfig,
    store: Arc<dyn DataStore>,
    registry: CriteriaRegistry,
    transformers: TransformerRegistry,
    defaults: Vec<Arc<dyn Criterion>>,
    pending: Mutex<Pending>,
    transformer: Mutex<Option<NamedTransformer>>,
}

impl RepositoryCore {
    /// Check the configured table against the store's schema and resolve the
    /// configured criteria and transformer
    pub fn new(
        store: Arc<dyn DataStore>,
        config: RepositoryConfig,
        registry: CriteriaRegistry,
        transformers: TransformerRegistry,
    ) -> Result<Self> {
        config.validate()?;
        validate_model(store.schema(), &config.table)?;

        let defaults = config
            .criteria
            .iter()
            .map(|c| registry.make(&c.name, &c.args))
            .collect::<Result<Vec<_>>>()?;
        let transformer = config
            .transformer
            .as_deref()
            .map(|name| transformers.resolve(name))
            .transpose()?;

        Ok(Self {
            config,
            store,
            registry,
            transformers,
            defaults,
            pending: Mutex::new(Pending::default()),
            transformer: Mutex::new(transformer),
        })
    }

    pub fn table(&self) -> &str {
        &self.config.table
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub fn schema(&self) -> &Schema {
        self.store.schema()
    }

    fn pending(&self) -> Result<MutexGuard<'_, Pending>> {
        self.pending.lock().map_err(|e| {
            StorageError::Unavailable {
                backend: LOCK_OWNER.to_string(),
                message: format!("Failed to acquire criteria lock: {}", e),
            }
            .into()
        })
    }

    fn active_transformer(&self) -> Result<MutexGuard<'_, Option<NamedTransformer>>> {
        self.transformer.lock().map_err(|e| {
            StorageError::Unavailable {
                backend: LOCK_OWNER.to_string(),
                message: format!("Failed to acquire transformer lock: {}", e),
            }
            .into()
        })
    }

    // === Criteria, eager loads and transformer ===

    pub fn push_criteria(&self, criterion: Arc<dyn Criterion>) -> Result<()> {
        tracing::debug!(table = %self.table(), criteria = %criterion.name(), "criteria pushed");
        self.pending()?.criteria.add_criteria(criterion);
        Ok(())
    }

    /// Build a registered criterion and push it; unknown names fail with
    /// `InvalidCriteria` and leave the stack untouched
    pub fn push_criteria_by_name(&self, name: &str, args: &Value) -> Result<()> {
        let criterion = self.registry.make(name, args)?;
        self.push_criteria(criterion)
    }

    pub fn remove_criteria(&self, name: &str) -> Result<bool> {
        Ok(self.pending()?.criteria.remove_criteria(name))
    }

    /// Snapshot of the pending criteria
    pub fn criteria(&self) -> Result<CriteriaStack> {
        Ok(self.pending()?.criteria.clone())
    }

    /// Load `relations` with the next operation
    pub fn with(&self, relations: &[&str]) -> Result<()> {
        let mut pending = self.pending()?;
        for relation in relations {
            if !pending.eager.iter().any(|r| r.as_str() == *relation) {
                pending.eager.push(relation.to_string());
            }
        }
        Ok(())
    }

    /// Switch to the transformer registered as `name`, or turn
    /// transformation off with `None`
    pub fn set_transformer(&self, name: Option<&str>) -> Result<()> {
        let transformer = name.map(|name| self.transformers.resolve(name)).transpose()?;
        *self.active_transformer()? = transformer;
        Ok(())
    }

    /// Eager loads the next operation will run: configured ones first
    fn eager_list(&self, pending: &Pending) -> Vec<String> {
        let mut eager = self.config.eager.clone();
        for relation in &pending.eager {
            if !eager.contains(relation) {
                eager.push(relation.clone());
            }
        }
        eager
    }

    fn default_fingerprints(&self) -> Vec<Value> {
        self.defaults
            .iter()
            .map(|c| serde_json::json!({ "name": c.name(), "state": c.fingerprint() }))
            .collect()
    }

    /// Cache-key fingerprint of the next operation, without consuming it
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        let pending = self.pending()?;
        let mut criteria = self.default_fingerprints();
        criteria.extend(pending.criteria.fingerprints());
        Ok(Fingerprint::new(self.eager_list(&pending), criteria))
    }

    /// Fingerprint shared by `find(id)` entries and the writes that refresh
    /// them: configured criteria and eager loads, never one-shot criteria
    pub fn entity_fingerprint(&self) -> Result<Fingerprint> {
        let pending = self.pending()?;
        Ok(Fingerprint::new(self.eager_list(&pending), self.default_fingerprints()))
    }

    /// Whether one-shot criteria are waiting for the next operation
    pub fn has_pending_criteria(&self) -> Result<bool> {
        Ok(self.pending()?.criteria.has_criteria())
    }

    /// Drop pending criteria and eager loads without running them
    pub fn discard(&self) -> Result<()> {
        let mut pending = self.pending()?;
        pending.criteria.discard();
        pending.eager.clear();
        Ok(())
    }

    fn begin(&self) -> Result<Operation> {
        let mut pending = self.pending()?;
        let eager = self.eager_list(&pending);
        pending.eager.clear();
        Ok(Operation {
            criteria: pending.criteria.take(),
            eager,
        })
    }

    /// Base query with configured and pending criteria applied
    fn base_query(&self, operation: &mut Operation) -> Result<Query> {
        let schema = self.schema();
        let query = self
            .defaults
            .iter()
            .try_fold(Query::table(self.table()), |query, criterion| {
                criterion.apply(query, schema)
            })?;
        operation.criteria.execute_on(query, schema)
    }

    async fn load(&self, operation: &Operation, records: Vec<Record>, columns: &[&str]) -> Result<Vec<Record>> {
        let records = eager::load(self.store.as_ref(), records, &operation.eager).await?;
        Ok(records.into_iter().map(|r| r.only(columns)).collect())
    }

    async fn first(&self, operation: Operation, query: Query, columns: &[&str]) -> Result<Option<Record>> {
        let query = query.for_page(1, 1);
        let records = self.store.get(&query, &[]).await?;
        let mut loaded = self.load(&operation, records, columns).await?;
        Ok((!loaded.is_empty()).then(|| loaded.swap_remove(0)))
    }

    // === Transformation ===

    pub fn transform_all(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        match self.active_transformer()?.as_ref() {
            Some(transformer) => transformer.apply_all(records),
            None => Ok(records),
        }
    }

    pub fn transform_one(&self, record: Option<Record>) -> Result<Option<Record>> {
        let transformer = self.active_transformer()?;
        match (transformer.as_ref(), record) {
            (Some(transformer), Some(record)) => transformer.apply(record).map(Some),
            (_, record) => Ok(record),
        }
    }

    pub fn transform_page(&self, page: Paginator<Record>) -> Result<Paginator<Record>> {
        match self.active_transformer()?.as_ref() {
            Some(transformer) => transformer.apply_page(page),
            None => Ok(page),
        }
    }

    // === Reads ===

    pub async fn all(&self, columns: &[&str]) -> Result<Vec<Record>> {
        let mut operation = self.begin()?;
        let query = self.base_query(&mut operation)?;
        let records = self.store.get(&query, &[]).await?;
        self.load(&operation, records, columns).await
    }

    pub async fn find(&self, id: &FieldValue, columns: &[&str]) -> Result<Option<Record>> {
        let mut operation = self.begin()?;
        if self.defaults.is_empty() && !operation.criteria.has_criteria() {
            let record = self.store.find(self.table(), id, &[]).await?;
            let mut loaded = self.load(&operation, record.into_iter().collect(), columns).await?;
            return Ok(loaded.pop());
        }

        let key_name = self.schema().table(self.table())?.primary_key.clone();
        let query = self.base_query(&mut operation)?.where_(&key_name, Operator::Eq, id.clone());
        self.first(operation, query, columns).await
    }

    pub async fn find_by(&self, column: &str, value: &FieldValue, columns: &[&str]) -> Result<Option<Record>> {
        let mut operation = self.begin()?;
        let query = Condition::new(column, "=", value.to_json())
            .apply(self.base_query(&mut operation)?, self.schema())?;
        self.first(operation, query, columns).await
    }

    pub async fn find_where(&self, conditions: &Attributes, columns: &[&str]) -> Result<Vec<Record>> {
        let mut operation = self.begin()?;
        let schema = self.schema();
        let query = conditions
            .iter()
            .try_fold(self.base_query(&mut operation)?, |query, (column, value)| {
                Condition::new(column.as_str(), "=", value.to_json()).apply(query, schema)
            })?;
        let records = self.store.get(&query, &[]).await?;
        self.load(&operation, records, columns).await
    }

    pub async fn find_many(&self, ids: &[FieldValue], columns: &[&str]) -> Result<Vec<Record>> {
        let mut operation = self.begin()?;
        let query = self.base_query(&mut operation)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let key_name = self.schema().table(self.table())?.primary_key.clone();
        let records = self
            .store
            .get(&query.where_in(&key_name, ids.to_vec()), &[])
            .await?;
        self.load(&operation, records, columns).await
    }

    pub async fn where_(&self, condition: &Condition, columns: &[&str]) -> Result<Vec<Record>> {
        let mut operation = self.begin()?;
        let query = condition.apply(self.base_query(&mut operation)?, self.schema())?;
        let records = self.store.get(&query, &[]).await?;
        self.load(&operation, records, columns).await
    }

    pub async fn count(&self) -> Result<u64> {
        let mut operation = self.begin()?;
        let query = self.base_query(&mut operation)?;
        self.store.count(&query.for_count()).await
    }

    pub async fn paginate(&self, page: usize, per_page: Option<usize>, columns: &[&str]) -> Result<Paginator<Record>> {
        let mut operation = self.begin()?;
        let query = self.base_query(&mut operation)?;
        let per_page = per_page.unwrap_or(self.config.per_page).max(1);
        let page = page.max(1);

        let paginator = self.store.paginate(&query, per_page, page, &[]).await?;
        let Paginator {
            items,
            total,
            per_page,
            current_page,
            ..
        } = paginator;
        let items = self.load(&operation, items, columns).await?;
        Ok(grid::with_links(
            Paginator::new(items, total, per_page, current_page),
            &self.config.path,
        ))
    }

    /// Grid composition: criteria, then filters and sorts (or a search), then
    /// the unwindowed count, then the page window
    pub async fn fetch(&self, request: &GridRequest) -> Result<Paginator<Record>> {
        let mut operation = self.begin()?;
        let query = grid::compose(
            self.base_query(&mut operation)?,
            self.schema(),
            request,
            &self.search_settings(),
        )?;
        let per_page = request.page_size(self.config.per_page);
        let page = request.page.max(1);

        let total = self.store.count(&query.for_count()).await?;
        let items = self.store.get(&query.for_page(page, per_page), &[]).await?;
        let items = self.load(&operation, items, &request.column_refs()).await?;

        tracing::debug!(table = %self.table(), total, page, per_page, "grid fetched");
        Ok(grid::with_links(
            Paginator::new(items, total, per_page, page),
            &self.config.path,
        ))
    }

    /// [`RepositoryCore::fetch`] without the count
    pub async fn simple_fetch(&self, request: &GridRequest) -> Result<Vec<Record>> {
        let mut operation = self.begin()?;
        let query = grid::compose(
            self.base_query(&mut operation)?,
            self.schema(),
            request,
            &self.search_settings(),
        )?;
        let per_page = request.page_size(self.config.per_page);
        let items = self
            .store
            .get(&query.for_page(request.page.max(1), per_page), &[])
            .await?;
        self.load(&operation, items, &request.column_refs()).await
    }

    /// Relevance search; empty `columns` and a missing `threshold` fall back
    /// to the configured searchable columns and threshold
    pub async fn search(&self, phrase: &str, columns: &SearchColumns, threshold: Option<f64>) -> Result<Vec<Record>> {
        let mut operation = self.begin()?;
        let settings = self.search_settings();
        let columns = if columns.is_empty() { &settings.columns } else { columns };
        let threshold = threshold.or(settings.threshold);

        let query = apply_search(self.base_query(&mut operation)?, self.schema(), phrase, columns, threshold)?;
        let records = self.store.get(&query, &[]).await?;
        self.load(&operation, records, &[]).await
    }

    fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            columns: self.config.searchable.clone(),
            threshold: self.config.search_threshold,
        }
    }

    // === Writes ===

    pub async fn create(&self, attributes: Attributes) -> Result<Record> {
        let operation = self.begin()?;
        let record = self.store.create(self.table(), attributes).await?;
        tracing::debug!(table = %self.table(), key = %record.key(), "record created");
        let mut loaded = self.load(&operation, vec![record], &[]).await?;
        loaded.pop().ok_or_else(|| not_found(self.table(), &FieldValue::Null))
    }

    pub async fn update(&self, id: &FieldValue, attributes: Attributes) -> Result<Record> {
        let operation = self.begin()?;
        let record = self.store.update(self.table(), id, attributes).await?;
        tracing::debug!(table = %self.table(), key = %id, "record updated");
        let mut loaded = self.load(&operation, vec![record], &[]).await?;
        loaded.pop().ok_or_else(|| not_found(self.table(), id))
    }

    pub async fn delete(&self, id: &FieldValue) -> Result<bool> {
        self.begin()?;
        let deleted = self.store.delete(self.table(), id).await?;
        tracing::debug!(table = %self.table(), key = %id, deleted, "record deleted");
        Ok(deleted)
    }
}

fn not_found(table: &str, id: &FieldValue) -> RepositoryError {
    StorageError::RecordNotFound {
        table: table.to_string(),
        key: id.to_string(),
    }
    .into()
}

/// The table must be known to the store and expose its primary key
fn validate_model(schema: &Schema, table: &str) -> Result<()> {
    let table_schema = schema.table(table).map_err(|_| ModelError::InvalidModel {
        table: table.to_string(),
        reason: "table is not known to the data store".to_string(),
    })?;
    if !table_schema.columns.is_empty() && !table_schema.columns.contains(&table_schema.primary_key) {
        return Err(ModelError::InvalidModel {
            table: table.to_string(),
            reason: format!("primary key '{}' is not a declared column", table_schema.primary_key),
        }
        .into());
    }
    Ok(())
}
