//! In-memory data store for testing and development

use crate::core::error::{QueryError, Result, StorageError};
use crate::core::field::FieldValue;
use crate::core::record::{Attributes, Record};
use crate::core::schema::Schema;
use crate::query::builder::Query;
use crate::storage::DataStore;
use crate::storage::evaluate::{Evaluator, Tables};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

const BACKEND: &str = "in_memory";

#[derive(Default)]
struct State {
    tables: Tables,
    /// Next auto-increment key per table
    sequences: HashMap<String, i64>,
}

/// In-memory data store implementation
///
/// Every table declared in the schema starts empty. Integer primary keys are
/// assigned from a per-table sequence when a created record does not carry
/// one. Uses RwLock for thread-safe access.
#[derive(Clone)]
pub struct InMemoryDataStore {
    schema: Arc<Schema>,
    state: Arc<RwLock<State>>,
}

impl InMemoryDataStore {
    /// Create a new in-memory data store over `schema`
    pub fn new(schema: Schema) -> Self {
        let mut state = State::default();
        for table in schema.tables() {
            state.tables.insert(table.name.clone(), Vec::new());
            state.sequences.insert(table.name.clone(), 1);
        }
        Self {
            schema: Arc::new(schema),
            state: Arc::new(RwLock::new(state)),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|e| {
            StorageError::Unavailable {
                backend: BACKEND.to_string(),
                message: format!("Failed to acquire read lock: {}", e),
            }
            .into()
        })
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|e| {
            StorageError::Unavailable {
                backend: BACKEND.to_string(),
                message: format!("Failed to acquire write lock: {}", e),
            }
            .into()
        })
    }

    fn primary_key(&self, table: &str) -> Result<&str> {
        Ok(&self.schema.table(table)?.primary_key)
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn find(&self, table: &str, id: &FieldValue, columns: &[&str]) -> Result<Option<Record>> {
        let key_name = self.primary_key(table)?;
        let state = self.read()?;

        let row = state.tables.get(table).and_then(|rows| {
            rows.iter()
                .find(|row| row.get(key_name).is_some_and(|key| key.loose_eq(id)))
        });

        Ok(row.map(|attributes| {
            Record::from_attributes(table, key_name, attributes.clone()).only(columns)
        }))
    }

    async fn get(&self, query: &Query, columns: &[&str]) -> Result<Vec<Record>> {
        let key_name = self.primary_key(&query.table)?;
        let state = self.read()?;

        let rows = Evaluator::new(&self.schema, &state.tables).select(query)?;
        tracing::debug!(table = %query.table, rows = rows.len(), "in-memory select");

        Ok(rows
            .into_iter()
            .map(|attributes| {
                Record::from_attributes(query.table.as_str(), key_name, attributes).only(columns)
            })
            .collect())
    }

    async fn count(&self, query: &Query) -> Result<u64> {
        let state = self.read()?;
        Evaluator::new(&self.schema, &state.tables).count(query)
    }

    async fn create(&self, table: &str, attributes: Attributes) -> Result<Record> {
        let key_name = self.primary_key(table)?;
        let mut state = self.write()?;
        let State { tables, sequences } = &mut *state;

        let sequence = sequences.entry(table.to_string()).or_insert(1);
        let mut attributes = attributes;
        match attributes.get(key_name) {
            None | Some(FieldValue::Null) => {
                attributes.insert(key_name.to_string(), FieldValue::Integer(*sequence));
                *sequence += 1;
            }
            Some(FieldValue::Integer(given)) => {
                *sequence = (*sequence).max(given + 1);
            }
            Some(_) => {}
        }

        tables
            .entry(table.to_string())
            .or_default()
            .push(attributes.clone());

        Ok(Record::from_attributes(table, key_name, attributes))
    }

    async fn update(&self, table: &str, id: &FieldValue, attributes: Attributes) -> Result<Record> {
        let key_name = self.primary_key(table)?;
        let mut state = self.write()?;

        let row = state
            .tables
            .get_mut(table)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|row| row.get(key_name).is_some_and(|key| key.loose_eq(id)))
            })
            .ok_or_else(|| StorageError::RecordNotFound {
                table: table.to_string(),
                key: id.to_string(),
            })?;

        let mut record = Record::from_attributes(table, key_name, row.clone());
        record.fill(&attributes);
        *row = record.attributes().clone();

        Ok(record)
    }

    async fn delete(&self, table: &str, id: &FieldValue) -> Result<bool> {
        let key_name = self.primary_key(table)?;
        let mut state = self.write()?;

        let Some(rows) = state.tables.get_mut(table) else {
            return Err(QueryError::UnknownTable {
                table: table.to_string(),
            }
            .into());
        };
        let before = rows.len();
        rows.retain(|row| !row.get(key_name).is_some_and(|key| key.loose_eq(id)));

        Ok(rows.len() < before)
    }
}
