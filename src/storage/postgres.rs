//! PostgreSQL data store using sqlx.
//!
//! Queries are rendered with [`render_select`] / [`render_count`] and every
//! row comes back as `row_to_json`, so one code path hydrates records for any
//! table shape.
//!
//! # Feature flag
//!
//! This module is gated behind the `postgres` feature flag:
//! ```toml
//! [dependencies]
//! this-repository = { version = "0.0.9", features = ["postgres"] }
//! ```

use crate::core::error::{Result, StorageError};
use crate::core::field::FieldValue;
use crate::core::record::{Attributes, Record};
use crate::core::schema::Schema;
use crate::query::builder::{Operator, Query};
use crate::query::sql::{Dialect, render_count, render_select};
use crate::storage::DataStore;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::{Arguments, PgPool};
use std::sync::Arc;

const BACKEND: &str = "postgres";

/// Column added by relevance searches; not part of the record
const RELEVANCE: &str = "relevance";

/// Data store backed by PostgreSQL.
#[derive(Clone, Debug)]
pub struct PostgresDataStore {
    pool: PgPool,
    schema: Arc<Schema>,
}

impl PostgresDataStore {
    /// Create a new `PostgresDataStore` with the given connection pool.
    pub fn new(pool: PgPool, schema: Schema) -> Self {
        Self {
            pool,
            schema: Arc::new(schema),
        }
    }

    /// Connect to `url` and create a store over `schema`.
    pub async fn connect(url: &str, schema: Schema) -> anyhow::Result<Self> {
        let pool = PgPool::connect(url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(Self::new(pool, schema))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn quote(ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn primary_key(&self, table: &str) -> Result<&str> {
        Ok(&self.schema.table(table)?.primary_key)
    }

    /// Run a statement yielding one JSON object per row
    async fn rows(&self, sql: &str, bindings: &[FieldValue]) -> Result<Vec<Value>> {
        tracing::debug!(sql = %sql, bindings = bindings.len(), "postgres query");
        sqlx::query_scalar_with::<Postgres, Value, _>(sql, arguments(bindings)?)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)
    }

    /// Wrap a row-producing statement so each row comes back as JSON
    fn as_json(sql: &str) -> String {
        format!("SELECT row_to_json(q) FROM ({}) q", sql)
    }

    fn hydrate(&self, table: &str, key_name: &str, row: Value, columns: &[&str]) -> Record {
        let mut attributes = Attributes::new();
        if let Value::Object(map) = row {
            for (column, value) in map {
                if column != RELEVANCE {
                    attributes.insert(column, FieldValue::from_json(&value));
                }
            }
        }
        Record::from_attributes(table, key_name, attributes).only(columns)
    }
}

fn query_failed(e: sqlx::Error) -> crate::core::error::RepositoryError {
    StorageError::QueryFailed {
        backend: BACKEND.to_string(),
        message: e.to_string(),
    }
    .into()
}

fn arguments(values: &[FieldValue]) -> Result<PgArguments> {
    let mut arguments = PgArguments::default();
    for value in values {
        let added = match value.clone() {
            FieldValue::String(s) => arguments.add(s),
            FieldValue::Integer(i) => arguments.add(i),
            FieldValue::Float(f) => arguments.add(f),
            FieldValue::Boolean(b) => arguments.add(b),
            FieldValue::Uuid(u) => arguments.add(u),
            FieldValue::DateTime(d) => arguments.add(d),
            FieldValue::Null => arguments.add(None::<String>),
        };
        added.map_err(|e| StorageError::QueryFailed {
            backend: BACKEND.to_string(),
            message: format!("Failed to bind {}: {}", value, e),
        })?;
    }
    Ok(arguments)
}

/// `column = $n` pairs for writes. Nulls are written as literals since an
/// untyped NULL parameter would not coerce to every column type.
fn assignments(attributes: &Attributes, bindings: &mut Vec<FieldValue>) -> Vec<(String, String)> {
    attributes
        .iter()
        .map(|(column, value)| {
            let placeholder = if value.is_null() {
                "NULL".to_string()
            } else {
                bindings.push(value.clone());
                format!("${}", bindings.len())
            };
            (PostgresDataStore::quote(column), placeholder)
        })
        .collect()
}

#[async_trait]
impl DataStore for PostgresDataStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn find(&self, table: &str, id: &FieldValue, columns: &[&str]) -> Result<Option<Record>> {
        let key_name = self.primary_key(table)?;
        let query = Query::table(table)
            .where_(key_name, Operator::Eq, id.clone())
            .for_page(1, 1);
        let statement = render_select(Dialect::Postgres, &self.schema, &query)?;

        let row = self
            .rows(&Self::as_json(&statement.sql), &statement.bindings)
            .await?
            .into_iter()
            .next();
        Ok(row.map(|row| self.hydrate(table, key_name, row, columns)))
    }

    async fn get(&self, query: &Query, columns: &[&str]) -> Result<Vec<Record>> {
        let key_name = self.primary_key(&query.table)?;
        let statement = render_select(Dialect::Postgres, &self.schema, query)?;

        let rows = self
            .rows(&Self::as_json(&statement.sql), &statement.bindings)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| self.hydrate(&query.table, key_name, row, columns))
            .collect())
    }

    async fn count(&self, query: &Query) -> Result<u64> {
        let statement = render_count(Dialect::Postgres, &self.schema, query)?;
        tracing::debug!(sql = %statement.sql, "postgres count");

        let arguments = arguments(&statement.bindings)?;
        let total = sqlx::query_scalar_with::<Postgres, i64, _>(&statement.sql, arguments)
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(total.max(0) as u64)
    }

    async fn create(&self, table: &str, attributes: Attributes) -> Result<Record> {
        let key_name = self.primary_key(table)?;
        let mut bindings = Vec::new();
        let pairs = assignments(&attributes, &mut bindings);

        let insert = if pairs.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", Self::quote(table))
        } else {
            let (columns, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                Self::quote(table),
                columns.join(", "),
                values.join(", ")
            )
        };
        let sql = format!(
            "WITH written AS ({} RETURNING *) SELECT row_to_json(written) FROM written",
            insert
        );

        let row = self
            .rows(&sql, &bindings)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::QueryFailed {
                backend: BACKEND.to_string(),
                message: format!("insert into {} returned no row", table),
            })?;
        Ok(self.hydrate(table, key_name, row, &[]))
    }

    async fn update(&self, table: &str, id: &FieldValue, attributes: Attributes) -> Result<Record> {
        let key_name = self.primary_key(table)?;
        let not_found = || StorageError::RecordNotFound {
            table: table.to_string(),
            key: id.to_string(),
        };

        if attributes.is_empty() {
            return self.find(table, id, &[]).await?.ok_or_else(|| not_found().into());
        }

        let mut bindings = Vec::new();
        let sets: Vec<String> = assignments(&attributes, &mut bindings)
            .into_iter()
            .map(|(column, value)| format!("{} = {}", column, value))
            .collect();
        bindings.push(id.clone());
        let sql = format!(
            "WITH written AS (UPDATE {} SET {} WHERE {} = ${} RETURNING *) \
             SELECT row_to_json(written) FROM written",
            Self::quote(table),
            sets.join(", "),
            Self::quote(key_name),
            bindings.len()
        );

        let row = self
            .rows(&sql, &bindings)
            .await?
            .into_iter()
            .next()
            .ok_or_else(not_found)?;
        Ok(self.hydrate(table, key_name, row, &[]))
    }

    async fn delete(&self, table: &str, id: &FieldValue) -> Result<bool> {
        let key_name = self.primary_key(table)?;
        let sql = format!(
            "WITH removed AS (DELETE FROM {} WHERE {} = $1 RETURNING 1) SELECT COUNT(*) FROM removed",
            Self::quote(table),
            Self::quote(key_name)
        );
        let arguments = arguments(std::slice::from_ref(id))?;
        let removed = sqlx::query_scalar_with::<Postgres, i64, _>(&sql, arguments)
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(removed > 0)
    }
}
