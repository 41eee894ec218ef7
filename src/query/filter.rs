//! Field-level filters, direct and through relation hops

use crate::core::error::Result;
use crate::core::field::FieldValue;
use crate::core::schema::{Schema, is_relation_path, split_path};
use crate::query::builder::{Boolean, ColumnRef, Operator, Predicate, Query, Where};
use indexmap::IndexMap;

/// Column path -> filter value, applied in insertion order
pub type FilterSpec = IndexMap<String, String>;

/// Build the predicate a filter value stands for.
///
/// `"true"` and `"false"` become boolean equality; anything else is a
/// case-insensitive substring match.
pub fn value_predicate(column: ColumnRef, value: &str) -> Predicate {
    let (operator, value) = match value {
        "true" => (Operator::Eq, FieldValue::Boolean(true)),
        "false" => (Operator::Eq, FieldValue::Boolean(false)),
        other => (Operator::Contains, FieldValue::String(other.to_string())),
    };
    Predicate::Compare {
        column,
        operator,
        value,
    }
}

/// Filter on a base-table column. The column is table-qualified so it stays
/// unambiguous once joins are present.
pub fn filter_by(query: Query, schema: &Schema, column: &str, value: &str) -> Result<Query> {
    schema.table(&query.table)?.ensure_column(column)?;

    let predicate = value_predicate(ColumnRef::qualified(query.table.as_str(), column), value);
    tracing::debug!(table = %query.table, column = %column, "filter");

    Ok(query.push_where(Where {
        boolean: Boolean::And,
        predicate,
    }))
}

/// Filter on a column reached through one or more relation hops.
///
/// Applied as an existential clause rather than a join so one-to-many
/// relations never duplicate base rows.
pub fn filter_by_relation(query: Query, schema: &Schema, path: &str, value: &str) -> Result<Query> {
    let (hops, leaf) = split_path(path);
    let chain = schema.resolve_chain(&query.table, &hops)?;

    // resolve_chain always returns one relation per hop, and hops is non-empty here
    let target = chain
        .last()
        .map(|relation| relation.related.clone())
        .unwrap_or_else(|| query.table.clone());
    schema.table(&target)?.ensure_column(leaf)?;

    let predicate = value_predicate(ColumnRef::qualified(target.as_str(), leaf), value);
    tracing::debug!(table = %query.table, path = %path, "filter through relation");

    Ok(query.where_has(hops.iter().map(|h| h.to_string()).collect(), predicate))
}

/// Apply every filter, routing paths with a hop separator to
/// [`filter_by_relation`]. An empty spec leaves the query untouched.
pub fn multi_filter_by(query: Query, schema: &Schema, filter: &FilterSpec) -> Result<Query> {
    filter.iter().try_fold(query, |query, (column, value)| {
        if is_relation_path(column) {
            filter_by_relation(query, schema, column, value)
        } else {
            filter_by(query, schema, column, value)
        }
    })
}
