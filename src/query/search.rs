//! Relevance-scored free-text search
//!
//! Every searchable column carries a relevance weight. For each search word a
//! row earns `15 * weight` when the column equals the word, `5 * weight` when
//! it starts with it and `1 * weight` when it contains it; the three tiers
//! add up, so an exact match scores all of them. Rows scoring above the
//! threshold are kept and ordered by score, best first.

use crate::core::error::{QueryError, Result};
use crate::core::field::FieldValue;
use crate::core::schema::{Schema, is_relation_path};
use crate::query::builder::{Query, Search};
use indexmap::IndexMap;

pub const EXACT_MULTIPLIER: f64 = 15.0;
pub const PREFIX_MULTIPLIER: f64 = 5.0;
pub const CONTAINS_MULTIPLIER: f64 = 1.0;

/// Searchable column -> relevance weight
pub type SearchColumns = IndexMap<String, f64>;

/// Lower-case and split a phrase into search words
pub fn search_words(phrase: &str) -> Vec<String> {
    phrase
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Build the search clause for `table`.
///
/// With no columns given, every declared column of the table is searched with
/// weight 1. The threshold defaults to a quarter of the summed weights.
pub fn build_search(
    schema: &Schema,
    table: &str,
    phrase: &str,
    columns: &SearchColumns,
    threshold: Option<f64>,
) -> Result<Search> {
    let table_schema = schema.table(table)?;

    let columns: SearchColumns = if columns.is_empty() {
        table_schema
            .columns
            .iter()
            .map(|column| (column.clone(), 1.0))
            .collect()
    } else {
        columns.clone()
    };

    for column in columns.keys() {
        if is_relation_path(column) {
            return Err(QueryError::UnsupportedSearchColumn {
                column: column.clone(),
            }
            .into());
        }
        table_schema.ensure_column(column)?;
    }

    let threshold = threshold.unwrap_or_else(|| columns.values().sum::<f64>() / 4.0);

    Ok(Search {
        words: search_words(phrase),
        columns,
        threshold,
    })
}

/// Apply a relevance search: filter on the threshold and order by score
pub fn apply_search(
    query: Query,
    schema: &Schema,
    phrase: &str,
    columns: &SearchColumns,
    threshold: Option<f64>,
) -> Result<Query> {
    let search = build_search(schema, &query.table, phrase, columns, threshold)?;
    tracing::debug!(
        table = %query.table,
        words = search.words.len(),
        threshold = search.threshold,
        "search"
    );
    Ok(query.search(search).order_by_relevance())
}

/// Score one row. `value_of` looks a searchable column up on the row.
pub fn score<'a, F>(search: &Search, value_of: F) -> f64
where
    F: Fn(&str) -> Option<&'a FieldValue>,
{
    let mut total = 0.0;
    for (column, weight) in &search.columns {
        let Some(text) = value_of(column).and_then(FieldValue::to_text) else {
            continue;
        };
        let text = text.to_lowercase();
        for word in &search.words {
            if text == *word {
                total += weight * EXACT_MULTIPLIER;
            }
            if text.starts_with(word.as_str()) {
                total += weight * PREFIX_MULTIPLIER;
            }
            if text.contains(word.as_str()) {
                total += weight * CONTAINS_MULTIPLIER;
            }
        }
    }
    total
}
