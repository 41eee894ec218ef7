//! Evaluation of [`Query`] values over rows held in memory
//!
//! Mirrors what the SQL renderer asks of a database: left joins multiply
//! rows, `AND` binds tighter than `OR`, comparisons against `NULL` are never
//! true, and existential clauses never multiply base rows.

use crate::core::error::Result;
use crate::core::field::FieldValue;
use crate::core::record::Attributes;
use crate::core::schema::{Relation, RelationKind, Schema};
use crate::query::builder::{
    Boolean, ColumnRef, Direction, Operator, OrderTarget, Predicate, Query, Select, Where,
};
use crate::query::search;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Table name -> rows in insertion order
pub(crate) type Tables = HashMap<String, Vec<Attributes>>;

/// One candidate row: the base row plus whatever each join attached
struct Row<'a> {
    table: &'a str,
    base: &'a Attributes,
    joined: Vec<(String, Option<&'a Attributes>)>,
    score: f64,
}

impl<'a> Row<'a> {
    fn single(table: &'a str, base: &'a Attributes) -> Self {
        Self {
            table,
            base,
            joined: Vec::new(),
            score: 0.0,
        }
    }

    fn value(&self, column: &ColumnRef) -> Option<&'a FieldValue> {
        match column.table.as_deref() {
            None => self.base.get(&column.column),
            Some(table) if table == self.table => self.base.get(&column.column),
            Some(alias) => self
                .joined
                .iter()
                .find(|(joined, _)| joined == alias)
                .and_then(|(_, attributes)| *attributes)
                .and_then(|attributes| attributes.get(&column.column)),
        }
    }
}

pub(crate) struct Evaluator<'a> {
    schema: &'a Schema,
    tables: &'a Tables,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(schema: &'a Schema, tables: &'a Tables) -> Self {
        Self { schema, tables }
    }

    fn rows_of(&self, table: &str) -> &'a [Attributes] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rows matching the query, ordered and windowed, projected through its selects
    pub(crate) fn select(&self, query: &Query) -> Result<Vec<Attributes>> {
        let query = query.clone().resolve_aliases();
        let mut rows = self.matching(&query)?;

        if !query.orders.is_empty() {
            // stable, so ties keep insertion order
            rows.sort_by(|a, b| {
                for order in &query.orders {
                    let ordering = match &order.target {
                        OrderTarget::Column(column) => {
                            let left = a.value(column).unwrap_or(&FieldValue::Null);
                            let right = b.value(column).unwrap_or(&FieldValue::Null);
                            left.compare(right)
                        }
                        OrderTarget::Relevance => {
                            a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal)
                        }
                    };
                    let ordering = match order.direction {
                        Direction::Asc => ordering,
                        Direction::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let window = rows
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX));

        Ok(window.map(|row| project(&query, &row)).collect())
    }

    /// Number of rows the query matches, ignoring order and window
    pub(crate) fn count(&self, query: &Query) -> Result<u64> {
        let query = query.for_count().resolve_aliases();
        Ok(self.matching(&query)?.len() as u64)
    }

    fn matching(&self, query: &Query) -> Result<Vec<Row<'a>>> {
        let table = self.schema.table(&query.table)?.name.as_str();
        let mut rows: Vec<Row<'a>> = self
            .rows_of(&query.table)
            .iter()
            .map(|base| Row::single(table, base))
            .collect();

        for join in &query.joins {
            let candidates = self.rows_of(&join.table);
            let mut expanded = Vec::with_capacity(rows.len());
            for row in rows {
                let key = row.value(&join.right);
                let matches: Vec<&'a Attributes> = match key {
                    Some(key) => candidates
                        .iter()
                        .filter(|candidate| {
                            candidate
                                .get(&join.left.column)
                                .is_some_and(|value| value.loose_eq(key))
                        })
                        .collect(),
                    None => Vec::new(),
                };
                if matches.is_empty() {
                    let mut row = row;
                    row.joined.push((join.alias.clone(), None));
                    expanded.push(row);
                } else {
                    for candidate in matches {
                        let mut joined = row.joined.clone();
                        joined.push((join.alias.clone(), Some(candidate)));
                        expanded.push(Row {
                            table: row.table,
                            base: row.base,
                            joined,
                            score: row.score,
                        });
                    }
                }
            }
            rows = expanded;
        }

        let mut kept = Vec::with_capacity(rows.len());
        for mut row in rows {
            if !self.wheres(&query.table, &row, &query.wheres)? {
                continue;
            }
            if let Some(search) = &query.search {
                row.score = search::score(search, |column| row.base.get(column));
                if row.score <= search.threshold {
                    continue;
                }
            }
            kept.push(row);
        }
        Ok(kept)
    }

    fn wheres(&self, table: &str, row: &Row<'_>, wheres: &[Where]) -> Result<bool> {
        // AND-chains separated by OR
        let mut any = false;
        let mut chain = true;
        for (index, clause) in wheres.iter().enumerate() {
            let matched = self.predicate(table, row, &clause.predicate)?;
            if index > 0 && clause.boolean == Boolean::Or {
                any |= chain;
                chain = matched;
            } else {
                chain = chain && matched;
            }
        }
        Ok(wheres.is_empty() || any || chain)
    }

    fn predicate(&self, table: &str, row: &Row<'_>, predicate: &Predicate) -> Result<bool> {
        match predicate {
            Predicate::Compare {
                column,
                operator,
                value,
            } => Ok(compare(row.value(column), *operator, value)),
            Predicate::In { column, values } => Ok(row
                .value(column)
                .is_some_and(|actual| values.iter().any(|v| actual.loose_eq(v)))),
            Predicate::Exists { chain, predicate } => {
                let hops: Vec<&str> = chain.iter().map(String::as_str).collect();
                let relations = self.schema.resolve_chain(table, &hops)?;
                self.exists(row.base, &relations, predicate)
            }
            Predicate::Group(group) => self.wheres(table, row, group),
        }
    }

    fn exists(&self, parent: &Attributes, relations: &[&Relation], predicate: &Predicate) -> Result<bool> {
        let Some((relation, rest)) = relations.split_first() else {
            return Ok(false);
        };
        for related in self.related_rows(relation, parent)? {
            let found = if rest.is_empty() {
                let row = Row::single(&relation.related, related);
                self.predicate(&relation.related, &row, predicate)?
            } else {
                self.exists(related, rest, predicate)?
            };
            if found {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Rows of `relation.related` attached to `parent`
    pub(crate) fn related_rows(
        &self,
        relation: &Relation,
        parent: &Attributes,
    ) -> Result<Vec<&'a Attributes>> {
        let related = self.rows_of(&relation.related);
        let matching = |column: &str, key: &FieldValue| -> Vec<&'a Attributes> {
            related
                .iter()
                .filter(|row| row.get(column).is_some_and(|value| value.loose_eq(key)))
                .collect()
        };

        let rows = match relation.kind {
            RelationKind::HasOne | RelationKind::HasMany => match parent.get(&relation.local_key) {
                Some(key) => matching(&relation.foreign_key, key),
                None => Vec::new(),
            },
            RelationKind::BelongsTo => match parent.get(&relation.foreign_key) {
                Some(key) => matching(&relation.local_key, key),
                None => Vec::new(),
            },
            RelationKind::BelongsToMany => {
                let related_key = self.schema.related_key(relation)?;
                let (Some(pivot), Some(key)) = (&relation.pivot, parent.get(&relation.local_key))
                else {
                    return Ok(Vec::new());
                };
                self.rows_of(&pivot.table)
                    .iter()
                    .filter(|link| {
                        link.get(&pivot.foreign_pivot_key)
                            .is_some_and(|value| value.loose_eq(key))
                    })
                    .filter_map(|link| link.get(&pivot.related_pivot_key))
                    .flat_map(|target| matching(related_key, target))
                    .collect()
            }
        };
        Ok(rows)
    }
}

fn compare(actual: Option<&FieldValue>, operator: Operator, expected: &FieldValue) -> bool {
    let actual = actual.unwrap_or(&FieldValue::Null);

    if expected.is_null() {
        return match operator {
            Operator::Eq => actual.is_null(),
            Operator::NotEq => !actual.is_null(),
            _ => false,
        };
    }
    if actual.is_null() {
        return false;
    }

    match operator {
        Operator::Eq => actual.loose_eq(expected),
        Operator::NotEq => !actual.loose_eq(expected),
        Operator::Lt => actual.compare(expected) == Ordering::Less,
        Operator::Lte => actual.compare(expected) != Ordering::Greater,
        Operator::Gt => actual.compare(expected) == Ordering::Greater,
        Operator::Gte => actual.compare(expected) != Ordering::Less,
        Operator::Like => match (actual.to_text(), expected.to_text()) {
            (Some(text), Some(pattern)) => like(&text, &pattern),
            _ => false,
        },
        Operator::Contains => match (actual.to_text(), expected.to_text()) {
            (Some(text), Some(needle)) => text.to_lowercase().contains(&needle.to_lowercase()),
            _ => false,
        },
    }
}

/// SQL `LIKE`: `%` matches any run, `_` any single character
fn like(text: &str, pattern: &str) -> bool {
    let mut expression = String::from("(?s)^");
    for c in pattern.chars() {
        match c {
            '%' => expression.push_str(".*"),
            '_' => expression.push('.'),
            other => expression.push_str(&regex::escape(&other.to_string())),
        }
    }
    expression.push('$');
    Regex::new(&expression).is_ok_and(|re| re.is_match(text))
}

fn project(query: &Query, row: &Row<'_>) -> Attributes {
    if query.selects.is_empty() {
        return row.base.clone();
    }
    let mut output = Attributes::new();
    for select in &query.selects {
        match select {
            Select::All => output.extend(row.base.iter().map(|(k, v)| (k.clone(), v.clone()))),
            Select::TableAll(table) if table == row.table => {
                output.extend(row.base.iter().map(|(k, v)| (k.clone(), v.clone())))
            }
            Select::TableAll(alias) => {
                if let Some((_, Some(attributes))) =
                    row.joined.iter().find(|(joined, _)| joined == alias)
                {
                    for (column, value) in attributes.iter() {
                        output
                            .entry(column.clone())
                            .or_insert_with(|| value.clone());
                    }
                }
            }
            Select::Column { column, alias } => {
                let name = alias.clone().unwrap_or_else(|| column.column.clone());
                let value = row.value(column).cloned().unwrap_or(FieldValue::Null);
                output.insert(name, value);
            }
        }
    }
    output
}
