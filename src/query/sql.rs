//! Rendering of [`Query`] values to parameterised SQL

use crate::core::error::{QueryError, Result};
use crate::core::field::FieldValue;
use crate::core::pagination::MAX_WINDOW;
use crate::core::schema::{Relation, RelationKind, Schema};
use crate::query::builder::{Boolean, ColumnRef, Operator, OrderTarget, Predicate, Query, Search, Select, Where};
use crate::query::search::{CONTAINS_MULTIPLIER, EXACT_MULTIPLIER, PREFIX_MULTIPLIER};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL dialect of the backing database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    #[serde(alias = "pgsql")]
    Postgres,
    MySql,
    Sqlite,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::MySql => write!(f, "mysql"),
            Dialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// SQL text plus the values bound to its placeholders, in order
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub bindings: Vec<FieldValue>,
}

/// Output alias of the search score
const RELEVANCE: &str = "relevance";

struct Renderer<'a> {
    dialect: Dialect,
    schema: &'a Schema,
    bindings: Vec<FieldValue>,
}

impl<'a> Renderer<'a> {
    fn new(dialect: Dialect, schema: &'a Schema) -> Self {
        Self {
            dialect,
            schema,
            bindings: Vec::new(),
        }
    }

    fn quote(&self, ident: &str) -> String {
        match self.dialect {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    fn column(&self, column: &ColumnRef) -> String {
        match &column.table {
            Some(table) => format!("{}.{}", self.quote(table), self.quote(&column.column)),
            None => self.quote(&column.column),
        }
    }

    fn bind(&mut self, value: FieldValue) -> String {
        self.bindings.push(value);
        match self.dialect {
            Dialect::Postgres => format!("${}", self.bindings.len()),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Case-insensitive `LIKE` against an already-lowercased pattern
    fn insensitive_like(&mut self, column: &str, pattern: String) -> String {
        match self.dialect {
            Dialect::Postgres => {
                let placeholder = self.bind(FieldValue::String(pattern));
                format!("CAST({} AS TEXT) ILIKE {}", column, placeholder)
            }
            Dialect::MySql | Dialect::Sqlite => {
                let placeholder = self.bind(FieldValue::String(pattern));
                format!("LOWER({}) LIKE LOWER({})", column, placeholder)
            }
        }
    }

    fn wheres(&mut self, table: &str, wheres: &[Where]) -> Result<String> {
        let mut sql = String::new();
        for (index, clause) in wheres.iter().enumerate() {
            if index > 0 {
                sql.push_str(match clause.boolean {
                    Boolean::And => " AND ",
                    Boolean::Or => " OR ",
                });
            }
            let rendered = self.predicate(table, &clause.predicate)?;
            sql.push_str(&rendered);
        }
        Ok(sql)
    }

    fn predicate(&mut self, table: &str, predicate: &Predicate) -> Result<String> {
        match predicate {
            Predicate::Compare {
                column,
                operator,
                value,
            } => Ok(self.compare(column, *operator, value)),
            Predicate::In { column, values } => {
                if values.is_empty() {
                    return Ok("1 = 0".to_string());
                }
                let column = self.column(column);
                let placeholders: Vec<String> =
                    values.iter().map(|v| self.bind(v.clone())).collect();
                Ok(format!("{} IN ({})", column, placeholders.join(", ")))
            }
            Predicate::Exists { chain, predicate } => {
                let hops: Vec<&str> = chain.iter().map(String::as_str).collect();
                let relations = self.schema.resolve_chain(table, &hops)?;
                self.exists(table, &relations, predicate)
            }
            Predicate::Group(group) => Ok(format!("({})", self.wheres(table, group)?)),
        }
    }

    fn compare(&mut self, column: &ColumnRef, operator: Operator, value: &FieldValue) -> String {
        let column = self.column(column);
        if value.is_null() {
            match operator {
                Operator::Eq => return format!("{} IS NULL", column),
                Operator::NotEq => return format!("{} IS NOT NULL", column),
                _ => {}
            }
        }
        let symbol = match operator {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "LIKE",
            Operator::Contains => {
                let needle = value.to_text().unwrap_or_default().to_lowercase();
                return self.insensitive_like(&column, format!("%{}%", needle));
            }
        };
        let placeholder = self.bind(value.clone());
        format!("{} {} {}", column, symbol, placeholder)
    }

    /// Correlated `EXISTS` subquery walking `relations` from `parent`
    fn exists(&mut self, parent: &str, relations: &[&Relation], predicate: &Predicate) -> Result<String> {
        let Some((relation, rest)) = relations.split_first() else {
            return self.predicate(parent, predicate);
        };
        let related = relation.related.as_str();
        let (from, link) = match relation.kind {
            RelationKind::HasOne | RelationKind::HasMany => (
                self.quote(related),
                format!(
                    "{} = {}",
                    self.column(&ColumnRef::qualified(related, relation.foreign_key.as_str())),
                    self.column(&ColumnRef::qualified(parent, relation.local_key.as_str()))
                ),
            ),
            RelationKind::BelongsTo => (
                self.quote(related),
                format!(
                    "{} = {}",
                    self.column(&ColumnRef::qualified(related, relation.local_key.as_str())),
                    self.column(&ColumnRef::qualified(parent, relation.foreign_key.as_str()))
                ),
            ),
            RelationKind::BelongsToMany => {
                let pivot = relation.pivot.as_ref().ok_or_else(|| QueryError::UnknownRelation {
                    table: parent.to_string(),
                    relation: relation.name.clone(),
                })?;
                let related_key = self.schema.related_key(relation)?;
                (
                    format!(
                        "{} INNER JOIN {} ON {} = {}",
                        self.quote(related),
                        self.quote(&pivot.table),
                        self.column(&ColumnRef::qualified(pivot.table.as_str(), pivot.related_pivot_key.as_str())),
                        self.column(&ColumnRef::qualified(related, related_key))
                    ),
                    format!(
                        "{} = {}",
                        self.column(&ColumnRef::qualified(pivot.table.as_str(), pivot.foreign_pivot_key.as_str())),
                        self.column(&ColumnRef::qualified(parent, relation.local_key.as_str()))
                    ),
                )
            }
        };
        let inner = self.exists(related, rest, predicate)?;
        Ok(format!("EXISTS (SELECT 1 FROM {} WHERE {} AND {})", from, link, inner))
    }

    /// Summed relevance expression over every column, word and match tier
    fn score(&mut self, table: &str, search: &Search) -> String {
        let mut cases = Vec::new();
        for (column, weight) in &search.columns {
            let column = self.column(&ColumnRef::qualified(table, column.as_str()));
            for (multiplier, prefix, postfix) in [
                (EXACT_MULTIPLIER, "", ""),
                (PREFIX_MULTIPLIER, "", "%"),
                (CONTAINS_MULTIPLIER, "%", "%"),
            ] {
                for word in &search.words {
                    let test = self.insensitive_like(&column, format!("{}{}{}", prefix, word, postfix));
                    cases.push(format!("(CASE WHEN {} THEN {} ELSE 0 END)", test, weight * multiplier));
                }
            }
        }
        if cases.is_empty() {
            "0".to_string()
        } else {
            cases.join(" + ")
        }
    }

    fn selects(&mut self, query: &Query) -> String {
        let mut parts: Vec<String> = if query.selects.is_empty() {
            vec![format!("{}.*", self.quote(&query.table))]
        } else {
            query
                .selects
                .iter()
                .map(|select| match select {
                    Select::All => "*".to_string(),
                    Select::TableAll(table) => format!("{}.*", self.quote(table)),
                    Select::Column { column, alias } => match alias {
                        Some(alias) => format!("{} AS {}", self.column(column), self.quote(alias)),
                        None => self.column(column),
                    },
                })
                .collect()
        };
        if let Some(search) = &query.search {
            let score = self.score(&query.table, search);
            parts.push(format!("({}) AS {}", score, self.quote(RELEVANCE)));
        }
        parts.join(", ")
    }

    fn from_clause(&mut self, query: &Query) -> Result<String> {
        let mut sql = format!(" FROM {}", self.quote(&query.table));
        for join in &query.joins {
            sql.push_str(&format!(
                " LEFT JOIN {} AS {} ON {} = {}",
                self.quote(&join.table),
                self.quote(&join.alias),
                self.column(&join.left),
                self.column(&join.right)
            ));
        }

        let mut conditions = Vec::new();
        if !query.wheres.is_empty() {
            let wheres = self.wheres(&query.table, &query.wheres)?;
            conditions.push(if query.wheres.len() > 1 {
                format!("({})", wheres)
            } else {
                wheres
            });
        }
        if let Some(search) = &query.search {
            // Output aliases are not visible to WHERE, so the score is repeated
            let score = self.score(&query.table, search);
            conditions.push(format!("({}) > {}", score, search.threshold));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        Ok(sql)
    }

    fn orders(&self, query: &Query) -> String {
        if query.orders.is_empty() {
            return String::new();
        }
        let orders: Vec<String> = query
            .orders
            .iter()
            .map(|order| {
                let target = match &order.target {
                    OrderTarget::Column(column) => self.column(column),
                    OrderTarget::Relevance => self.quote(RELEVANCE),
                };
                format!("{} {}", target, order.direction)
            })
            .collect();
        format!(" ORDER BY {}", orders.join(", "))
    }

    fn window(&self, query: &Query) -> String {
        let limit = query.limit.map(|limit| limit.min(MAX_WINDOW));
        match (limit, query.offset.min(MAX_WINDOW)) {
            (Some(limit), 0) => format!(" LIMIT {}", limit),
            (Some(limit), offset) => format!(" LIMIT {} OFFSET {}", limit, offset),
            (None, 0) => String::new(),
            (None, offset) => match self.dialect {
                Dialect::Postgres => format!(" OFFSET {}", offset),
                Dialect::MySql => format!(" LIMIT 18446744073709551615 OFFSET {}", offset),
                Dialect::Sqlite => format!(" LIMIT -1 OFFSET {}", offset),
            },
        }
    }
}

/// Render the row query
pub fn render_select(dialect: Dialect, schema: &Schema, query: &Query) -> Result<SqlStatement> {
    let query = query.clone().resolve_aliases();
    let mut renderer = Renderer::new(dialect, schema);

    let selects = renderer.selects(&query);
    let from = renderer.from_clause(&query)?;
    let sql = format!(
        "SELECT {}{}{}{}",
        selects,
        from,
        renderer.orders(&query),
        renderer.window(&query)
    );

    Ok(SqlStatement {
        sql,
        bindings: renderer.bindings,
    })
}

/// Render the aggregate side query: same filters, no ordering, no window
pub fn render_count(dialect: Dialect, schema: &Schema, query: &Query) -> Result<SqlStatement> {
    let query = query.for_count().resolve_aliases();
    let mut renderer = Renderer::new(dialect, schema);

    let from = renderer.from_clause(&query)?;
    Ok(SqlStatement {
        sql: format!("SELECT COUNT(*) AS {}{}", renderer.quote("aggregate"), from),
        bindings: renderer.bindings,
    })
}
