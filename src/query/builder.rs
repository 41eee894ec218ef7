//! The query value threaded through every composition step
//!
//! A [`Query`] is plain data: each step (criteria, filters, sorts, paging)
//! takes one by value and returns the extended query. Data stores interpret
//! it, either by evaluating it in memory or by rendering it to SQL.

use crate::core::error::QueryError;
use crate::core::field::FieldValue;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Comparison operator of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    /// SQL `LIKE` with `%`/`_` wildcards, case-sensitive
    Like,
    /// Case-insensitive substring match (`ILIKE '%v%'` or lower-cased `LIKE`)
    Contains,
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::NotEq),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            "like" => Ok(Operator::Like),
            "ilike" | "contains" => Ok(Operator::Contains),
            other => Err(QueryError::InvalidOperator {
                operator: other.to_string(),
            }),
        }
    }
}

/// How a predicate joins the ones before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boolean {
    #[default]
    And,
    Or,
}

impl FromStr for Boolean {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "and" => Ok(Boolean::And),
            "or" => Ok(Boolean::Or),
            other => Err(QueryError::InvalidOperator {
                operator: other.to_string(),
            }),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

impl FromStr for Direction {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ASC" => Ok(Direction::Asc),
            "DESC" => Ok(Direction::Desc),
            _ => Err(QueryError::InvalidDirection {
                direction: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Asc => write!(f, "ASC"),
            Direction::Desc => write!(f, "DESC"),
        }
    }
}

/// A possibly table-qualified column reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

impl ColumnRef {
    /// Parse `"column"` or `"table.column"`
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('.') {
            Some((table, column)) => Self::qualified(table, column),
            None => Self {
                table: None,
                column: raw.to_string(),
            },
        }
    }

    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

/// A single condition
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: ColumnRef,
        operator: Operator,
        value: FieldValue,
    },
    In {
        column: ColumnRef,
        values: Vec<FieldValue>,
    },
    /// "Has a related row (through `chain`) matching `predicate`".
    ///
    /// A semi-join: never duplicates base rows. Columns inside `predicate`
    /// are qualified with the last hop's table name.
    Exists {
        chain: Vec<String>,
        predicate: Box<Predicate>,
    },
    /// Parenthesized group of conditions
    Group(Vec<Where>),
}

/// A predicate with its connective
#[derive(Debug, Clone, PartialEq)]
pub struct Where {
    pub boolean: Boolean,
    pub predicate: Predicate,
}

/// `LEFT JOIN table AS alias ON left = right`
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub alias: String,
    pub left: ColumnRef,
    pub right: ColumnRef,
}

/// Selected output columns
#[derive(Debug, Clone, PartialEq)]
pub enum Select {
    /// `*`
    All,
    /// `table.*`
    TableAll(String),
    /// `column` or `expr AS alias`
    Column {
        column: ColumnRef,
        alias: Option<String>,
    },
}

/// What an ORDER BY entry sorts on
#[derive(Debug, Clone, PartialEq)]
pub enum OrderTarget {
    Column(ColumnRef),
    /// Search relevance score (only meaningful with a [`Search`])
    Relevance,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub target: OrderTarget,
    pub direction: Direction,
}

/// Relevance search over base-table columns
#[derive(Debug, Clone, PartialEq)]
pub struct Search {
    /// Lower-cased search words
    pub words: Vec<String>,
    /// Column -> relevance weight
    pub columns: IndexMap<String, f64>,
    /// Rows must score strictly above this
    pub threshold: f64,
}

/// A composed query against one base table
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub selects: Vec<Select>,
    pub wheres: Vec<Where>,
    pub joins: Vec<Join>,
    pub orders: Vec<Order>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub search: Option<Search>,
}

impl Query {
    /// Start a query on `table`
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            selects: Vec::new(),
            wheres: Vec::new(),
            joins: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: 0,
            search: None,
        }
    }

    pub fn push_where(mut self, clause: Where) -> Self {
        self.wheres.push(clause);
        self
    }

    /// `AND column <op> value`
    pub fn where_(self, column: &str, operator: Operator, value: impl Into<FieldValue>) -> Self {
        self.where_with(Boolean::And, column, operator, value)
    }

    /// `OR column <op> value`
    pub fn or_where(self, column: &str, operator: Operator, value: impl Into<FieldValue>) -> Self {
        self.where_with(Boolean::Or, column, operator, value)
    }

    pub fn where_with(
        self,
        boolean: Boolean,
        column: &str,
        operator: Operator,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.push_where(Where {
            boolean,
            predicate: Predicate::Compare {
                column: ColumnRef::parse(column),
                operator,
                value: value.into(),
            },
        })
    }

    pub fn where_in(self, column: &str, values: Vec<FieldValue>) -> Self {
        self.push_where(Where {
            boolean: Boolean::And,
            predicate: Predicate::In {
                column: ColumnRef::parse(column),
                values,
            },
        })
    }

    /// Existential clause through a relation chain
    pub fn where_has(self, chain: Vec<String>, predicate: Predicate) -> Self {
        self.push_where(Where {
            boolean: Boolean::And,
            predicate: Predicate::Exists {
                chain,
                predicate: Box::new(predicate),
            },
        })
    }

    /// Parenthesized AND-group of equality conditions
    pub fn where_group(self, boolean: Boolean, group: Vec<Where>) -> Self {
        if group.is_empty() {
            return self;
        }
        self.push_where(Where {
            boolean,
            predicate: Predicate::Group(group),
        })
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn has_join(&self, alias: &str) -> bool {
        self.joins.iter().any(|j| j.alias == alias)
    }

    pub fn order_by(mut self, column: ColumnRef, direction: Direction) -> Self {
        self.orders.push(Order {
            target: OrderTarget::Column(column),
            direction,
        });
        self
    }

    pub fn order_by_relevance(mut self) -> Self {
        self.orders.push(Order {
            target: OrderTarget::Relevance,
            direction: Direction::Desc,
        });
        self
    }

    pub fn select(mut self, select: Select) -> Self {
        if !self.selects.contains(&select) {
            self.selects.push(select);
        }
        self
    }

    /// Select from a raw column expression: `*`, `table.*`, `column`,
    /// `table.column` or `<column> AS alias`
    pub fn select_raw(self, raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "*" {
            return self.select(Select::All);
        }
        if let Some(table) = raw.strip_suffix(".*") {
            return self.select(Select::TableAll(table.to_string()));
        }
        match alias_regex().captures(raw) {
            Some(caps) => self.select(Select::Column {
                column: ColumnRef::parse(caps[1].trim()),
                alias: Some(caps[2].to_string()),
            }),
            None => self.select(Select::Column {
                column: ColumnRef::parse(raw),
                alias: None,
            }),
        }
    }

    pub fn search(mut self, search: Search) -> Self {
        self.search = Some(search);
        self
    }

    /// Window the query to a 1-based page
    pub fn for_page(mut self, page: usize, per_page: usize) -> Self {
        self.offset = crate::core::pagination::page_offset(page, per_page);
        self.limit = Some(per_page);
        self
    }

    /// The aggregate side query: same filters, no ordering, no window.
    ///
    /// Joins added by relation sorts stay, so a to-many sort counts one row
    /// per joined match.
    pub fn for_count(&self) -> Self {
        let mut query = self.clone();
        query.orders.clear();
        query.limit = None;
        query.offset = 0;
        query
    }

    /// Aliases declared by `expr AS alias` selects
    pub fn aliases(&self) -> IndexMap<String, ColumnRef> {
        self.selects
            .iter()
            .filter_map(|select| match select {
                Select::Column {
                    column,
                    alias: Some(alias),
                } => Some((alias.clone(), column.clone())),
                _ => None,
            })
            .collect()
    }

    /// Rewrite top-level conditions that name a select alias to the aliased
    /// column, since aliases are not visible to WHERE clauses
    pub fn resolve_aliases(mut self) -> Self {
        let aliases = self.aliases();
        if aliases.is_empty() || self.wheres.is_empty() {
            return self;
        }
        for clause in &mut self.wheres {
            let column = match &mut clause.predicate {
                Predicate::Compare { column, .. } | Predicate::In { column, .. } => column,
                _ => continue,
            };
            if column.table.is_some() {
                continue;
            }
            if let Some(target) = aliases.get(&column.column) {
                *column = target.clone();
            }
        }
        self
    }
}

fn alias_regex() -> &'static Regex {
    static ALIAS_REGEX: OnceLock<Regex> = OnceLock::new();
    ALIAS_REGEX.get_or_init(|| Regex::new(r"(?i)^(.+?)\s+AS\s+(\w+)$").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_parsing() {
        assert_eq!("=".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("<>".parse::<Operator>().unwrap(), Operator::NotEq);
        assert_eq!("LIKE".parse::<Operator>().unwrap(), Operator::Like);
        assert!("~~".parse::<Operator>().is_err());
    }

    #[test]
    fn test_direction_is_case_insensitive() {
        assert_eq!("asc".parse::<Direction>().unwrap(), Direction::Asc);
        assert_eq!("Desc".parse::<Direction>().unwrap(), Direction::Desc);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_column_ref_parse() {
        assert_eq!(ColumnRef::parse("email").table, None);
        let qualified = ColumnRef::parse("users.email");
        assert_eq!(qualified.table.as_deref(), Some("users"));
        assert_eq!(qualified.column, "email");
        assert_eq!(qualified.to_string(), "users.email");
    }

    #[test]
    fn test_for_count_strips_order_and_window() {
        let query = Query::table("users")
            .where_("active", Operator::Eq, true)
            .order_by(ColumnRef::parse("id"), Direction::Desc)
            .for_page(3, 10);
        assert_eq!(query.offset, 20);
        assert_eq!(query.limit, Some(10));

        let count = query.for_count();
        assert!(count.orders.is_empty());
        assert_eq!(count.limit, None);
        assert_eq!(count.offset, 0);
        assert_eq!(count.wheres, query.wheres);
    }

    #[test]
    fn test_select_raw_and_alias_resolution() {
        let query = Query::table("users")
            .select_raw("users.*")
            .select_raw("users.email AS login")
            .where_("login", Operator::Contains, "example");

        assert_eq!(query.selects[0], Select::TableAll("users".to_string()));
        assert_eq!(query.aliases().len(), 1);

        let resolved = query.resolve_aliases();
        match &resolved.wheres[0].predicate {
            Predicate::Compare { column, .. } => {
                assert_eq!(column, &ColumnRef::qualified("users", "email"))
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_select_is_deduplicated() {
        let query = Query::table("users").select_raw("users.*").select_raw("users.*");
        assert_eq!(query.selects.len(), 1);
    }
}
