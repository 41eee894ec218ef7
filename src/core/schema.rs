//! Table and relation metadata
//!
//! The query pipeline never guesses how tables relate: every relation hop in a
//! filter, sort or eager load is resolved against a [`Schema`], and a hop that
//! does not resolve is a [`QueryError::UnknownRelation`].

use crate::core::error::QueryError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Separator between relation hops in a column path (`"passwords.token"`)
pub const HOP_SEPARATOR: char = '.';

/// The kind of a relation, which decides the key pairing used to join it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// `related.foreign_key = parent.local_key`, at most one row
    HasOne,
    /// `related.foreign_key = parent.local_key`, any number of rows
    HasMany,
    /// `parent.foreign_key = related.local_key` (the inverse side)
    BelongsTo,
    /// `pivot.foreign_pivot_key = parent.local_key` and
    /// `pivot.related_pivot_key = related.<primary key>`
    BelongsToMany,
}

impl RelationKind {
    /// Relations that yield at most one related row
    pub fn is_to_one(&self) -> bool {
        matches!(self, RelationKind::HasOne | RelationKind::BelongsTo)
    }
}

/// Pivot table of a many-to-many relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub table: String,
    /// Pivot column holding the parent's key
    pub foreign_pivot_key: String,
    /// Pivot column holding the related row's key
    pub related_pivot_key: String,
}

/// A named relation from one table to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    /// Related table name
    pub related: String,
    /// See [`RelationKind`] for which side holds this column
    pub foreign_key: String,
    /// See [`RelationKind`] for which side holds this column
    pub local_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot: Option<Pivot>,
}

/// Metadata for one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub primary_key: String,
    /// Declared columns. Empty means the table accepts any column.
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub relations: IndexMap<String, Relation>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            columns: Vec::new(),
            relations: IndexMap::new(),
        }
    }

    /// Declare the table's columns
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_one(self, name: &str, related: &str, foreign_key: &str, local_key: &str) -> Self {
        self.relation(name, RelationKind::HasOne, related, foreign_key, local_key, None)
    }

    pub fn has_many(self, name: &str, related: &str, foreign_key: &str, local_key: &str) -> Self {
        self.relation(name, RelationKind::HasMany, related, foreign_key, local_key, None)
    }

    pub fn belongs_to(self, name: &str, related: &str, foreign_key: &str, owner_key: &str) -> Self {
        self.relation(name, RelationKind::BelongsTo, related, foreign_key, owner_key, None)
    }

    pub fn belongs_to_many(
        self,
        name: &str,
        related: &str,
        pivot: Pivot,
        local_key: &str,
    ) -> Self {
        let foreign_key = pivot.foreign_pivot_key.clone();
        self.relation(
            name,
            RelationKind::BelongsToMany,
            related,
            &foreign_key,
            local_key,
            Some(pivot),
        )
    }

    fn relation(
        mut self,
        name: &str,
        kind: RelationKind,
        related: &str,
        foreign_key: &str,
        local_key: &str,
        pivot: Option<Pivot>,
    ) -> Self {
        self.relations.insert(
            name.to_string(),
            Relation {
                name: name.to_string(),
                kind,
                related: related.to_string(),
                foreign_key: foreign_key.to_string(),
                local_key: local_key.to_string(),
                pivot,
            },
        );
        self
    }

    /// Whether `column` may be referenced on this table
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.is_empty() || column == self.primary_key || self.columns.iter().any(|c| c == column)
    }

    /// Fail with [`QueryError::UnknownColumn`] when the column is not declared
    pub fn ensure_column(&self, column: &str) -> Result<(), QueryError> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(QueryError::UnknownColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
        }
    }
}

/// All tables known to a data store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    tables: IndexMap<String, TableSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style table registration
    pub fn with_table(mut self, table: TableSchema) -> Self {
        self.add_table(table);
        self
    }

    pub fn add_table(&mut self, table: TableSchema) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn table(&self, name: &str) -> Result<&TableSchema, QueryError> {
        self.tables.get(name).ok_or_else(|| QueryError::UnknownTable {
            table: name.to_string(),
        })
    }

    pub fn relation(&self, table: &str, name: &str) -> Result<&Relation, QueryError> {
        self.table(table)?
            .relations
            .get(name)
            .ok_or_else(|| QueryError::UnknownRelation {
                table: table.to_string(),
                relation: name.to_string(),
            })
    }

    /// Resolve a chain of relation hops starting at `table`
    pub fn resolve_chain(&self, table: &str, hops: &[&str]) -> Result<Vec<&Relation>, QueryError> {
        let mut current = table;
        let mut resolved = Vec::with_capacity(hops.len());
        for hop in hops {
            let relation = self.relation(current, hop)?;
            // The related table must exist too, or later joins have nothing to read
            self.table(&relation.related)?;
            current = &relation.related;
            resolved.push(relation);
        }
        Ok(resolved)
    }

    /// Primary key of the table a relation points to
    pub fn related_key(&self, relation: &Relation) -> Result<&str, QueryError> {
        Ok(&self.table(&relation.related)?.primary_key)
    }
}

/// Split a column path on its last separator into `(hops, leaf column)`.
///
/// `"column"` yields no hops; `"a.b.column"` yields `(["a", "b"], "column")`.
pub fn split_path(path: &str) -> (Vec<&str>, &str) {
    match path.rfind(HOP_SEPARATOR) {
        Some(index) => {
            let chain = &path[..index];
            let leaf = &path[index + 1..];
            (chain.split(HOP_SEPARATOR).collect(), leaf)
        }
        None => (Vec::new(), path),
    }
}

/// Whether a column path contains a relation hop
pub fn is_relation_path(path: &str) -> bool {
    path.contains(HOP_SEPARATOR)
}
