//! Multi-column sorting, direct and through joined relations

use crate::core::error::Result;
use crate::core::schema::{Relation, RelationKind, Schema, is_relation_path, split_path};
use crate::query::builder::{ColumnRef, Direction, Join, Query, Select};
use indexmap::IndexMap;

/// Column path -> direction. Earlier keys take precedence; later keys break ties.
pub type SortSpec = IndexMap<String, Direction>;

/// Separator used to build join aliases from relation paths
const ALIAS_SEPARATOR: &str = "__";

/// Order by a base-table column
pub fn sort_by(query: Query, schema: &Schema, column: &str, direction: Direction) -> Result<Query> {
    schema.table(&query.table)?.ensure_column(column)?;
    let column = ColumnRef::qualified(query.table.as_str(), column);
    tracing::debug!(table = %query.table, column = %column, %direction, "sort");
    Ok(query.order_by(column, direction))
}

/// Order by a column reached through relation hops.
///
/// Unlike filtering this needs a real join, since the ordering needs the
/// joined value. Each hop is joined once under an alias derived from its path,
/// and the base table's columns are re-selected so rows still hydrate as the
/// base entity.
pub fn sort_by_relation(
    query: Query,
    schema: &Schema,
    path: &str,
    direction: Direction,
) -> Result<Query> {
    let (hops, leaf) = split_path(path);
    let chain = schema.resolve_chain(&query.table, &hops)?;

    let base = query.table.clone();
    let mut query = query;
    let mut parent_alias = base.clone();

    for (index, relation) in chain.iter().enumerate() {
        let alias = hops[..=index].join(ALIAS_SEPARATOR);
        if !query.has_join(&alias) {
            for join in relation_joins(schema, relation, &parent_alias, &alias)? {
                query = query.join(join);
            }
        }
        parent_alias = alias;
    }

    if let Some(relation) = chain.last() {
        schema.table(&relation.related)?.ensure_column(leaf)?;
    }

    let column = ColumnRef::qualified(parent_alias, leaf);
    tracing::debug!(table = %base, column = %column, %direction, "sort through relation");

    Ok(query
        .select(Select::TableAll(base))
        .order_by(column, direction))
}

/// Joins needed to reach `relation` from the row aliased `parent`
fn relation_joins(
    schema: &Schema,
    relation: &Relation,
    parent: &str,
    alias: &str,
) -> Result<Vec<Join>> {
    let joins = match relation.kind {
        RelationKind::HasOne | RelationKind::HasMany => vec![Join {
            table: relation.related.clone(),
            alias: alias.to_string(),
            left: ColumnRef::qualified(alias, relation.foreign_key.as_str()),
            right: ColumnRef::qualified(parent, relation.local_key.as_str()),
        }],
        RelationKind::BelongsTo => vec![Join {
            table: relation.related.clone(),
            alias: alias.to_string(),
            left: ColumnRef::qualified(alias, relation.local_key.as_str()),
            right: ColumnRef::qualified(parent, relation.foreign_key.as_str()),
        }],
        RelationKind::BelongsToMany => {
            let related_key = schema.related_key(relation)?;
            let pivot = relation.pivot.as_ref().ok_or_else(|| {
                crate::core::error::QueryError::UnknownRelation {
                    table: parent.to_string(),
                    relation: relation.name.clone(),
                }
            })?;
            let pivot_alias = format!("{}{}pivot", alias, ALIAS_SEPARATOR);
            vec![
                Join {
                    table: pivot.table.clone(),
                    alias: pivot_alias.clone(),
                    left: ColumnRef::qualified(pivot_alias.as_str(), pivot.foreign_pivot_key.as_str()),
                    right: ColumnRef::qualified(parent, relation.local_key.as_str()),
                },
                Join {
                    table: relation.related.clone(),
                    alias: alias.to_string(),
                    left: ColumnRef::qualified(alias, related_key),
                    right: ColumnRef::qualified(pivot_alias.as_str(), pivot.related_pivot_key.as_str()),
                },
            ]
        }
    };
    Ok(joins)
}

/// Apply every sort in order. An empty spec leaves the query untouched.
pub fn multi_sort_by(query: Query, schema: &Schema, sort: &SortSpec) -> Result<Query> {
    sort.iter().try_fold(query, |query, (column, direction)| {
        if is_relation_path(column) {
            sort_by_relation(query, schema, column, *direction)
        } else {
            sort_by(query, schema, column, *direction)
        }
    })
}
