//! Eager loading of relations onto fetched records

use crate::core::error::Result;
use crate::core::field::FieldValue;
use crate::core::record::Record;
use crate::core::schema::{Relation, RelationKind};
use crate::query::builder::Query;
use crate::storage::DataStore;
use futures::future::BoxFuture;

/// Attach every relation in `relations` to `records`.
///
/// Each relation costs one `IN (...)` query per hop (two for many-to-many),
/// regardless of how many records are loaded. Nested paths such as
/// `"posts.comments"` load each level in turn.
pub async fn load(
    store: &dyn DataStore,
    records: Vec<Record>,
    relations: &[String],
) -> Result<Vec<Record>> {
    let mut records = records;
    if records.is_empty() {
        return Ok(records);
    }
    for path in relations {
        let hops: Vec<&str> = path.split('.').collect();
        records = load_path(store, records, &hops).await?;
    }
    Ok(records)
}

fn load_path<'a>(
    store: &'a dyn DataStore,
    records: Vec<Record>,
    hops: &'a [&'a str],
) -> BoxFuture<'a, Result<Vec<Record>>> {
    Box::pin(async move {
        let Some((hop, rest)) = hops.split_first() else {
            return Ok(records);
        };
        let Some(table) = records.first().map(|r| r.table().to_string()) else {
            return Ok(records);
        };

        let relation = store.schema().relation(&table, hop)?.clone();
        tracing::debug!(table = %table, relation = %relation.name, "eager load");

        let mut related = fetch_related(store, &records, &relation).await?;
        if !rest.is_empty() {
            let children: Vec<Record> = related.iter().map(|(_, r)| r.clone()).collect();
            let loaded = load_path(store, children, rest).await?;
            related = related
                .into_iter()
                .zip(loaded)
                .map(|((owner, _), record)| (owner, record))
                .collect();
        }

        Ok(records
            .into_iter()
            .map(|mut record| {
                let owner = owner_key(&record, &relation);
                let mut matched: Vec<Record> = related
                    .iter()
                    .filter(|(key, _)| owner.as_ref().is_some_and(|owner| owner.loose_eq(key)))
                    .map(|(_, r)| r.clone())
                    .collect();
                if relation.kind.is_to_one() {
                    matched.truncate(1);
                }
                record.set_relation(hop.to_string(), matched);
                record
            })
            .collect())
    })
}

/// The parent-side value related rows are matched against
fn owner_key(record: &Record, relation: &Relation) -> Option<FieldValue> {
    let column = match relation.kind {
        RelationKind::BelongsTo => &relation.foreign_key,
        _ => &relation.local_key,
    };
    record.get(column).filter(|v| !v.is_null()).cloned()
}

fn distinct_keys(records: &[Record], relation: &Relation) -> Vec<FieldValue> {
    let mut keys: Vec<FieldValue> = Vec::new();
    for key in records.iter().filter_map(|r| owner_key(r, relation)) {
        if !keys.iter().any(|k| k.loose_eq(&key)) {
            keys.push(key);
        }
    }
    keys
}

/// Related rows paired with the parent-side key each one belongs to
async fn fetch_related(
    store: &dyn DataStore,
    records: &[Record],
    relation: &Relation,
) -> Result<Vec<(FieldValue, Record)>> {
    let keys = distinct_keys(records, relation);
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let related = Query::table(relation.related.as_str());
    match (relation.kind, &relation.pivot) {
        (RelationKind::HasOne | RelationKind::HasMany, _) => {
            let rows = store
                .get(&related.where_in(&relation.foreign_key, keys), &[])
                .await?;
            Ok(paired(rows, &relation.foreign_key))
        }
        (RelationKind::BelongsTo, _) => {
            let rows = store
                .get(&related.where_in(&relation.local_key, keys), &[])
                .await?;
            Ok(paired(rows, &relation.local_key))
        }
        (RelationKind::BelongsToMany, Some(pivot)) => {
            let links = store
                .get(
                    &Query::table(pivot.table.as_str()).where_in(&pivot.foreign_pivot_key, keys),
                    &[],
                )
                .await?;
            let targets: Vec<FieldValue> = links
                .iter()
                .filter_map(|link| link.get(&pivot.related_pivot_key).cloned())
                .collect();
            if targets.is_empty() {
                return Ok(Vec::new());
            }

            let related_key = store.schema().related_key(relation)?.to_string();
            let rows = store.get(&related.where_in(&related_key, targets), &[]).await?;

            let mut pairs = Vec::new();
            for link in &links {
                let (Some(owner), Some(target)) = (
                    link.get(&pivot.foreign_pivot_key),
                    link.get(&pivot.related_pivot_key),
                ) else {
                    continue;
                };
                pairs.extend(
                    rows.iter()
                        .filter(|row| row.get(&related_key).is_some_and(|k| k.loose_eq(target)))
                        .map(|row| (owner.clone(), row.clone())),
                );
            }
            Ok(pairs)
        }
        (RelationKind::BelongsToMany, None) => Ok(Vec::new()),
    }
}

fn paired(rows: Vec<Record>, column: &str) -> Vec<(FieldValue, Record)> {
    rows.into_iter()
        .filter_map(|row| row.get(column).cloned().map(|key| (key, row)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::attributes;
    use crate::core::schema::{Pivot, Schema, TableSchema};
    use crate::storage::InMemoryDataStore;

    fn schema() -> Schema {
        Schema::new()
            .with_table(
                TableSchema::new("users", "id")
                    .has_one("password", "password_resets", "user_id", "id")
                    .belongs_to_many(
                        "roles",
                        "roles",
                        Pivot {
                            table: "role_user".to_string(),
                            foreign_pivot_key: "user_id".to_string(),
                            related_pivot_key: "role_id".to_string(),
                        },
                        "id",
                    ),
            )
            .with_table(
                TableSchema::new("password_resets", "id")
                    .belongs_to("user", "users", "user_id", "id"),
            )
            .with_table(TableSchema::new("roles", "id"))
            .with_table(TableSchema::new("role_user", "id"))
    }

    async fn seeded() -> InMemoryDataStore {
        let store = InMemoryDataStore::new(schema());
        for i in 1..=3 {
            store
                .create("users", attributes([("email", format!("u{}@x.io", i).into())]))
                .await
                .unwrap();
        }
        for (user, token) in [(1, "aaa"), (2, "bbb")] {
            store
                .create(
                    "password_resets",
                    attributes([("user_id", user.into()), ("token", token.into())]),
                )
                .await
                .unwrap();
        }
        for name in ["admin", "editor"] {
            store.create("roles", attributes([("name", name.into())])).await.unwrap();
        }
        for (user, role) in [(1, 1), (1, 2), (3, 2)] {
            store
                .create("role_user", attributes([("user_id", user.into()), ("role_id", role.into())]))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_has_one_and_belongs_to_many() {
        let store = seeded().await;
        let users = store
            .get(&Query::table("users"), &[])
            .await
            .unwrap();

        let loaded = load(&store, users, &["password".to_string(), "roles".to_string()])
            .await
            .unwrap();

        assert_eq!(loaded[0].relation("password").map(<[Record]>::len), Some(1));
        assert_eq!(loaded[2].relation("password").map(<[Record]>::len), Some(0));
        assert_eq!(loaded[0].relation("roles").map(<[Record]>::len), Some(2));
        assert_eq!(loaded[1].relation("roles").map(<[Record]>::len), Some(0));
        assert_eq!(loaded[2].relation("roles").map(<[Record]>::len), Some(1));
    }

    #[tokio::test]
    async fn test_nested_belongs_to() {
        let store = seeded().await;
        let users = store
            .get(&Query::table("users"), &[])
            .await
            .unwrap();

        let loaded = load(&store, users, &["password.user".to_string()]).await.unwrap();
        let password = &loaded[1].relation("password").unwrap()[0];
        let owner = &password.relation("user").unwrap()[0];
        assert_eq!(owner.key(), FieldValue::Integer(2));
    }

    #[tokio::test]
    async fn test_unknown_relation_fails() {
        let store = seeded().await;
        let users = store
            .get(&Query::table("users"), &[])
            .await
            .unwrap();
        assert!(load(&store, users, &["ghost".to_string()]).await.is_err());
    }
}
