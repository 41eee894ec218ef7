//! Macro-generated test suite for `Repository` contract validation.
//!
//! The `repository_contract_tests!` macro generates a test module that runs
//! the full repository contract against one strategy: lookups, writes,
//! criteria, grid requests, search, eager loading and dynamic calls.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[macro_use]
//! mod repository_harness;
//!
//! use repository_harness::*;
//!
//! repository_contract_tests!(direct);
//! ```
//!
//! # Generated Tests
//!
//! ## Lookups
//! - `test_find_existing` / `test_find_missing_is_none`
//! - `test_find_by_and_find_where`, `test_find_many`, `test_where_condition`
//! - `test_all_projects_columns`
//!
//! ## Writes
//! - `test_create_then_find`, `test_update_is_visible`, `test_update_missing_fails`
//! - `test_delete_then_find_is_none`
//!
//! ## Criteria
//! - `test_criteria_are_one_shot`, `test_remove_criteria`
//!
//! ## Grid
//! - `test_filter_password_not`, `test_relation_sort_both_directions`
//! - `test_boolean_coercion`, `test_paginate_windowing`, `test_fetch_links`
//!
//! ## Misc
//! - `test_search_scores_matches`, `test_eager_load_is_one_shot`
//! - `test_call_unknown_operation`, `test_unknown_transformer`

/// Generate a full `Repository` conformance test suite.
///
/// `$build` must be callable as `fn(Arc<dyn DataStore>) -> Arc<dyn Repository>`.
/// `$seed` and `$with_users` build the stores tests run against; they default
/// to the in-memory [`seeded_store`] and [`store_with_users`]. Every test
/// builds a fresh store.
#[macro_export]
macro_rules! repository_contract_tests {
    ($build:expr) => {
        repository_contract_tests!($build, seeded_store, store_with_users);
    };
    ($build:expr, $seed:path, $with_users:path) => {
        mod repository_contract_tests {
            use super::*;
            use repository::core::record::attributes;
            use repository::query::builder::{Direction, Operator};
            use repository::query::criteria::WhereCriterion;
            use repository::query::search::SearchColumns;
            use repository::repository::{Condition, GridRequest, Repository};
            use repository::storage::DataStore;
            use serde_json::json;
            use std::sync::Arc;

            async fn seeded() -> Arc<dyn Repository> {
                let store: Arc<dyn DataStore> = $seed().await;
                ($build)(store)
            }

            // ==================================================================
            // Lookups
            // ==================================================================

            #[tokio::test]
            async fn test_find_existing() {
                let repository = seeded().await;
                let user = repository.find(&id(3), &[]).await.unwrap().unwrap();
                assert_eq!(user.get("email"), Some(&"user3@example.com".into()));
                assert_eq!(user.table(), "users");
            }

            #[tokio::test]
            async fn test_find_missing_is_none() {
                let repository = seeded().await;
                assert!(repository.find(&id(999), &[]).await.unwrap().is_none());
            }

            #[tokio::test]
            async fn test_find_by_and_find_where() {
                let repository = seeded().await;
                let user = repository
                    .find_by("email", &"user7@example.com".into(), &["id", "email"])
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(user.key(), id(7));
                assert_eq!(user.attributes().len(), 2);

                assert!(
                    repository
                        .find_by("email", &"nobody@example.com".into(), &[])
                        .await
                        .unwrap()
                        .is_none()
                );

                let active = repository
                    .find_where(&attributes([("active", true.into())]), &[])
                    .await
                    .unwrap();
                assert_eq!(active.len(), USERS / 2);
            }

            #[tokio::test]
            async fn test_find_many() {
                let repository = seeded().await;
                let users = repository
                    .find_many(&[id(2), id(4), id(999)], &[])
                    .await
                    .unwrap();
                let mut found = ids(&users);
                found.sort();
                assert_eq!(found, vec![2, 4]);
                assert!(repository.find_many(&[], &[]).await.unwrap().is_empty());
            }

            #[tokio::test]
            async fn test_where_condition() {
                let repository = seeded().await;
                let users = repository
                    .where_(&Condition::new("id", "<=", 3), &[])
                    .await
                    .unwrap();
                assert_eq!(users.len(), 3);

                let users = repository
                    .where_(&Condition::new("id", "in", json!([1, 5])), &[])
                    .await
                    .unwrap();
                assert_eq!(ids(&users), vec![1, 5]);
            }

            #[tokio::test]
            async fn test_all_projects_columns() {
                let repository = seeded().await;
                let users = repository.all(&["id", "email"]).await.unwrap();
                assert_eq!(users.len(), USERS);
                assert!(users.iter().all(|u| u.attributes().len() == 2));
                assert_eq!(repository.count().await.unwrap(), USERS as u64);
            }

            // ==================================================================
            // Writes
            // ==================================================================

            #[tokio::test]
            async fn test_create_then_find() {
                let repository = seeded().await;
                let created = repository.create(user_attributes("new@example.com")).await.unwrap();
                assert_eq!(created.key(), id(USERS as i64 + 1));

                let found = repository.find(&created.key(), &[]).await.unwrap().unwrap();
                assert_eq!(found.get("email"), Some(&"new@example.com".into()));
                assert_eq!(repository.count().await.unwrap(), USERS as u64 + 1);
                assert_eq!(repository.all(&[]).await.unwrap().len(), USERS + 1);
            }

            #[tokio::test]
            async fn test_update_is_visible() {
                let repository = seeded().await;
                let before = repository.find(&id(1), &[]).await.unwrap().unwrap();
                assert_eq!(before.get("name"), Some(&"User 1".into()));

                let updated = repository
                    .update(&id(1), attributes([("name", "Renamed".into())]))
                    .await
                    .unwrap();
                assert_eq!(updated.get("name"), Some(&"Renamed".into()));

                let after = repository.find(&id(1), &[]).await.unwrap().unwrap();
                assert_eq!(after.get("name"), Some(&"Renamed".into()));
                assert_eq!(after.get("email"), Some(&"user1@example.com".into()));
            }

            #[tokio::test]
            async fn test_update_missing_fails() {
                let repository = seeded().await;
                let err = repository
                    .update(&id(999), attributes([("name", "Ghost".into())]))
                    .await
                    .unwrap_err();
                assert_eq!(err.error_code(), "RECORD_NOT_FOUND");
            }

            #[tokio::test]
            async fn test_delete_then_find_is_none() {
                let repository = seeded().await;
                assert!(repository.find(&id(2), &[]).await.unwrap().is_some());
                assert!(repository.delete(&id(2)).await.unwrap());
                assert!(repository.find(&id(2), &[]).await.unwrap().is_none());
                assert!(!repository.delete(&id(2)).await.unwrap());
                assert_eq!(repository.all(&[]).await.unwrap().len(), USERS - 1);
            }

            // ==================================================================
            // Criteria
            // ==================================================================

            #[tokio::test]
            async fn test_criteria_are_one_shot() {
                let repository = seeded().await;
                repository
                    .push_criteria(Arc::new(WhereCriterion::new("active", Operator::Eq, true)))
                    .unwrap();
                assert!(repository.criteria().unwrap().has_criteria());
                assert_eq!(repository.all(&[]).await.unwrap().len(), USERS / 2);

                assert!(!repository.criteria().unwrap().has_criteria());
                assert_eq!(repository.all(&[]).await.unwrap().len(), USERS);
            }

            #[tokio::test]
            async fn test_remove_criteria() {
                let repository = seeded().await;
                repository
                    .push_criteria_by_name("where", &json!({ "column": "active", "value": false }))
                    .unwrap();
                repository
                    .push_criteria_by_name("order_by", &json!({ "column": "id", "direction": "DESC" }))
                    .unwrap();
                assert!(repository.remove_criteria("where").unwrap());

                let users = repository.all(&[]).await.unwrap();
                assert_eq!(users.len(), USERS);
                assert_eq!(users[0].key(), id(USERS as i64));

                let err = repository.push_criteria_by_name("nope", &json!({})).unwrap_err();
                assert_eq!(err.error_code(), "INVALID_CRITERIA");
            }

            // ==================================================================
            // Grid
            // ==================================================================

            #[tokio::test]
            async fn test_filter_password_not() {
                let repository = seeded().await;
                let page = repository
                    .fetch(&GridRequest::new().per_page(5).filter("password", "not"))
                    .await
                    .unwrap();
                assert_eq!(page.items.len(), NOT_SECRET_USERS);
                assert_eq!(page.total, NOT_SECRET_USERS as u64);
                assert_eq!(ids(&page.items), vec![1, 2, 3, 4, 5]);

                let items = repository
                    .simple_fetch(&GridRequest::new().per_page(2).filter("password", "NOT"))
                    .await
                    .unwrap();
                assert_eq!(items.len(), 2);
            }

            #[tokio::test]
            async fn test_relation_sort_both_directions() {
                let repository = seeded().await;
                let ascending = repository
                    .fetch(&GridRequest::new().per_page(USERS).sort("password.token", Direction::Asc))
                    .await
                    .unwrap();
                let expected: Vec<i64> = (1..=USERS as i64).rev().collect();
                assert_eq!(ids(&ascending.items), expected);
                assert_eq!(ascending.total, USERS as u64);

                let descending = repository
                    .fetch(&GridRequest::new().per_page(USERS).sort("password.token", Direction::Desc))
                    .await
                    .unwrap();
                let mut reversed = ids(&ascending.items);
                reversed.reverse();
                assert_eq!(ids(&descending.items), reversed);
            }

            #[tokio::test]
            async fn test_boolean_coercion() {
                let repository = seeded().await;
                let active = repository
                    .simple_fetch(&GridRequest::new().per_page(USERS).filter("active", "true"))
                    .await
                    .unwrap();
                assert_eq!(active.len(), USERS / 2);
                assert!(active.iter().all(|u| u.get("active") == Some(&true.into())));

                let inactive = repository
                    .simple_fetch(&GridRequest::new().per_page(USERS).filter("active", "false"))
                    .await
                    .unwrap();
                assert_eq!(inactive.len(), USERS / 2);
                assert!(inactive.iter().all(|u| u.get("active") == Some(&false.into())));
            }

            #[tokio::test]
            async fn test_paginate_windowing() {
                let store: Arc<dyn DataStore> = $with_users(50).await;
                let repository = ($build)(store);

                let page = repository.paginate(Some(10), &[]).await.unwrap();
                assert_eq!(page.total, 50);
                assert_eq!(page.last_page(), 5);
                assert_eq!(ids(&page.items), (1..=10).collect::<Vec<i64>>());

                let last = repository.paginate_page(5, Some(10), &[]).await.unwrap();
                assert_eq!(ids(&last.items), (41..=50).collect::<Vec<i64>>());
                assert!(!last.has_more_pages());

                let default = repository.paginate(None, &[]).await.unwrap();
                assert_eq!(default.per_page, 15);
                assert_eq!(default.items.len(), 15);
            }

            #[tokio::test]
            async fn test_fetch_links() {
                let repository = seeded().await;
                let page = repository
                    .fetch(&GridRequest::new().page(2).per_page(5))
                    .await
                    .unwrap();
                assert_eq!(page.current_page, 2);
                assert_eq!(ids(&page.items), vec![6, 7, 8, 9, 10]);
                assert!(page.query.contains(&("perPage".to_string(), "5".to_string())));
            }

            // ==================================================================
            // Misc
            // ==================================================================

            #[tokio::test]
            async fn test_search_scores_matches() {
                let repository = seeded().await;
                let columns = SearchColumns::from([("password".to_string(), 4.0)]);
                let found = repository.search("notsecret", &columns, None).await.unwrap();
                let mut found = ids(&found);
                found.sort();
                assert_eq!(found, vec![1, 2, 3, 4, 5]);

                let err = repository
                    .search("x", &SearchColumns::from([("password.token".to_string(), 1.0)]), None)
                    .await
                    .unwrap_err();
                assert_eq!(err.error_code(), "UNSUPPORTED_SEARCH_COLUMN");
            }

            #[tokio::test]
            async fn test_eager_load_is_one_shot() {
                let repository = seeded().await;
                repository.with(&["password"]).unwrap();
                let user = repository.find(&id(4), &[]).await.unwrap().unwrap();
                let tokens = user.relation("password").unwrap();
                assert_eq!(tokens.len(), 1);
                assert_eq!(tokens[0].get("token"), Some(&token_for(4).into()));

                let user = repository.find(&id(4), &[]).await.unwrap().unwrap();
                assert!(user.relation("password").is_none());
            }

            #[tokio::test]
            async fn test_call_unknown_operation() {
                let repository = seeded().await;
                let err = repository.call("truncate", json!({})).await.unwrap_err();
                assert_eq!(err.error_code(), "UNKNOWN_OPERATION");

                let total = repository.call("count", json!({})).await.unwrap();
                assert_eq!(total, json!(USERS));
            }

            #[tokio::test]
            async fn test_unknown_transformer() {
                let repository = seeded().await;
                let err = repository.set_transformer(Some("public")).unwrap_err();
                assert_eq!(err.error_code(), "INVALID_TRANSFORMER");
            }
        }
    };
}
