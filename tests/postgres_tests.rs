//! Integration tests for `PostgresDataStore` using the repository test harness.
//!
//! Invokes `repository_contract_tests!` for both strategies so the SQL
//! rendering path honours the same contract as the in-memory store.
//!
//! # Requirements
//!
//! - Docker must be running (testcontainers launches a PostgreSQL container)
//! - Feature flag `postgres` must be enabled
//!
//! # Running
//!
//! ```sh
//! cargo test --features postgres --test postgres_tests -- --test-threads=1
//! ```
//!
//! # Test isolation
//!
//! All tests share a single PostgreSQL container (via `OnceLock`). Each test
//! creates a fresh `PgPool` and truncates the tables, restarting their key
//! sequences.

#![cfg(feature = "postgres")]

#[macro_use]
mod repository_harness;

use repository::storage::PostgresDataStore;
use repository_harness::*;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::{Arc, OnceLock};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;

// ---------------------------------------------------------------------------
// Shared test environment (single container, fresh pool per test)
// ---------------------------------------------------------------------------

/// Holds the testcontainer handle (keeps it alive) and the connection URL.
struct PgTestEnv {
    /// Container handle; dropping it stops the PostgreSQL container.
    _container: testcontainers::ContainerAsync<Postgres>,
    connection_url: String,
}

/// Global test environment, initialized once per test binary.
static TEST_ENV: OnceLock<PgTestEnv> = OnceLock::new();

const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        email TEXT NOT NULL,
        name TEXT,
        password TEXT,
        active BOOLEAN NOT NULL DEFAULT TRUE
    )",
    "CREATE TABLE IF NOT EXISTS password_resets (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        token TEXT NOT NULL
    )",
];

async fn init_pg_env() -> &'static PgTestEnv {
    if let Some(env) = TEST_ENV.get() {
        return env;
    }

    let container = Postgres::default()
        .start()
        .await
        .expect("Failed to start PostgreSQL container (is Docker running?)");

    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(5432).await.unwrap();
    let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

    let pool = PgPool::connect(&url)
        .await
        .expect("Failed to connect to PostgreSQL");
    for statement in CREATE_TABLES {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Failed to create tables");
    }
    pool.close().await;

    let _ = TEST_ENV.set(PgTestEnv {
        _container: container,
        connection_url: url,
    });
    TEST_ENV.get().unwrap()
}

/// Fresh pool bound to the current runtime, over emptied tables
async fn clean_pool() -> PgPool {
    let env = init_pg_env().await;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&env.connection_url)
        .await
        .expect("Failed to connect to PostgreSQL");
    sqlx::query("TRUNCATE users, password_resets RESTART IDENTITY CASCADE")
        .execute(&pool)
        .await
        .expect("Failed to truncate tables");
    pool
}

async fn pg_seeded_store() -> Arc<PostgresDataStore> {
    let store = Arc::new(PostgresDataStore::new(clean_pool().await, schema()));
    seed(store.as_ref()).await;
    store
}

async fn pg_store_with_users(count: usize) -> Arc<PostgresDataStore> {
    let store = Arc::new(PostgresDataStore::new(clean_pool().await, schema()));
    add_users(store.as_ref(), count).await;
    store
}

mod direct_strategy {
    use super::*;
    repository_contract_tests!(direct, pg_seeded_store, pg_store_with_users);
}

mod cached_strategy {
    use super::*;
    repository_contract_tests!(cached, pg_seeded_store, pg_store_with_users);
}
