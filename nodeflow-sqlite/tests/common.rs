use once_cell::sync::Lazy;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::env;

use nodeflow_sqlite::schema::init_schema;

// In-memory SQLite unless TEST_DATABASE_URL says otherwise.
static DATABASE_URL: Lazy<String> = Lazy::new(|| {
    env::var("TEST_DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string())
});

// One connection: every in-memory connection would otherwise see its own database.
pub async fn setup_pool() -> Pool<Sqlite> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&DATABASE_URL)
        .await
        .expect("Failed to create connection pool");

    init_schema(&pool).await.expect("Failed to apply schema");
    pool
}
