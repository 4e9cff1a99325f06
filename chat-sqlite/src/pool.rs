//! SQLite connection pool setup.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

/// Creates a pool for the given database URL (file path or `sqlite::memory:`);
/// the database file is created if missing.
///
/// The pool is capped at one connection: an in-memory database exists per
/// connection, and the write-through feed relies on readers seeing a write
/// as soon as the insert call returns.
pub async fn connect_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    info!(database_url, "Initializing SQLite pool");

    let options: SqliteConnectOptions = database_url.parse::<SqliteConnectOptions>()?;
    let options = options.create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
}
