use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await?;

    sqlx::migrate!().run(&db_pool).await?;
    info!("database ready at {database_url}");

    Ok(db_pool)
}

/// A private in-memory database. One connection, never recycled, or the data
/// would vanish with it.
pub async fn memory() -> anyhow::Result<SqlitePool> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!().run(&db_pool).await?;

    Ok(db_pool)
}

/// Server-assigned timestamps, in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
