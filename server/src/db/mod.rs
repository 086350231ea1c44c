pub mod files;
pub mod locations;
pub mod models;
pub mod uploads;
pub mod users;
pub mod versions;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

pub type DbPool = Pool<Postgres>;

// Re-export commonly used types
pub use models::{
    ChangeEvent, ChangeKind, ChunkRecord, ChunkedUpload, FileEntry, FileVersion, StorageLocation,
    UploadStatus, User, Visibility,
};

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(25)
        .min_connections(5)
        .max_lifetime(Duration::from_secs(300))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations using SQLx's built-in migration tracking.
/// Migrations are tracked in the `_sqlx_migrations` table and only run once.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Server statistics, surfaced over the ops CLI and `/healthz`.
pub struct Stats {
    pub total_users: i64,
    pub total_files: i64,
    pub total_versions: i64,
    pub total_bytes: i64,
    pub total_locations: i64,
}

/// Get server statistics
pub async fn get_stats(pool: &DbPool) -> anyhow::Result<Stats> {
    let total_users: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    let total_files: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM files WHERE deleted_at IS NULL AND NOT is_dir")
            .fetch_one(pool)
            .await?;

    let total_versions: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM file_versions")
        .fetch_one(pool)
        .await?;

    let total_bytes: (Option<i64>,) = sqlx::query_as(
        "SELECT CAST(COALESCE(SUM(size_bytes), 0) AS BIGINT) FROM files WHERE deleted_at IS NULL",
    )
    .fetch_one(pool)
    .await?;

    let total_locations: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM storage_locations")
        .fetch_one(pool)
        .await?;

    Ok(Stats {
        total_users: total_users.0,
        total_files: total_files.0,
        total_versions: total_versions.0,
        total_bytes: total_bytes.0.unwrap_or(0),
        total_locations: total_locations.0,
    })
}
