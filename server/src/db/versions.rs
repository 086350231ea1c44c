//! Database operations on `file_versions`: immutable history of prior content states.

use super::models::FileVersion;
use super::DbPool;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

const VERSION_COLUMNS: &str = "id, file_id, path_at_snapshot, version, size_bytes, \
     content_hash, object_key, storage_location_id, created_at";

/// Snapshot the current content pointer of a file before it is overwritten.
/// Called inside the same transaction as [`super::files::update_content`].
#[allow(clippy::too_many_arguments)]
pub async fn insert_version(
    tx: &mut Transaction<'_, Postgres>,
    file_id: Uuid,
    path_at_snapshot: &str,
    version: i64,
    size_bytes: i64,
    content_hash: &str,
    object_key: &str,
    storage_location_id: Option<Uuid>,
) -> anyhow::Result<FileVersion> {
    let row = sqlx::query_as::<_, FileVersion>(&format!(
        r#"
        INSERT INTO file_versions
            (file_id, path_at_snapshot, version, size_bytes, content_hash, object_key, storage_location_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {VERSION_COLUMNS}
        "#
    ))
    .bind(file_id)
    .bind(path_at_snapshot)
    .bind(version)
    .bind(size_bytes)
    .bind(content_hash)
    .bind(object_key)
    .bind(storage_location_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(row)
}

/// List the version history of a file, newest first.
pub async fn list_versions(
    pool: &DbPool,
    file_id: Uuid,
    limit: i64,
    offset: i64,
) -> anyhow::Result<(Vec<FileVersion>, i64)> {
    let versions = sqlx::query_as::<_, FileVersion>(&format!(
        r#"
        SELECT {VERSION_COLUMNS}
        FROM file_versions
        WHERE file_id = $1
        ORDER BY version DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(file_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM file_versions WHERE file_id = $1")
        .bind(file_id)
        .fetch_one(pool)
        .await?;

    Ok((versions, total.0))
}

/// Fetch one historical version by its version number.
pub async fn get_version(
    pool: &DbPool,
    file_id: Uuid,
    version: i64,
) -> anyhow::Result<Option<FileVersion>> {
    let row = sqlx::query_as::<_, FileVersion>(&format!(
        r#"
        SELECT {VERSION_COLUMNS}
        FROM file_versions
        WHERE file_id = $1 AND version = $2
        "#
    ))
    .bind(file_id)
    .bind(version)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Fetch every version of a file that references a given storage location, used when
/// a location is decommissioned to check whether it can be dropped safely.
pub async fn count_versions_on_location(pool: &DbPool, location_id: Uuid) -> anyhow::Result<i64> {
    let count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM file_versions WHERE storage_location_id = $1")
            .bind(location_id)
            .fetch_one(pool)
            .await?;

    Ok(count.0)
}
