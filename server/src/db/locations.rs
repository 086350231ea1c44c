//! Database operations on `storage_locations`: the StorageRouter's configuration source.

use super::models::StorageLocation;
use super::DbPool;
use uuid::Uuid;

const LOCATION_COLUMNS: &str =
    "id, name, group_id, backend, config, priority, is_default, read_only, created_at";

/// Register a new storage location. `config` is backend-specific JSON
/// (local root dir, S3 bucket/region/endpoint, mount path) validated by the
/// caller before insert.
pub async fn insert_location(
    pool: &DbPool,
    name: &str,
    group_id: Option<Uuid>,
    backend: &str,
    config: serde_json::Value,
    priority: i32,
    is_default: bool,
    read_only: bool,
) -> anyhow::Result<StorageLocation> {
    let row = sqlx::query_as::<_, StorageLocation>(&format!(
        r#"
        INSERT INTO storage_locations (name, group_id, backend, config, priority, is_default, read_only)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {LOCATION_COLUMNS}
        "#
    ))
    .bind(name)
    .bind(group_id)
    .bind(backend)
    .bind(config)
    .bind(priority)
    .bind(is_default)
    .bind(read_only)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Load every configured location, ordered so that the StorageRouter can apply
/// priority resolution (highest priority first, default last as the catch-all).
pub async fn list_locations(pool: &DbPool) -> anyhow::Result<Vec<StorageLocation>> {
    let rows = sqlx::query_as::<_, StorageLocation>(&format!(
        r#"
        SELECT {LOCATION_COLUMNS}
        FROM storage_locations
        ORDER BY priority DESC, is_default ASC, created_at ASC
        "#
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn get_location(pool: &DbPool, id: Uuid) -> anyhow::Result<Option<StorageLocation>> {
    let row = sqlx::query_as::<_, StorageLocation>(&format!(
        r#"
        SELECT {LOCATION_COLUMNS}
        FROM storage_locations
        WHERE id = $1
        "#
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn get_default_location(pool: &DbPool) -> anyhow::Result<Option<StorageLocation>> {
    let row = sqlx::query_as::<_, StorageLocation>(&format!(
        r#"
        SELECT {LOCATION_COLUMNS}
        FROM storage_locations
        WHERE is_default
        "#
    ))
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Update a location's routing config in place. Used by config hot-reload; the
/// StorageRouter diff's the returned row against its live backend map and only
/// rebuilds backend instances whose config actually changed.
#[allow(clippy::too_many_arguments)]
pub async fn update_location(
    pool: &DbPool,
    id: Uuid,
    config: serde_json::Value,
    priority: i32,
    is_default: bool,
    read_only: bool,
) -> anyhow::Result<StorageLocation> {
    let row = sqlx::query_as::<_, StorageLocation>(&format!(
        r#"
        UPDATE storage_locations
        SET config = $1, priority = $2, is_default = $3, read_only = $4
        WHERE id = $5
        RETURNING {LOCATION_COLUMNS}
        "#
    ))
    .bind(config)
    .bind(priority)
    .bind(is_default)
    .bind(read_only)
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn delete_location(pool: &DbPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM storage_locations WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
