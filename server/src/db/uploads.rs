//! Database operations backing resumable chunked uploads.

use super::models::{ChunkRecord, ChunkedUpload, UploadStatus};
use super::DbPool;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const UPLOAD_COLUMNS: &str =
    "id, user_id, target_path, total_size, chunk_size, total_chunks, status, expires_at, created_at";

/// Begin a new chunked upload session.
pub async fn create_upload(
    pool: &DbPool,
    user_id: Option<Uuid>,
    target_path: &str,
    total_size: i64,
    chunk_size: i64,
    total_chunks: i32,
    expires_at: DateTime<Utc>,
) -> anyhow::Result<ChunkedUpload> {
    let row = sqlx::query_as::<_, ChunkedUpload>(&format!(
        r#"
        INSERT INTO chunked_uploads (user_id, target_path, total_size, chunk_size, total_chunks, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {UPLOAD_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(target_path)
    .bind(total_size)
    .bind(chunk_size)
    .bind(total_chunks)
    .bind(expires_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_upload(pool: &DbPool, id: Uuid) -> anyhow::Result<Option<ChunkedUpload>> {
    let row = sqlx::query_as::<_, ChunkedUpload>(&format!(
        r#"SELECT {UPLOAD_COLUMNS} FROM chunked_uploads WHERE id = $1"#
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Record that a chunk landed on disk/object storage. Idempotent: re-uploading the
/// same chunk index just overwrites the size/received_at, so retried PUTs are safe.
pub async fn record_chunk(
    pool: &DbPool,
    upload_id: Uuid,
    chunk_index: i32,
    size_bytes: i64,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO chunked_upload_chunks (upload_id, chunk_index, size_bytes)
        VALUES ($1, $2, $3)
        ON CONFLICT (upload_id, chunk_index)
        DO UPDATE SET size_bytes = EXCLUDED.size_bytes, received_at = NOW()
        "#,
    )
    .bind(upload_id)
    .bind(chunk_index)
    .bind(size_bytes)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_received_chunks(
    pool: &DbPool,
    upload_id: Uuid,
) -> anyhow::Result<Vec<ChunkRecord>> {
    let rows = sqlx::query_as::<_, ChunkRecord>(
        r#"
        SELECT upload_id, chunk_index, size_bytes, received_at
        FROM chunked_upload_chunks
        WHERE upload_id = $1
        ORDER BY chunk_index ASC
        "#,
    )
    .bind(upload_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn set_status(pool: &DbPool, id: Uuid, status: UploadStatus) -> anyhow::Result<()> {
    sqlx::query("UPDATE chunked_uploads SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Uploads past their `expires_at` and still `active`; the sweeper aborts these
/// and reclaims their scratch chunks from storage.
pub async fn list_expired(pool: &DbPool, now: DateTime<Utc>) -> anyhow::Result<Vec<ChunkedUpload>> {
    let rows = sqlx::query_as::<_, ChunkedUpload>(&format!(
        r#"
        SELECT {UPLOAD_COLUMNS}
        FROM chunked_uploads
        WHERE status = 'active' AND expires_at < $1
        "#
    ))
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn delete_upload(pool: &DbPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM chunked_uploads WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
