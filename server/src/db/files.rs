//! Database operations on the `files` table: the live (non-version-history) tree state.

use super::models::{FileEntry, Visibility};
use super::DbPool;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

/// Stable identifier for a path, independent of the row's surrogate key.
/// TreeCache and the client cache key off this rather than the UUID so that
/// a rename followed by a restore from trash still resolves to the same id.
pub fn compute_path_id(path: &str) -> String {
    let digest = Sha256::digest(path.as_bytes());
    hex::encode(&digest[..8])
}

/// Split a normalized path ("/a/b/c.txt") into (parent, name).
pub fn split_path(path: &str) -> (String, String) {
    match path.rfind('/') {
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(idx) => (path[..idx].to_string(), path[idx + 1..].to_string()),
        None => ("/".to_string(), path.to_string()),
    }
}

const FILE_COLUMNS: &str = "id, path, path_id, name, parent_path, is_dir, size_bytes, \
     content_hash, object_key, storage_location_id, version, owner_id, visibility, \
     group_id, deleted_at, deleted_by, original_path, created_at, modified_at";

/// Create a directory or empty placeholder file row.
pub async fn insert_file(
    pool: &DbPool,
    path: &str,
    is_dir: bool,
    owner_id: Option<Uuid>,
    visibility: Visibility,
    group_id: Option<Uuid>,
) -> anyhow::Result<FileEntry> {
    let (parent_path, name) = split_path(path);
    let path_id = compute_path_id(path);

    let file = sqlx::query_as::<_, FileEntry>(&format!(
        r#"
        INSERT INTO files (path, path_id, name, parent_path, is_dir, owner_id, visibility, group_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {FILE_COLUMNS}
        "#
    ))
    .bind(path)
    .bind(&path_id)
    .bind(&name)
    .bind(&parent_path)
    .bind(is_dir)
    .bind(owner_id)
    .bind(visibility)
    .bind(group_id)
    .fetch_one(pool)
    .await?;

    Ok(file)
}

/// Look up a non-deleted file by its absolute path.
pub async fn get_file_by_path(pool: &DbPool, path: &str) -> anyhow::Result<Option<FileEntry>> {
    let file = sqlx::query_as::<_, FileEntry>(&format!(
        r#"
        SELECT {FILE_COLUMNS}
        FROM files
        WHERE path = $1 AND deleted_at IS NULL
        "#
    ))
    .bind(path)
    .fetch_optional(pool)
    .await?;

    Ok(file)
}

/// Same lookup as [`get_file_by_path`], but takes a row lock so the caller can safely
/// read-modify-write the version column inside a transaction.
pub async fn get_file_by_path_for_update(
    tx: &mut Transaction<'_, Postgres>,
    path: &str,
) -> anyhow::Result<Option<FileEntry>> {
    let file = sqlx::query_as::<_, FileEntry>(&format!(
        r#"
        SELECT {FILE_COLUMNS}
        FROM files
        WHERE path = $1 AND deleted_at IS NULL
        FOR UPDATE
        "#
    ))
    .bind(path)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(file)
}

/// List the direct, non-deleted children of a directory path.
pub async fn list_children(pool: &DbPool, parent_path: &str) -> anyhow::Result<Vec<FileEntry>> {
    let files = sqlx::query_as::<_, FileEntry>(&format!(
        r#"
        SELECT {FILE_COLUMNS}
        FROM files
        WHERE parent_path = $1 AND deleted_at IS NULL
        ORDER BY is_dir DESC, name ASC
        "#
    ))
    .bind(parent_path)
    .fetch_all(pool)
    .await?;

    Ok(files)
}

/// Load every non-deleted row, used to rebuild the TreeCache from scratch.
pub async fn list_all_active(pool: &DbPool) -> anyhow::Result<Vec<FileEntry>> {
    let files = sqlx::query_as::<_, FileEntry>(&format!(
        r#"
        SELECT {FILE_COLUMNS}
        FROM files
        WHERE deleted_at IS NULL
        ORDER BY parent_path ASC, name ASC
        "#
    ))
    .fetch_all(pool)
    .await?;

    Ok(files)
}

/// Bump a file's content pointer inside an open transaction, enforcing optimistic
/// concurrency against `expected_version`. Returns `Ok(None)` on a version mismatch
/// rather than an error so the caller can translate it into a 409 Conflict.
#[allow(clippy::too_many_arguments)]
pub async fn update_content(
    tx: &mut Transaction<'_, Postgres>,
    file_id: Uuid,
    expected_version: i64,
    new_version: i64,
    size_bytes: i64,
    content_hash: &str,
    object_key: &str,
    storage_location_id: Uuid,
) -> anyhow::Result<Option<FileEntry>> {
    let file = sqlx::query_as::<_, FileEntry>(&format!(
        r#"
        UPDATE files
        SET version = $1,
            size_bytes = $2,
            content_hash = $3,
            object_key = $4,
            storage_location_id = $5,
            modified_at = NOW()
        WHERE id = $6 AND version = $7 AND deleted_at IS NULL
        RETURNING {FILE_COLUMNS}
        "#
    ))
    .bind(new_version)
    .bind(size_bytes)
    .bind(content_hash)
    .bind(object_key)
    .bind(storage_location_id)
    .bind(file_id)
    .bind(expected_version)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(file)
}

/// Move/rename a live entry, updating the denormalized parent_path/name columns.
pub async fn rename(pool: &DbPool, file_id: Uuid, new_path: &str) -> anyhow::Result<FileEntry> {
    let (parent_path, name) = split_path(new_path);
    let path_id = compute_path_id(new_path);

    let file = sqlx::query_as::<_, FileEntry>(&format!(
        r#"
        UPDATE files
        SET path = $1, path_id = $2, name = $3, parent_path = $4, modified_at = NOW()
        WHERE id = $5 AND deleted_at IS NULL
        RETURNING {FILE_COLUMNS}
        "#
    ))
    .bind(new_path)
    .bind(&path_id)
    .bind(&name)
    .bind(&parent_path)
    .bind(file_id)
    .fetch_one(pool)
    .await?;

    Ok(file)
}

/// Soft-delete: move the row out of the live namespace into the trash.
/// `path` is freed up for reuse by clearing it and stashing the prior value in
/// `original_path`, since the live-path UNIQUE index would otherwise block a
/// subsequent create at the same path.
pub async fn soft_delete(pool: &DbPool, file_id: Uuid, deleted_by: Option<Uuid>) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE files
        SET deleted_at = NOW(),
            deleted_by = $1,
            original_path = path,
            path = path || '#deleted#' || id::text
        WHERE id = $2 AND deleted_at IS NULL
        "#,
    )
    .bind(deleted_by)
    .bind(file_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Restore a trashed entry back to its original path (or a caller-supplied one
/// if the original is already occupied).
pub async fn restore(pool: &DbPool, file_id: Uuid, restore_path: &str) -> anyhow::Result<FileEntry> {
    let (parent_path, name) = split_path(restore_path);
    let path_id = compute_path_id(restore_path);

    let file = sqlx::query_as::<_, FileEntry>(&format!(
        r#"
        UPDATE files
        SET path = $1, path_id = $2, name = $3, parent_path = $4,
            deleted_at = NULL, deleted_by = NULL, original_path = NULL, modified_at = NOW()
        WHERE id = $5
        RETURNING {FILE_COLUMNS}
        "#
    ))
    .bind(restore_path)
    .bind(&path_id)
    .bind(&name)
    .bind(&parent_path)
    .bind(file_id)
    .fetch_one(pool)
    .await?;

    Ok(file)
}

/// List trashed entries, most recently deleted first.
pub async fn list_trash(pool: &DbPool) -> anyhow::Result<Vec<FileEntry>> {
    let files = sqlx::query_as::<_, FileEntry>(&format!(
        r#"
        SELECT {FILE_COLUMNS}
        FROM files
        WHERE deleted_at IS NOT NULL
        ORDER BY deleted_at DESC
        "#
    ))
    .fetch_all(pool)
    .await?;

    Ok(files)
}

/// Permanently remove trash entries older than `before`. Returns the removed rows
/// so the caller can reclaim their blobs from storage.
pub async fn purge_trash_older_than(
    pool: &DbPool,
    before: chrono::DateTime<Utc>,
) -> anyhow::Result<Vec<FileEntry>> {
    let files = sqlx::query_as::<_, FileEntry>(&format!(
        r#"
        DELETE FROM files
        WHERE deleted_at IS NOT NULL AND deleted_at < $1
        RETURNING {FILE_COLUMNS}
        "#
    ))
    .bind(before)
    .fetch_all(pool)
    .await?;

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_path_handles_root_children() {
        assert_eq!(split_path("/a.txt"), ("/".to_string(), "a.txt".to_string()));
    }

    #[test]
    fn split_path_handles_nested() {
        assert_eq!(
            split_path("/dir/sub/a.txt"),
            ("/dir/sub".to_string(), "a.txt".to_string())
        );
    }

    #[test]
    fn path_id_is_stable_and_short() {
        let a = compute_path_id("/dir/a.txt");
        let b = compute_path_id("/dir/a.txt");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }
}
