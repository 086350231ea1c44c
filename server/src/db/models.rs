//! Row structs for the metadata store.
//!
//! These map directly onto the schema in `migrations/0001_init.sql`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who may see an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Group,
    Private,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Private
    }
}

/// The unit of metadata: a file or directory row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FileEntry {
    pub id: Uuid,
    pub path: String,
    /// First 16 hex chars of sha256(path); stable across renames of the row id only.
    pub path_id: String,
    pub name: String,
    pub parent_path: String,
    pub is_dir: bool,
    pub size_bytes: i64,
    pub content_hash: Option<String>,
    pub object_key: Option<String>,
    pub storage_location_id: Option<Uuid>,
    pub version: i64,
    pub owner_id: Option<Uuid>,
    pub visibility: Visibility,
    pub group_id: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
    pub original_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl FileEntry {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Immutable snapshot of a prior content state.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FileVersion {
    pub id: Uuid,
    pub file_id: Uuid,
    pub path_at_snapshot: String,
    pub version: i64,
    pub size_bytes: i64,
    pub content_hash: String,
    pub object_key: String,
    pub storage_location_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A configured storage backend with addressing rules.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StorageLocation {
    pub id: Uuid,
    pub name: String,
    pub group_id: Option<Uuid>,
    pub backend: String,
    pub config: serde_json::Value,
    pub priority: i32,
    pub is_default: bool,
    pub read_only: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum UploadStatus {
    Active,
    Completed,
    Aborted,
}

/// A resumable chunked upload in progress.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChunkedUpload {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub target_path: String,
    pub total_size: i64,
    pub chunk_size: i64,
    pub total_chunks: i32,
    pub status: UploadStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Record of one received chunk of a `ChunkedUpload`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChunkRecord {
    pub upload_id: Uuid,
    pub chunk_index: i32,
    pub size_bytes: i64,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Change fan-out event, published by the pipeline and broadcast over SSE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(rename = "timestamp")]
    pub unix_timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
    Version,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Modify => "modify",
            ChangeKind::Delete => "delete",
            ChangeKind::Version => "version",
        }
    }
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            kind,
            path: path.into(),
            version: None,
            hash: None,
            size: None,
            unix_timestamp: now.timestamp(),
        }
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }
}
