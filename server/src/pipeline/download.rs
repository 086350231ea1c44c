//! Range-aware downloads. Grounded on the teacher's
//! `BlobManager::read_chunk` (seek + read_exact against a container file),
//! generalized to go through the `Backend` trait instead of a concrete
//! container format.

use super::{ContentPipeline, PipelineError};
use crate::db;
use crate::storage::ByteRange;
use bytes::Bytes;

pub struct DownloadResult {
    pub data: Bytes,
    pub content_type: String,
    pub total_size: i64,
    pub hash_verified: Option<bool>,
}

impl ContentPipeline {
    /// Fetch file content, optionally restricted to `range`. Whole-file reads
    /// get a streaming hash check against the stored hash; a mismatch is logged
    /// but doesn't fail the response since the bytes are already on the wire.
    /// Range reads skip verification entirely (the hash covers the whole object).
    pub async fn download(&self, path: &str, range: Option<ByteRange>) -> Result<DownloadResult, PipelineError> {
        let entry = db::files::get_file_by_path(&self.pool, path)
            .await?
            .ok_or_else(|| PipelineError::NotFound(path.to_string()))?;

        if entry.is_dir {
            return Err(PipelineError::IsDirectory);
        }

        let object_key = entry.object_key.clone().ok_or_else(|| PipelineError::NotFound(path.to_string()))?;
        let (_, backend) = self.router.resolve_for_file(entry.storage_location_id, entry.group_id).await?;

        let started = std::time::Instant::now();
        let data = backend.get(&object_key, range).await?;
        tracing::debug!(
            path,
            bytes = data.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            ranged = range.is_some(),
            "download served"
        );

        let hash_verified = match (range, entry.content_hash.as_deref()) {
            (None, Some(expected)) => {
                let ok = crate::storage::hash::verify_content_hash(&data, expected);
                if !ok {
                    tracing::error!(path, "content hash mismatch on whole-file download");
                }
                Some(ok)
            }
            _ => None,
        };

        let content_type = mime_guess::from_path(path).first_or_octet_stream().to_string();

        Ok(DownloadResult {
            data,
            content_type,
            total_size: entry.size_bytes,
            hash_verified,
        })
    }
}
