//! Resumable chunked uploads. A distinct concern from the teacher's
//! content-defined-chunking dedup (`storage/tiering.rs`, `storage/cas.rs`),
//! which addressed delta-sync storage savings and is out of scope here (see
//! DESIGN.md). `complete()` assembles in order, grounded on the teacher's
//! `export_files` chunk-reassembly loop in `main.rs`.

use super::{scratch_key, ContentPipeline, PipelineError, UploadPrecondition};
use crate::db::{self, models::UploadStatus};
use bytes::{Bytes, BytesMut};
use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

/// How long an in-progress chunked upload may sit idle before the sweeper
/// reclaims it.
pub const UPLOAD_TTL_MINUTES: i64 = 60;

impl ContentPipeline {
    /// Begin a new resumable upload session, returning its id.
    pub async fn begin_chunked_upload(
        &self,
        target_path: &str,
        total_size: i64,
        chunk_size: i64,
        user_id: Option<Uuid>,
    ) -> Result<Uuid, PipelineError> {
        let total_chunks = ((total_size + chunk_size - 1) / chunk_size).max(1) as i32;
        let expires_at = Utc::now() + ChronoDuration::minutes(UPLOAD_TTL_MINUTES);

        let upload = db::uploads::create_upload(
            &self.pool,
            user_id,
            target_path,
            total_size,
            chunk_size,
            total_chunks,
            expires_at,
        )
        .await?;

        Ok(upload.id)
    }

    /// Write one chunk to its reserved scratch key and record receipt.
    /// Idempotent: re-sending the same index just overwrites it, so a retried
    /// PUT after a dropped connection is safe.
    pub async fn put_chunk(&self, upload_id: Uuid, index: i32, data: Bytes) -> Result<(), PipelineError> {
        let upload = db::uploads::get_upload(&self.pool, upload_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(upload_id.to_string()))?;

        if upload.status != UploadStatus::Active {
            return Err(PipelineError::UploadExpired(upload_id));
        }
        if Utc::now() > upload.expires_at {
            return Err(PipelineError::UploadExpired(upload_id));
        }
        if index < 0 || index >= upload.total_chunks {
            return Err(PipelineError::InvalidRange);
        }

        // Uploads don't carry a storage location until completion; scratch
        // chunks always land on the instance default so retries can't race a
        // mid-flight StorageRouter reload onto a different backend.
        let (_, backend) = self.router.resolve_for_upload(&upload.target_path, None).await?;
        let key = scratch_key(&upload_id, index);
        let len = data.len() as i64;
        backend.put(&key, data).await?;
        db::uploads::record_chunk(&self.pool, upload_id, index, len).await?;

        Ok(())
    }

    /// Assemble every chunk into the final object and finalize metadata exactly
    /// as a single-shot upload would. Requires the chunk index set to be
    /// `{0..total_chunks-1}` exactly.
    pub async fn complete_chunked_upload(
        &self,
        upload_id: Uuid,
        owner_id: Option<Uuid>,
        group_id: Option<Uuid>,
        precondition: UploadPrecondition,
    ) -> Result<super::upload::UploadOutcome, PipelineError> {
        let upload = db::uploads::get_upload(&self.pool, upload_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(upload_id.to_string()))?;

        let received = db::uploads::list_received_chunks(&self.pool, upload_id).await?;
        if received.len() as i32 != upload.total_chunks
            || (0..upload.total_chunks).any(|i| !received.iter().any(|c| c.chunk_index == i))
        {
            return Err(PipelineError::IncompleteUpload(upload_id));
        }

        let (_, backend) = self.router.resolve_for_upload(&upload.target_path, group_id).await?;

        let mut assembled = BytesMut::with_capacity(upload.total_size.max(0) as usize);
        for index in 0..upload.total_chunks {
            let key = scratch_key(&upload_id, index);
            let bytes = backend.get(&key, None).await?;
            assembled.extend_from_slice(&bytes);
        }
        let assembled = assembled.freeze();

        let outcome = self
            .upload(
                &upload.target_path,
                assembled,
                upload.total_size as u64,
                owner_id,
                group_id,
                precondition,
            )
            .await?;

        for index in 0..upload.total_chunks {
            let _ = backend.delete(&scratch_key(&upload_id, index)).await;
        }
        db::uploads::set_status(&self.pool, upload_id, UploadStatus::Completed).await?;

        Ok(outcome)
    }

    /// Discard an in-progress upload and its scratch chunks.
    pub async fn abort_chunked_upload(&self, upload_id: Uuid) -> Result<(), PipelineError> {
        let upload = db::uploads::get_upload(&self.pool, upload_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(upload_id.to_string()))?;

        let (_, backend) = self.router.resolve_for_upload(&upload.target_path, None).await?;
        for index in 0..upload.total_chunks {
            let _ = backend.delete(&scratch_key(&upload_id, index)).await;
        }
        db::uploads::set_status(&self.pool, upload_id, UploadStatus::Aborted).await?;

        Ok(())
    }
}
