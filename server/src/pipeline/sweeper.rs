//! Background task that reclaims chunked uploads abandoned past their TTL.
//! Grounded on the teacher's daemon-loop idiom in `client/cli/src/daemon.rs`:
//! an independent task on a fixed tick, tolerant of individual-item failures.

use super::scratch_key;
use crate::db;
use std::sync::Arc;
use std::time::Duration;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub fn spawn(pipeline: Arc<super::ContentPipeline>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = sweep_once(&pipeline).await {
                tracing::error!(error = %err, "chunked upload sweep failed");
            }
        }
    });
}

async fn sweep_once(pipeline: &super::ContentPipeline) -> anyhow::Result<()> {
    let expired = db::uploads::list_expired(&pipeline.pool, chrono::Utc::now()).await?;
    if expired.is_empty() {
        return Ok(());
    }

    tracing::info!(count = expired.len(), "sweeping expired chunked uploads");

    for upload in expired {
        let backend = match pipeline.router.resolve_for_upload(&upload.target_path, None).await {
            Ok((_, backend)) => backend,
            Err(err) => {
                tracing::warn!(upload_id = %upload.id, error = %err, "could not resolve backend for expired upload, skipping cleanup");
                continue;
            }
        };

        for index in 0..upload.total_chunks {
            let _ = backend.delete(&scratch_key(&upload.id, index)).await;
        }

        db::uploads::set_status(&pipeline.pool, upload.id, db::models::UploadStatus::Aborted).await?;
    }

    Ok(())
}
