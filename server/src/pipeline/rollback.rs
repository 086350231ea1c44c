//! Rollback to a prior version: the "new content" is a copy of an old object,
//! but it lands as a brand new version, never a rewind of the version counter.

use super::{version_object_key, ContentPipeline, PipelineError};
use crate::db::{
    self,
    models::{ChangeEvent, ChangeKind},
};
use chrono::Utc;

pub struct RollbackOutcome {
    pub path: String,
    pub version: i64,
    pub hash: String,
}

impl ContentPipeline {
    pub async fn rollback(&self, path: &str, target_version: i64) -> Result<RollbackOutcome, PipelineError> {
        let _guard = self.locks.lock(path).await;

        let entry = db::files::get_file_by_path(&self.pool, path)
            .await?
            .ok_or_else(|| PipelineError::NotFound(path.to_string()))?;

        let target = db::versions::get_version(&self.pool, entry.id, target_version)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("{path}@v{target_version}")))?;

        let (location_id, backend) = self.router.resolve_for_file(entry.storage_location_id, entry.group_id).await?;

        let new_version = entry.version + 1;
        let new_key = super::object_key_for(path, new_version);
        backend.copy(&target.object_key, &new_key).await?;

        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;

        if let (Some(prior_key), Some(prior_hash)) = (&entry.object_key, &entry.content_hash) {
            let snapshot_key = version_object_key(&entry.id, entry.version);
            backend.copy(prior_key, &snapshot_key).await?;
            db::versions::insert_version(
                &mut tx,
                entry.id,
                &entry.path,
                entry.version,
                entry.size_bytes,
                prior_hash,
                &snapshot_key,
                entry.storage_location_id,
            )
            .await
            .map_err(anyhow::Error::from)?;
        }

        let updated = db::files::update_content(
            &mut tx,
            entry.id,
            entry.version,
            new_version,
            target.size_bytes,
            &target.content_hash,
            &new_key,
            location_id,
        )
        .await
        .map_err(anyhow::Error::from)?
        .ok_or_else(|| anyhow::anyhow!("version changed concurrently"))?;

        tx.commit().await.map_err(anyhow::Error::from)?;

        self.tree.request_rebuild();
        self.events
            .publish(
                ChangeEvent::new(ChangeKind::Version, &updated.path, Utc::now())
                    .with_version(updated.version)
                    .with_hash(target.content_hash.clone())
                    .with_size(updated.size_bytes),
            )
            .await;

        Ok(RollbackOutcome {
            path: updated.path,
            version: updated.version,
            hash: target.content_hash,
        })
    }
}
