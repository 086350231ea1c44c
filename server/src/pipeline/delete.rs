//! Soft and hard delete, including recursive directory delete.

use super::{ContentPipeline, PipelineError};
use crate::db::{
    self,
    models::{ChangeEvent, ChangeKind},
};
use chrono::Utc;
use uuid::Uuid;

impl ContentPipeline {
    /// Mark `path` trashed: hidden from listings, restorable until purged.
    /// Recurses depth-first into children when `path` is a directory.
    pub async fn delete(&self, path: &str, actor: Option<Uuid>) -> Result<(), PipelineError> {
        let _guard = self.locks.lock(path).await;

        let entry = db::files::get_file_by_path(&self.pool, path)
            .await?
            .ok_or_else(|| PipelineError::NotFound(path.to_string()))?;

        if entry.is_dir {
            let children = db::files::list_children(&self.pool, path).await?;
            for child in children {
                // Children take their own per-path lock; recursion below the
                // already-held parent lock is safe since paths never collide.
                Box::pin(self.delete(&child.path, actor)).await?;
            }
        }

        db::files::soft_delete(&self.pool, entry.id, actor).await?;

        self.tree.request_rebuild();
        self.events
            .publish(ChangeEvent::new(ChangeKind::Delete, &entry.path, Utc::now()))
            .await;

        Ok(())
    }

    /// Permanently remove a trashed entry's primary object and all retained
    /// version objects from the backend, then drop its row. Irreversible.
    pub async fn hard_delete(&self, file_id: Uuid) -> Result<(), PipelineError> {
        let rows = db::files::list_trash(&self.pool).await?;
        let entry = rows
            .into_iter()
            .find(|f| f.id == file_id)
            .ok_or_else(|| PipelineError::NotFound(file_id.to_string()))?;

        if entry.storage_location_id.is_some() {
            let (_, backend) = self.router.resolve_for_file(entry.storage_location_id, entry.group_id).await?;

            if let Some(ref key) = entry.object_key {
                let _ = backend.delete(key).await;
            }

            let (versions, _total) = db::versions::list_versions(&self.pool, entry.id, i64::MAX, 0).await?;
            for version in versions {
                let _ = backend.delete(&version.object_key).await;
            }
        }

        Ok(())
    }

    /// Restore a trashed entry back to its original (or a caller-chosen) path.
    pub async fn restore(&self, file_id: Uuid, restore_path: Option<&str>) -> Result<(), PipelineError> {
        let rows = db::files::list_trash(&self.pool).await?;
        let entry = rows
            .into_iter()
            .find(|f| f.id == file_id)
            .ok_or_else(|| PipelineError::NotFound(file_id.to_string()))?;

        let target = match restore_path {
            Some(p) => p.to_string(),
            None => entry
                .original_path
                .clone()
                .ok_or_else(|| PipelineError::NotFound("no original path recorded".to_string()))?,
        };

        let restored = db::files::restore(&self.pool, file_id, &target).await?;

        self.tree.request_rebuild();
        self.events
            .publish(
                ChangeEvent::new(ChangeKind::Create, &restored.path, Utc::now())
                    .with_version(restored.version)
                    .with_size(restored.size_bytes),
            )
            .await;

        Ok(())
    }
}
