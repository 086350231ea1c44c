//! Single-shot upload: the seven-step algorithm from the spec, grounded on the
//! teacher's version-rotation flow in `db::files`/`db::versions`
//! (snapshot-then-replace), extended with optimistic-concurrency precondition
//! checking before any bytes are written.

use super::{object_key_for, version_object_key, ContentPipeline, ConflictInfo, PipelineError, UploadPrecondition};
use crate::db::{
    self,
    models::{ChangeEvent, ChangeKind, Visibility},
};
use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

pub struct UploadOutcome {
    pub path: String,
    pub version: i64,
    pub hash: String,
    pub size: i64,
}

impl ContentPipeline {
    /// Ensure every ancestor directory of `path` exists as a directory entry,
    /// creating missing ones. Walks from root downward so a deeply nested
    /// upload never leaves a dangling directory gap.
    async fn ensure_parent_dirs(&self, path: &str, owner_id: Option<Uuid>) -> Result<(), PipelineError> {
        let mut ancestors = Vec::new();
        let mut current = path;
        while let Some(idx) = current.rfind('/') {
            if idx == 0 {
                break;
            }
            current = &current[..idx];
            ancestors.push(current.to_string());
        }
        ancestors.reverse();

        for dir_path in ancestors {
            if db::files::get_file_by_path(&self.pool, &dir_path).await?.is_none() {
                // A concurrent upload may have created the same ancestor first;
                // a unique-violation on (path) is expected and not an error here.
                if let Err(err) = db::files::insert_file(
                    &self.pool,
                    &dir_path,
                    true,
                    owner_id,
                    Visibility::Private,
                    None,
                )
                .await
                {
                    if !is_unique_violation(&err) {
                        return Err(err.into());
                    }
                }
            }
        }
        Ok(())
    }

    /// Upload `data` to `path`. `declared_size` must match the bytes actually
    /// written or the upload is aborted and nothing is mutated.
    pub async fn upload(
        &self,
        path: &str,
        data: Bytes,
        declared_size: u64,
        owner_id: Option<Uuid>,
        group_id: Option<Uuid>,
        precondition: UploadPrecondition,
    ) -> Result<UploadOutcome, PipelineError> {
        if data.len() as u64 != declared_size {
            return Err(PipelineError::SizeMismatch {
                declared: declared_size,
                written: data.len() as u64,
            });
        }

        self.ensure_parent_dirs(path, owner_id).await?;

        let (location_row, backend) = self.router.resolve_for_upload(path, group_id).await?;
        if location_row.read_only {
            return Err(PipelineError::ReadOnly);
        }

        let existing = db::files::get_file_by_path(&self.pool, path).await?;

        if let Some(ref entry) = existing {
            if let Some(expected) = precondition.expected_version {
                if expected != entry.version {
                    return Err(conflict(entry));
                }
            }
            if let Some(ref expected_hash) = precondition.if_match_hash {
                if entry.content_hash.as_deref() != Some(expected_hash.as_str()) {
                    return Err(conflict(entry));
                }
            }
        }

        let hash = crate::storage::hash::compute_content_hash(&data);
        let new_version = existing.as_ref().map(|e| e.version + 1).unwrap_or(1);
        let object_key = object_key_for(path, new_version);

        backend.put(&object_key, data.clone()).await?;

        if let Some(ref entry) = existing {
            let _guard = self.locks.lock(path).await;
            let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;

            if let (Some(prior_key), Some(prior_hash)) = (&entry.object_key, &entry.content_hash) {
                let snapshot_key = version_object_key(&entry.id, entry.version);
                if let Err(err) = backend.copy(prior_key, &snapshot_key).await {
                    tracing::warn!(path, error = %err, "failed to snapshot prior version object, continuing");
                }
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
                data.len() as i64,
                &hash,
                &object_key,
                location_row.id,
            )
            .await
            .map_err(anyhow::Error::from)?
            .ok_or_else(|| anyhow::anyhow!("version changed concurrently"))?;

            tx.commit().await.map_err(anyhow::Error::from)?;

            // Block until the tree reflects this write: spec.md's read-your-writes
            // guarantee means a fetch right after this call must see the new entry,
            // which the debounced `request_rebuild` actor can't promise.
            if let Err(err) = self.tree.rebuild_now(&self.pool).await {
                tracing::error!(path, error = %err, "inline tree rebuild failed after upload");
            }
            self.events
                .publish(
                    ChangeEvent::new(ChangeKind::Modify, &updated.path, Utc::now())
                        .with_version(updated.version)
                        .with_hash(hash.clone())
                        .with_size(updated.size_bytes),
                )
                .await;

            Ok(UploadOutcome {
                path: updated.path,
                version: updated.version,
                hash,
                size: updated.size_bytes,
            })
        } else {
            let created = db::files::insert_file(
                &self.pool,
                path,
                false,
                owner_id,
                Visibility::Private,
                group_id,
            )
            .await?;

            let _guard = self.locks.lock(path).await;
            let mut tx2 = self.pool.begin().await.map_err(anyhow::Error::from)?;
            let updated = db::files::update_content(
                &mut tx2,
                created.id,
                created.version,
                new_version,
                data.len() as i64,
                &hash,
                &object_key,
                location_row.id,
            )
            .await
            .map_err(anyhow::Error::from)?
            .ok_or_else(|| anyhow::anyhow!("newly created file vanished"))?;
            tx2.commit().await.map_err(anyhow::Error::from)?;

            if let Err(err) = self.tree.rebuild_now(&self.pool).await {
                tracing::error!(path, error = %err, "inline tree rebuild failed after upload");
            }
            self.events
                .publish(
                    ChangeEvent::new(ChangeKind::Create, &updated.path, Utc::now())
                        .with_version(updated.version)
                        .with_hash(hash.clone())
                        .with_size(updated.size_bytes),
                )
                .await;

            Ok(UploadOutcome {
                path: updated.path,
                version: updated.version,
                hash,
                size: updated.size_bytes,
            })
        }
    }
}

fn conflict(entry: &db::models::FileEntry) -> PipelineError {
    PipelineError::Conflict(Box::new(ConflictInfo {
        version: entry.version,
        hash: entry.content_hash.clone(),
        size: entry.size_bytes,
        mod_time: entry.modified_at,
    }))
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}
