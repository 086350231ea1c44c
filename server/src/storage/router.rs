//! Resolves a file or upload target to a concrete storage location and backend.
//!
//! Mirrors the teacher's `BlobManager` single-slot `Arc<Mutex<...>>` pattern in
//! `storage/blob_io.rs`, generalized to a reader/writer lock over a whole map of
//! locations since router reads (every upload/download) vastly outnumber
//! reconfiguration reloads.

use super::backend::{
    Backend, BackendError, LocalFsBackend, MetricsSink, NetworkMountBackend, S3Backend,
};
use crate::db::{self, models::StorageLocation, DbPool};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("no storage location configured")]
    NoLocation,
    #[error("storage location {0} not found")]
    LocationNotFound(Uuid),
    #[error("storage location {0} is read-only")]
    ReadOnly(Uuid),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Db(#[from] anyhow::Error),
    #[error("unsupported backend kind: {0}")]
    UnsupportedKind(String),
}

struct LocationEntry {
    row: StorageLocation,
    backend: Arc<dyn Backend>,
}

pub struct StorageRouter {
    metrics: Arc<dyn MetricsSink>,
    locations: RwLock<HashMap<Uuid, LocationEntry>>,
    /// group_id -> location ids, highest priority first. `None` is the ungrouped pool.
    by_group: RwLock<HashMap<Option<Uuid>, Vec<Uuid>>>,
    default_location: RwLock<Option<Uuid>>,
}

fn build_backend(row: &StorageLocation, metrics: Arc<dyn MetricsSink>) -> Result<Arc<dyn Backend>, RouterError> {
    match row.backend.as_str() {
        "local" => {
            let path = row.config["path"]
                .as_str()
                .ok_or_else(|| RouterError::UnsupportedKind("local location missing config.path".into()))?;
            Ok(Arc::new(LocalFsBackend::new(path, metrics)?))
        }
        "network_mount" => {
            let path = row.config["mount_path"]
                .as_str()
                .ok_or_else(|| RouterError::UnsupportedKind("network_mount location missing config.mount_path".into()))?;
            Ok(Arc::new(NetworkMountBackend::new(path, metrics)?))
        }
        "s3" => {
            let cfg = &row.config;
            let bucket = cfg["bucket"].as_str().unwrap_or_default();
            let region = cfg["region"].as_str().unwrap_or("us-east-1");
            let endpoint = cfg["endpoint"].as_str();
            let access_key_id = cfg["access_key_id"].as_str().unwrap_or_default();
            let secret_access_key = cfg["secret_access_key"].as_str().unwrap_or_default();
            Ok(Arc::new(S3Backend::new(
                bucket,
                region,
                endpoint,
                access_key_id,
                secret_access_key,
                metrics,
            )?))
        }
        other => Err(RouterError::UnsupportedKind(other.to_string())),
    }
}

impl StorageRouter {
    /// Load all configured locations from the MetaStore and construct backends
    /// for each. Called once at startup and again on SIGHUP-style reload.
    pub async fn load(pool: &DbPool, metrics: Arc<dyn MetricsSink>) -> Result<Self, RouterError> {
        let rows = db::locations::list_locations(pool).await?;

        let mut locations = HashMap::new();
        let mut by_group: HashMap<Option<Uuid>, Vec<Uuid>> = HashMap::new();
        let mut default_location = None;

        for row in rows {
            let backend = build_backend(&row, metrics.clone())?;
            if row.is_default {
                default_location = Some(row.id);
            }
            by_group.entry(row.group_id).or_default().push(row.id);
            locations.insert(row.id, LocationEntry { row, backend });
        }

        // Priority order is already applied by the query's ORDER BY, so the
        // per-group vectors built above are already highest-priority-first.

        Ok(Self {
            metrics,
            locations: RwLock::new(locations),
            by_group: RwLock::new(by_group),
            default_location: RwLock::new(default_location),
        })
    }

    /// Resolve the backend for an existing file, in spec order: (1) the
    /// explicit `location_id` pinned on the entry, if present and known;
    /// (2) the entry's group's highest-priority location (groups are flat in
    /// this schema, so "top-level ancestor" is just `group_id` itself);
    /// (3) the instance default.
    pub async fn resolve_for_file(
        &self,
        location_id: Option<Uuid>,
        group_id: Option<Uuid>,
    ) -> Result<(Uuid, Arc<dyn Backend>), RouterError> {
        let locations = self.locations.read().await;

        if let Some(id) = location_id {
            if let Some(entry) = locations.get(&id) {
                return Ok((id, entry.backend.clone()));
            }
            return Err(RouterError::LocationNotFound(id));
        }

        let by_group = self.by_group.read().await;
        if let Some(ids) = by_group.get(&group_id) {
            if let Some(id) = ids.iter().find(|id| locations.contains_key(id)) {
                return Ok((*id, locations[id].backend.clone()));
            }
        }

        let default_id = *self.default_location.read().await;
        if let Some(id) = default_id {
            if locations.contains_key(&id) {
                return Ok((id, locations[&id].backend.clone()));
            }
        }

        Err(RouterError::NoLocation)
    }

    /// Choose a destination location for a new upload, in spec order: (1) a
    /// location's `group_id` match, highest priority first; (2) a location
    /// whose name case-foldedly matches the path's first segment (so a file
    /// under `/Photos/...` routes to a location named "photos" if one
    /// exists); (3) the instance default.
    pub async fn resolve_for_upload(
        &self,
        path: &str,
        group_id: Option<Uuid>,
    ) -> Result<(StorageLocation, Arc<dyn Backend>), RouterError> {
        let locations = self.locations.read().await;

        let by_group = self.by_group.read().await;
        if let Some(ids) = by_group.get(&group_id) {
            if let Some(entry) = ids.iter().find_map(|id| {
                locations.get(id).filter(|e| !e.row.read_only)
            }) {
                return Ok((entry.row.clone(), entry.backend.clone()));
            }
        }

        let first_segment = path.split('/').find(|s| !s.is_empty()).map(|s| s.to_ascii_lowercase());
        if let Some(first_segment) = &first_segment {
            if let Some(entry) = locations
                .values()
                .find(|e| !e.row.read_only && &e.row.name.to_ascii_lowercase() == first_segment)
            {
                return Ok((entry.row.clone(), entry.backend.clone()));
            }
        }

        let default_id = *self.default_location.read().await;
        if let Some(id) = default_id {
            if let Some(entry) = locations.get(&id) {
                if !entry.row.read_only {
                    return Ok((entry.row.clone(), entry.backend.clone()));
                }
            }
        }

        Err(RouterError::NoLocation)
    }

    pub async fn get_location_row(&self, location_id: Uuid) -> Option<StorageLocation> {
        self.locations.read().await.get(&location_id).map(|e| e.row.clone())
    }

    /// Re-read locations from the MetaStore. Locations whose raw `config` JSON is
    /// byte-identical to what's already loaded keep their existing backend
    /// instance (and its open resources); only changed or new locations are
    /// rebuilt, and removed locations have `close()` called before being dropped.
    pub async fn reload(&self, pool: &DbPool) -> Result<(), RouterError> {
        let rows = db::locations::list_locations(pool).await?;

        let mut locations = self.locations.write().await;
        let mut by_group: HashMap<Option<Uuid>, Vec<Uuid>> = HashMap::new();
        let mut default_location = None;
        let mut next = HashMap::new();

        for row in rows {
            if row.is_default {
                default_location = Some(row.id);
            }
            by_group.entry(row.group_id).or_default().push(row.id);

            let backend = match locations.get(&row.id) {
                Some(existing) if existing.row.config == row.config && existing.row.backend == row.backend => {
                    existing.backend.clone()
                }
                _ => build_backend(&row, self.metrics.clone())?,
            };
            next.insert(row.id, LocationEntry { row, backend });
        }

        for (id, old) in locations.drain() {
            if !next.contains_key(&id) {
                let _ = old.backend.close().await;
            }
        }

        *locations = next;
        *self.by_group.write().await = by_group;
        *self.default_location.write().await = default_location;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::TracingMetricsSink;

    fn location(name: &str, group_id: Option<Uuid>, priority: i32, is_default: bool) -> StorageLocation {
        StorageLocation {
            id: Uuid::new_v4(),
            name: name.to_string(),
            group_id,
            backend: "local".to_string(),
            config: serde_json::json!({}),
            priority,
            is_default,
            read_only: false,
            created_at: chrono::Utc::now(),
        }
    }

    async fn router_with(dir: &std::path::Path, rows: Vec<StorageLocation>) -> StorageRouter {
        let metrics: Arc<dyn MetricsSink> = Arc::new(TracingMetricsSink);
        let mut locations = HashMap::new();
        let mut by_group: HashMap<Option<Uuid>, Vec<Uuid>> = HashMap::new();
        let mut default_location = None;

        for row in rows {
            if row.is_default {
                default_location = Some(row.id);
            }
            by_group.entry(row.group_id).or_default().push(row.id);
            let backend = Arc::new(LocalFsBackend::new(dir, metrics.clone()).unwrap());
            locations.insert(row.id, LocationEntry { row, backend });
        }

        StorageRouter {
            metrics,
            locations: RwLock::new(locations),
            by_group: RwLock::new(by_group),
            default_location: RwLock::new(default_location),
        }
    }

    #[tokio::test]
    async fn resolve_for_upload_prefers_group_over_path_segment() {
        let dir = tempfile::tempdir().unwrap();
        let group = Uuid::new_v4();
        let grouped = location("grouped", Some(group), 10, false);
        let grouped_id = grouped.id;
        let by_name = location("photos", None, 0, false);

        let router = router_with(dir.path(), vec![grouped, by_name]).await;

        let (resolved, _) = router.resolve_for_upload("/photos/a.jpg", Some(group)).await.unwrap();
        assert_eq!(resolved.id, grouped_id);
    }

    #[tokio::test]
    async fn resolve_for_upload_falls_back_to_path_segment_then_default() {
        let dir = tempfile::tempdir().unwrap();
        // Distinct, caller-irrelevant group ids so neither lands in the `None`
        // (ungrouped) bucket the call below resolves against in step 1.
        let by_name = location("photos", Some(Uuid::new_v4()), 0, false);
        let by_name_id = by_name.id;
        let default = location("default", Some(Uuid::new_v4()), 0, true);
        let default_id = default.id;

        let router = router_with(dir.path(), vec![by_name, default]).await;

        let (resolved, _) = router.resolve_for_upload("/photos/a.jpg", None).await.unwrap();
        assert_eq!(resolved.id, by_name_id);

        let (resolved, _) = router.resolve_for_upload("/docs/a.txt", None).await.unwrap();
        assert_eq!(resolved.id, default_id);
    }

    #[tokio::test]
    async fn resolve_for_file_falls_back_to_group_then_default_when_id_absent() {
        let dir = tempfile::tempdir().unwrap();
        let group = Uuid::new_v4();
        let grouped = location("grouped", Some(group), 10, false);
        let grouped_id = grouped.id;
        let default = location("default", Some(Uuid::new_v4()), 0, true);
        let default_id = default.id;

        let router = router_with(dir.path(), vec![grouped, default]).await;

        let (resolved_id, _) = router.resolve_for_file(None, Some(group)).await.unwrap();
        assert_eq!(resolved_id, grouped_id);

        let (resolved_id, _) = router.resolve_for_file(None, None).await.unwrap();
        assert_eq!(resolved_id, default_id);
    }

    #[tokio::test]
    async fn resolve_for_file_explicit_id_wins() {
        let dir = tempfile::tempdir().unwrap();
        let group = Uuid::new_v4();
        let grouped = location("grouped", Some(group), 10, false);
        let explicit = location("explicit", Some(group), 0, false);
        let explicit_id = explicit.id;

        let router = router_with(dir.path(), vec![grouped, explicit]).await;

        let (resolved_id, _) = router.resolve_for_file(Some(explicit_id), Some(group)).await.unwrap();
        assert_eq!(resolved_id, explicit_id);
    }
}
