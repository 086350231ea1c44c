//! Pluggable object storage. A `Backend` stores and serves opaque object bytes
//! addressed by an `object_key`; the MetaStore owns the mapping from paths to keys.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

/// A half-open byte range, as parsed from an HTTP `Range` header.
#[derive(Debug, Clone, Copy)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64, // inclusive
}

/// What kind of backend this is, surfaced in `/api/v1/admin/locations` responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    Local,
    S3,
    NetworkMount,
}

/// Storage primitive every backend implementation provides. Generalizes the
/// teacher's concrete `BlobStore` into a polymorphic interface so the router can
/// hold a heterogeneous set of locations behind one type.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get(&self, key: &str, range: Option<ByteRange>) -> Result<Bytes, BackendError>;
    async fn put(&self, key: &str, data: Bytes) -> Result<(), BackendError>;
    async fn delete(&self, key: &str) -> Result<(), BackendError>;
    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), BackendError>;
    async fn exists(&self, key: &str) -> Result<bool, BackendError>;
    fn type_tag(&self) -> BackendType;
    /// Flush and release any resources held open by this backend (file handles,
    /// connection pools). Called by the router when a location is reconfigured
    /// or removed.
    async fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Narrow metrics seam so every backend records per-operation latency without
/// pulling in a full metrics stack. Default implementation just logs.
pub trait MetricsSink: Send + Sync {
    fn record(&self, backend: &str, op: &str, elapsed: std::time::Duration, ok: bool);
}

pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record(&self, backend: &str, op: &str, elapsed: std::time::Duration, ok: bool) {
        tracing::debug!(backend, op, ok, elapsed_ms = elapsed.as_millis() as u64, "backend op");
    }
}

pub(crate) async fn timed<T, E>(
    sink: &dyn MetricsSink,
    backend: &str,
    op: &str,
    fut: impl std::future::Future<Output = Result<T, E>>,
) -> Result<T, E> {
    let started = Instant::now();
    let result = fut.await;
    sink.record(backend, op, started.elapsed(), result.is_ok());
    result
}

/// Directly adapted from the teacher's `BlobStore`: sharded directory layout,
/// atomic temp-file + rename writes, generalized to support byte-range reads.
pub struct LocalFsBackend {
    base_path: PathBuf,
    metrics: Arc<dyn MetricsSink>,
}

impl LocalFsBackend {
    pub fn new(base_path: impl AsRef<Path>, metrics: Arc<dyn MetricsSink>) -> Result<Self, BackendError> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path, metrics })
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let shard = if key.len() >= 2 { &key[..2] } else { "__" };
        self.base_path.join(shard).join(key)
    }
}

#[async_trait]
impl Backend for LocalFsBackend {
    async fn get(&self, key: &str, range: Option<ByteRange>) -> Result<Bytes, BackendError> {
        let path = self.object_path(key);
        timed(&*self.metrics, "local", "get", async {
            use tokio::io::{AsyncReadExt, AsyncSeekExt};

            let mut file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => BackendError::NotFound(key.to_string()),
                    _ => BackendError::Io(e),
                })?;

            match range {
                Some(r) => {
                    file.seek(std::io::SeekFrom::Start(r.start)).await?;
                    let len = (r.end - r.start + 1) as usize;
                    let mut buf = vec![0u8; len];
                    file.read_exact(&mut buf).await?;
                    Ok(Bytes::from(buf))
                }
                None => {
                    let mut buf = Vec::new();
                    file.read_to_end(&mut buf).await?;
                    Ok(Bytes::from(buf))
                }
            }
        })
        .await
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), BackendError> {
        let path = self.object_path(key);
        timed(&*self.metrics, "local", "put", async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let tmp_path = path.with_extension("tmp");
            {
                let mut file = tokio::fs::File::create(&tmp_path).await?;
                use tokio::io::AsyncWriteExt;
                file.write_all(&data).await?;
                file.sync_all().await?;
            }
            tokio::fs::rename(&tmp_path, &path).await?;
            tracing::debug!(key, bytes = data.len(), "local backend wrote object");
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let path = self.object_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackendError::Io(e)),
        }
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), BackendError> {
        let src = self.object_path(src_key);
        let dst = self.object_path(dst_key);
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src, &dst).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BackendError::NotFound(src_key.to_string()),
            _ => BackendError::Io(e),
        })?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        Ok(tokio::fs::metadata(self.object_path(key)).await.is_ok())
    }

    fn type_tag(&self) -> BackendType {
        BackendType::Local
    }
}

/// S3-compatible object storage, new relative to the teacher: `object_store`'s
/// `AmazonS3` client, path-style addressing, range GETs via `GetOptions`.
pub struct S3Backend {
    store: object_store::aws::AmazonS3,
    metrics: Arc<dyn MetricsSink>,
}

impl S3Backend {
    pub fn new(
        bucket: &str,
        region: &str,
        endpoint: Option<&str>,
        access_key_id: &str,
        secret_access_key: &str,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, BackendError> {
        use object_store::aws::AmazonS3Builder;

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(region)
            .with_access_key_id(access_key_id)
            .with_secret_access_key(secret_access_key);

        if let Some(endpoint) = endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }

        let store = builder.build()?;
        Ok(Self { store, metrics })
    }
}

#[async_trait]
impl Backend for S3Backend {
    async fn get(&self, key: &str, range: Option<ByteRange>) -> Result<Bytes, BackendError> {
        use object_store::path::Path as ObjPath;
        use object_store::GetOptions;

        let path = ObjPath::from(key);
        timed(&*self.metrics, "s3", "get", async {
            let opts = GetOptions {
                range: range.map(|r| (r.start..r.end + 1).into()),
                ..Default::default()
            };
            let result = self
                .store
                .get_opts(&path, opts)
                .await
                .map_err(|e| match e {
                    object_store::Error::NotFound { .. } => BackendError::NotFound(key.to_string()),
                    other => BackendError::ObjectStore(other),
                })?;
            let bytes = result.bytes().await?;
            Ok(bytes)
        })
        .await
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), BackendError> {
        use object_store::path::Path as ObjPath;
        let path = ObjPath::from(key);
        timed(&*self.metrics, "s3", "put", async {
            self.store.put(&path, data.into()).await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        use object_store::path::Path as ObjPath;
        let path = ObjPath::from(key);
        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(BackendError::ObjectStore(e)),
        }
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), BackendError> {
        use object_store::path::Path as ObjPath;
        let src = ObjPath::from(src_key);
        let dst = ObjPath::from(dst_key);
        self.store.copy(&src, &dst).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        use object_store::path::Path as ObjPath;
        let path = ObjPath::from(key);
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(BackendError::ObjectStore(e)),
        }
    }

    fn type_tag(&self) -> BackendType {
        BackendType::S3
    }
}

/// Thin wrapper over a pre-mounted network filesystem path. Delegates straight
/// to `LocalFsBackend`; the distinction exists purely for the admin-facing
/// location type and for retaining mount credentials for display, not I/O.
pub struct NetworkMountBackend {
    inner: LocalFsBackend,
}

impl NetworkMountBackend {
    pub fn new(mount_path: impl AsRef<Path>, metrics: Arc<dyn MetricsSink>) -> Result<Self, BackendError> {
        Ok(Self {
            inner: LocalFsBackend::new(mount_path, metrics)?,
        })
    }
}

#[async_trait]
impl Backend for NetworkMountBackend {
    async fn get(&self, key: &str, range: Option<ByteRange>) -> Result<Bytes, BackendError> {
        self.inner.get(key, range).await
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), BackendError> {
        self.inner.put(key, data).await
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.inner.delete(key).await
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), BackendError> {
        self.inner.copy(src_key, dst_key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        self.inner.exists(key).await
    }

    fn type_tag(&self) -> BackendType {
        BackendType::NetworkMount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_backend_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path(), Arc::new(TracingMetricsSink)).unwrap();
        backend.put("abc123", Bytes::from_static(b"hello world")).await.unwrap();
        assert!(backend.exists("abc123").await.unwrap());
        let data = backend.get("abc123", None).await.unwrap();
        assert_eq!(&data[..], b"hello world");
    }

    #[tokio::test]
    async fn local_backend_range_read() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path(), Arc::new(TracingMetricsSink)).unwrap();
        backend.put("rng001", Bytes::from_static(b"0123456789")).await.unwrap();
        let data = backend
            .get("rng001", Some(ByteRange { start: 2, end: 5 }))
            .await
            .unwrap();
        assert_eq!(&data[..], b"2345");
    }

    #[tokio::test]
    async fn local_backend_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path(), Arc::new(TracingMetricsSink)).unwrap();
        let err = backend.get("missing", None).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }
}
