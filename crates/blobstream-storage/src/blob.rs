//! Object-store-backed `BlobStore`.
//!
//! Wraps any `object_store::ObjectStore` (S3, local filesystem, in-memory) and
//! optionally roots every key under a fixed prefix, so several deployments can
//! share one bucket.

use crate::error::{Result, StorageError};
use crate::BlobStore;
use async_trait::async_trait;
use blobstream_observability::metrics::{BLOB_ERRORS_TOTAL, BLOB_LATENCY, BLOB_REQUESTS_TOTAL};
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::ObjectStore;
use std::sync::Arc;
use std::time::Instant;

/// Blob store over an `object_store::ObjectStore`
#[derive(Debug, Clone)]
pub struct ObjectBlobStore {
    object_store: Arc<dyn ObjectStore>,
    root: String,
}

impl ObjectBlobStore {
    /// Store keys at the top level of `object_store`
    pub fn new(object_store: Arc<dyn ObjectStore>) -> Self {
        Self {
            object_store,
            root: String::new(),
        }
    }

    /// Store keys below `root` inside `object_store`
    pub fn with_root(object_store: Arc<dyn ObjectStore>, root: impl Into<String>) -> Self {
        Self {
            object_store,
            root: root.into().trim_matches('/').to_string(),
        }
    }

    /// Process-local store, for tests and single-process setups
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// Resolve an event-storage location such as `memory:///`, `file:///var/events`
    /// or `s3://bucket/prefix`.
    pub fn from_url(location: &str) -> Result<Self> {
        let url = url::Url::parse(location)
            .map_err(|e| StorageError::InvalidLocation(format!("{}: {}", location, e)))?;
        let (object_store, root) = object_store::parse_url(&url)
            .map_err(|e| StorageError::InvalidLocation(format!("{}: {}", location, e)))?;

        tracing::info!(location = %location, root = %root, "Resolved event storage location");

        Ok(Self::with_root(Arc::from(object_store), root.as_ref()))
    }

    fn path_for(&self, key: &str) -> Path {
        if self.root.is_empty() {
            Path::from(key)
        } else {
            Path::from(format!("{}/{}", self.root, key))
        }
    }

    fn key_for<'a>(&self, path: &'a str) -> &'a str {
        if self.root.is_empty() {
            path
        } else {
            path.strip_prefix(self.root.as_str())
                .map(|rest| rest.trim_start_matches('/'))
                .unwrap_or(path)
        }
    }
}

fn record_error(operation: &str, err: &StorageError) {
    let error_type = if err.is_not_found() {
        "not_found"
    } else {
        "failed"
    };
    BLOB_ERRORS_TOTAL
        .with_label_values(&[operation, error_type])
        .inc();
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.path_for(key);
        BLOB_REQUESTS_TOTAL.with_label_values(&["PUT"]).inc();
        let start = Instant::now();

        let size = data.len();
        let result = self
            .object_store
            .put(&path, data)
            .await
            .map(|_| ())
            .map_err(StorageError::from);

        BLOB_LATENCY
            .with_label_values(&["PUT"])
            .observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(()) => tracing::debug!(key = %key, size, "Put object"),
            Err(e) => {
                record_error("PUT", e);
                tracing::debug!(key = %key, error = %e, "Put object failed");
            }
        }

        result
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.path_for(key);
        BLOB_REQUESTS_TOTAL.with_label_values(&["GET"]).inc();
        let start = Instant::now();

        let result = match self.object_store.get(&path).await {
            Ok(get_result) => get_result.bytes().await.map_err(StorageError::from),
            Err(e) => Err(StorageError::from(e)),
        };

        BLOB_LATENCY
            .with_label_values(&["GET"])
            .observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(data) => tracing::debug!(key = %key, size = data.len(), "Got object"),
            Err(e) => {
                record_error("GET", e);
                tracing::debug!(key = %key, error = %e, "Get object failed");
            }
        }

        result
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let path = self.path_for(prefix);
        BLOB_REQUESTS_TOTAL.with_label_values(&["LIST"]).inc();

        let objects: Vec<object_store::ObjectMeta> = self
            .object_store
            .list(Some(&path))
            .try_collect()
            .await
            .map_err(|e| {
                let err = StorageError::from(e);
                record_error("LIST", &err);
                err
            })?;

        let mut keys: Vec<String> = objects
            .iter()
            .map(|meta| self.key_for(meta.location.as_ref()).to_string())
            .collect();
        keys.sort();

        Ok(keys)
    }
}
