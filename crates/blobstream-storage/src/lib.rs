//! Blobstream Storage Layer
//!
//! This crate implements the blob side of Blobstream: one immutable object per
//! event, addressed by partition and sequence number.
//!
//! ## What is the Storage Layer?
//!
//! ```text
//! ┌─────────────┐
//! │  Producers  │
//! └──────┬──────┘
//!        │ put events/{partition}/{seq}
//!        ▼
//! ┌─────────────────┐
//! │   BlobStore     │ ◄── You are here
//! │ (S3/file/memory)│
//! └────────┬────────┘
//!          │ get events/{partition}/{seq}
//!          ▼
//! ┌─────────────┐
//! │  Consumers  │
//! └─────────────┘
//! ```
//!
//! ## Required Capability
//!
//! - **put**: unconditional, overwrite allowed
//! - **get**: fails with a distinguishable [`StorageError::NotFound`]
//! - **list**: by key prefix
//!
//! Visibility after a put may be eventual. The protocol never infers anything from a
//! missing object alone; consumers always cross-check with the partition counter in
//! the metadata store.
//!
//! ## Usage Example
//!
//! ```ignore
//! use blobstream_storage::{BlobStore, ObjectBlobStore, event_key};
//! use bytes::Bytes;
//!
//! let store = ObjectBlobStore::from_url("s3://my-bucket/events-prod")?;
//! store.put(&event_key("3", 0), Bytes::from("payload")).await?;
//! let payload = store.get(&event_key("3", 0)).await?;
//! ```

pub mod blob;
pub mod error;
pub mod layout;

pub use blob::ObjectBlobStore;
pub use error::{Result, StorageError};
pub use layout::{event_key, partition_prefix};

use async_trait::async_trait;
use bytes::Bytes;

/// Blob store trait - abstracts over object storage backends.
///
/// All implementations must be Send + Sync and are shared as `Arc<dyn BlobStore>`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `data` at `key`, replacing any existing object.
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;

    /// Read the object at `key`.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no object exists at `key` (or it is not visible yet)
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// List keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
