//! Blobstream Metadata Store
//!
//! This crate implements the coordination state of Blobstream - the small set of
//! items that make an eventually-visible blob store usable as an ordered log.
//!
//! ## Purpose
//!
//! Event payloads live in the blob store. The metadata store tracks:
//! - **Partitioner**: the write-once record deciding how keys map to partitions
//! - **Partition counters**: how many sequence numbers each partition has handed out
//! - **Consumer checkpoints**: the next offset each consumer name reads per partition
//! - **Leases**: time-bounded, owner-tagged locks on partition and checkpoint items
//!
//! ## Required Primitives
//!
//! There is no transaction spanning the blob store and the metadata store, so every
//! protocol step is built from four single-item primitives:
//!
//! 1. get-by-key
//! 2. put-if-absent
//! 3. update-with-condition (e.g. "no lease OR lease expired")
//! 4. atomic increment-and-return
//!
//! Rejected conditions surface as [`MetadataError::ConditionFailed`] so callers can
//! branch on them without inspecting messages.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  increment   ┌─────────────────┐
//! │   Producer   │ ───────────→ │ Metadata Store  │ ◄── You are here
//! └──────┬───────┘              │ (memory/SQLite) │
//!        │ put                  └────────┬────────┘
//!        ▼                               │ checkpoint + lease
//! ┌──────────────┐     get      ┌────────┴─────────┐
//! │  Blob Store  │ ←─────────── │    Consumer      │
//! └──────────────┘              └──────────────────┘
//! ```
//!
//! ## Usage Example
//!
//! ```ignore
//! use blobstream_metadata::{InMemoryMetadataStore, LeaseKey, MetadataStore, now_ms};
//!
//! let store = InMemoryMetadataStore::new();
//!
//! // Allocate sequence number 0 of partition "3"
//! let record = store.increment_sequence_number("3").await?;
//! assert_eq!(record.sequence_number - 1, 0);
//!
//! // Take the consumer lease for 5 seconds
//! let key = LeaseKey::consumer("analytics", "3");
//! let now = now_ms();
//! store.acquire_lease(&key, "owner-a", now, now + 5_000).await?;
//! store.commit_checkpoint("analytics", "3", 1, "owner-a", now + 5_000).await?;
//! store.release_lease(&key, "owner-a").await?;
//! ```
//!
//! ## Thread Safety
//!
//! All implementations are Send + Sync and are shared as `Arc<dyn MetadataStore>`.

pub mod error;
pub mod memory;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use error::{MetadataError, Result};
pub use memory::InMemoryMetadataStore;
pub use store::SqliteMetadataStore;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Metadata store trait - abstracts over different storage backends.
///
/// ## Implementations
///
/// - **InMemoryMetadataStore**: process-local tables, used for tests and single-process setups
/// - **SqliteMetadataStore**: durable tables in a SQLite database
///
/// ## Thread Safety
///
/// All implementations must be Send + Sync, allowing safe sharing across async tasks
/// via `Arc<dyn MetadataStore>`.
///
/// ## Conditional Writes
///
/// Every method documented as conditional either applies its write atomically or
/// returns `ConditionFailed` without changing anything.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    // ============================================================
    // PARTITIONER OPERATIONS
    // ============================================================

    /// Read the serialized partitioner record, if one has been installed.
    async fn get_partitioner(&self) -> Result<Option<String>>;

    /// Install the serialized partitioner record.
    ///
    /// # Errors
    ///
    /// - `ConditionFailed`: a partitioner record already exists (put-if-absent)
    async fn create_partitioner(&self, serialized: &str) -> Result<()>;

    // ============================================================
    // PARTITION COUNTER OPERATIONS
    // ============================================================

    /// Read the counter item for a partition.
    ///
    /// Returns `Ok(None)` if no sequence number was ever allocated and no lease
    /// was ever taken on the partition.
    async fn get_partition(&self, partition_id: &str) -> Result<Option<PartitionRecord>>;

    /// Atomically increment the partition counter by one and return the updated item.
    ///
    /// The counter is created at 1 when absent. The returned record carries the new
    /// counter value together with whatever lease is attached to the item.
    async fn increment_sequence_number(&self, partition_id: &str) -> Result<PartitionRecord>;

    // ============================================================
    // LEASE OPERATIONS
    // ============================================================

    /// Take the lease on `key` for `owner_id` until `expires_at`.
    ///
    /// Succeeds only if the item has no lease or its lease expired at or before `now_ms`.
    /// Creates the item (counter/checkpoint 0) when absent.
    ///
    /// # Errors
    ///
    /// - `ConditionFailed`: an unexpired lease is held (by anyone, including `owner_id`)
    async fn acquire_lease(
        &self,
        key: &LeaseKey,
        owner_id: &str,
        now_ms: i64,
        expires_at: i64,
    ) -> Result<LeaseRecord>;

    /// Clear the lease on `key` if it is still owned by `owner_id`.
    ///
    /// # Errors
    ///
    /// - `ConditionFailed`: the lease is absent or owned by someone else
    async fn release_lease(&self, key: &LeaseKey, owner_id: &str) -> Result<()>;

    // ============================================================
    // CONSUMER CHECKPOINT OPERATIONS
    // ============================================================

    /// Read the checkpoint item for (consumer_name, partition_id).
    async fn get_checkpoint(
        &self,
        consumer_name: &str,
        partition_id: &str,
    ) -> Result<Option<ConsumerCheckpoint>>;

    /// Persist the checkpoint and refresh the lease expiration in one write.
    ///
    /// # Errors
    ///
    /// - `ConditionFailed`: the consumer lease is not owned by `owner_id`
    async fn commit_checkpoint(
        &self,
        consumer_name: &str,
        partition_id: &str,
        sequence_number: u64,
        owner_id: &str,
        lease_expires_at: i64,
    ) -> Result<()>;
}

/// Open a metadata store from a URL.
///
/// - `memory://` selects [`InMemoryMetadataStore`]
/// - anything else is handed to [`SqliteMetadataStore::with_tables`] as a SQLite path or URL
pub async fn open_metadata_store(url: &str, tables: TableConfig) -> Result<Arc<dyn MetadataStore>> {
    if url.starts_with("memory:") {
        tracing::info!("Using in-memory metadata store");
        return Ok(Arc::new(InMemoryMetadataStore::new()));
    }

    tracing::info!(url = %url, "Using SQLite metadata store");
    let store = SqliteMetadataStore::with_tables(url, tables).await?;
    Ok(Arc::new(store))
}
