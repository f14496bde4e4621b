//! Consumer API for reading events from Blobstream.
//!
//! A consumer reads each partition in sequence-number order and checkpoints its
//! progress under a consumer name. Consumers sharing a name share checkpoints, so
//! any number of processes can cooperate on one partition; consumers with different
//! names progress independently over the same partitions.
//!
//! ## Batch Protocol
//!
//! ```text
//! read_events(partition, count, handler)
//!     │
//!     ├─ acquire consumer lease (ttl = last active expiration)
//!     │       └─ contention ─▶ { events_read: 0, done: true }
//!     │
//!     ├─ checkpoint = next offset to read, committed = partition counter
//!     │
//!     ├─ for offset in checkpoint.. (at most `count` slots):
//!     │       get events/{partition}/{offset}
//!     │         found      ─▶ handler(event), commit offset + 1 (refreshes the lease)
//!     │         not found  ─▶ offset >= counter: caught up, stop
//!     │                       offset <  counter: gap, warn, commit offset + 1
//!     │
//!     └─ release lease, done = checkpoint >= committed at batch start
//! ```
//!
//! ## Delivery Guarantees
//!
//! - **Ordering**: events of one partition are delivered in sequence-number order
//! - **At-least-once**: a handler error stops the batch before its event is
//!   checkpointed, so the next call redelivers it
//! - **Exclusion**: the lease keeps two readers of one (name, partition) apart as
//!   long as a batch finishes within the lease TTL
//!
//! ## Example
//!
//! ```ignore
//! use blobstream_client::{Consumer, ReadRequest};
//!
//! let consumer = Consumer::builder()
//!     .config(&config)
//!     .consumer_name("analytics")
//!     .build()
//!     .await?;
//!
//! for partition_id in consumer.partition_ids().await? {
//!     loop {
//!         let result = consumer
//!             .read_events(ReadRequest::new(&partition_id), |event| async move {
//!                 println!("{}: {:?}", event.sequence_number, event.data);
//!                 Ok::<_, std::io::Error>(())
//!             })
//!             .await?;
//!         if result.done {
//!             break;
//!         }
//!     }
//! }
//! ```

use crate::config::BlobstreamConfig;
use crate::error::{ClientError, Result};
use crate::lock::LeaseLock;
use crate::producer::{resolve_blob_store, Producer};
use blobstream_metadata::{open_metadata_store, LeaseKey, MetadataStore, TableConfig};
use blobstream_observability::metrics::{
    CONSUMER_EVENTS_TOTAL, CONSUMER_GAPS_SKIPPED_TOTAL, CONSUMER_LAG,
};
use blobstream_storage::{event_key, BlobStore};
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Which partition to read and how many slots at most.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub partition_id: String,

    /// Slots to consume; `None` uses the consumer's batch size
    pub count: Option<usize>,
}

impl ReadRequest {
    pub fn new(partition_id: impl Into<String>) -> Self {
        Self {
            partition_id: partition_id.into(),
            count: None,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

/// One event handed to the read handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedEvent {
    pub partition_id: String,
    pub sequence_number: u64,
    pub data: Bytes,
}

/// Outcome of one `read_events` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadResult {
    /// Events delivered to the handler
    pub events_read: usize,

    /// Allocated-but-never-written slots skipped
    pub gaps_skipped: usize,

    /// Nothing more for this caller to do right now: either the checkpoint reached
    /// the counter observed at batch start, or another instance holds the lease
    pub done: bool,
}

struct Batch {
    events_read: usize,
    gaps_skipped: usize,
    checkpoint: u64,
    committed_at_start: u64,
}

/// Reads partitions under a consumer name.
pub struct Consumer {
    producer: Producer,
    consumer_name: String,
    lock: LeaseLock,
    batch_size: usize,
}

impl Consumer {
    pub fn builder() -> ConsumerBuilder {
        ConsumerBuilder::new()
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Partition ids of the installed partitioner.
    pub async fn partition_ids(&self) -> Result<Vec<String>> {
        let partitioner = self.producer.get_partitioner(false).await?;
        Ok(partitioner.partition_ids())
    }

    /// Partition id that `partition_key` is written to.
    pub async fn get_partition_id(&self, partition_key: impl AsRef<[u8]>) -> Result<String> {
        self.producer.get_partition_id(partition_key).await
    }

    /// Next offset this consumer name reads in `partition_id` (0 if never read).
    pub async fn get_sequence_number(&self, partition_id: &str) -> Result<u64> {
        let checkpoint = self
            .metadata_store()
            .get_checkpoint(&self.consumer_name, partition_id)
            .await?;
        Ok(checkpoint.map(|c| c.sequence_number).unwrap_or(0))
    }

    /// Move the checkpoint past every event allocated so far.
    ///
    /// # Errors
    ///
    /// - `LockContention` if another instance is reading the partition
    pub async fn skip_to_end(&self, partition_id: &str) -> Result<()> {
        let key = LeaseKey::consumer(&self.consumer_name, partition_id);

        self.lock
            .with_lock(&key, || async {
                let committed = self
                    .producer
                    .get_sequence_number(partition_id)
                    .await?
                    .unwrap_or(0);
                self.commit(partition_id, committed).await?;

                tracing::info!(
                    consumer = %self.consumer_name,
                    partition_id = %partition_id,
                    sequence_number = committed,
                    "Skipped to end of partition"
                );
                Ok(())
            })
            .await
    }

    /// Read up to `request.count` slots of a partition, calling `handler` for each
    /// event in order.
    ///
    /// # Errors
    ///
    /// - `HandlerError` if `handler` fails; the failing event is not checkpointed
    /// - transport errors from either store
    ///
    /// Lock contention is not an error: it returns `{ events_read: 0, done: true }`.
    pub async fn read_events<F, Fut, E>(
        &self,
        request: ReadRequest,
        handler: F,
    ) -> Result<ReadResult>
    where
        F: FnMut(ConsumedEvent) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let partition_id = request.partition_id.as_str();
        let count = request.count.unwrap_or(self.batch_size);
        let key = LeaseKey::consumer(&self.consumer_name, partition_id);

        let batch = match self
            .lock
            .with_lock(&key, || self.read_batch(partition_id, count, handler))
            .await
        {
            Ok(batch) => batch,
            Err(ClientError::LockContention { .. }) => {
                tracing::debug!(
                    consumer = %self.consumer_name,
                    partition_id = %partition_id,
                    "Partition is being read by another instance"
                );
                return Ok(ReadResult {
                    events_read: 0,
                    gaps_skipped: 0,
                    done: true,
                });
            }
            Err(e) => {
                tracing::debug!(
                    consumer = %self.consumer_name,
                    partition_id = %partition_id,
                    error = %e,
                    "Batch aborted"
                );
                return Err(e);
            }
        };

        let remaining = batch.committed_at_start.saturating_sub(batch.checkpoint);
        CONSUMER_LAG
            .with_label_values(&[partition_id, self.consumer_name.as_str()])
            .set(i64::try_from(remaining).unwrap_or(i64::MAX));

        Ok(ReadResult {
            events_read: batch.events_read,
            gaps_skipped: batch.gaps_skipped,
            done: remaining == 0,
        })
    }

    async fn read_batch<F, Fut, E>(
        &self,
        partition_id: &str,
        count: usize,
        mut handler: F,
    ) -> Result<Batch>
    where
        F: FnMut(ConsumedEvent) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let start = self.get_sequence_number(partition_id).await?;
        let committed_at_start = self
            .producer
            .get_sequence_number(partition_id)
            .await?
            .unwrap_or(0);

        let mut batch = Batch {
            events_read: 0,
            gaps_skipped: 0,
            checkpoint: start,
            committed_at_start,
        };

        while batch.events_read + batch.gaps_skipped < count {
            let offset = batch.checkpoint;
            let key = event_key(partition_id, offset);

            match self.blob_store().get(&key).await {
                Ok(data) => {
                    tracing::debug!(
                        consumer = %self.consumer_name,
                        partition_id = %partition_id,
                        sequence_number = offset,
                        "Delivering event"
                    );
                    handler(ConsumedEvent {
                        partition_id: partition_id.to_string(),
                        sequence_number: offset,
                        data,
                    })
                    .await
                    .map_err(|e| ClientError::HandlerError(e.into()))?;

                    batch.events_read += 1;
                    CONSUMER_EVENTS_TOTAL
                        .with_label_values(&[partition_id, self.consumer_name.as_str()])
                        .inc();
                }
                Err(e) if e.is_not_found() => {
                    let committed = self
                        .producer
                        .get_sequence_number(partition_id)
                        .await?
                        .unwrap_or(0);

                    if offset >= committed {
                        tracing::debug!(
                            partition_id = %partition_id,
                            sequence_number = offset,
                            "Event does not exist yet"
                        );
                        break;
                    }

                    tracing::warn!(
                        consumer = %self.consumer_name,
                        partition_id = %partition_id,
                        sequence_number = offset,
                        committed,
                        "Event is missing below the partition counter, skipping it"
                    );
                    batch.gaps_skipped += 1;
                    CONSUMER_GAPS_SKIPPED_TOTAL
                        .with_label_values(&[partition_id, self.consumer_name.as_str()])
                        .inc();
                }
                Err(e) => return Err(e.into()),
            }

            batch.checkpoint = offset + 1;
            self.commit(partition_id, batch.checkpoint).await?;
        }

        Ok(batch)
    }

    /// Persist the checkpoint and extend the lease.
    async fn commit(&self, partition_id: &str, sequence_number: u64) -> Result<()> {
        tracing::trace!(
            consumer = %self.consumer_name,
            partition_id = %partition_id,
            sequence_number,
            "Committing checkpoint"
        );

        self.metadata_store()
            .commit_checkpoint(
                &self.consumer_name,
                partition_id,
                sequence_number,
                self.lock.owner_id(),
                self.lock.expires_at_from_now(),
            )
            .await
            .map_err(|e| {
                if e.is_condition_failed() {
                    tracing::warn!(
                        consumer = %self.consumer_name,
                        partition_id = %partition_id,
                        sequence_number,
                        "Lease lost before checkpoint commit"
                    );
                }
                ClientError::from(e)
            })
    }

    fn metadata_store(&self) -> &Arc<dyn MetadataStore> {
        self.producer.metadata_store()
    }

    fn blob_store(&self) -> &Arc<dyn BlobStore> {
        self.producer.blob_store()
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("consumer_name", &self.consumer_name)
            .field("lock", &self.lock)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

/// Builder for [`Consumer`].
///
/// Requires a consumer name and a blob store (explicit, or an events location).
pub struct ConsumerBuilder {
    metadata_store: Option<Arc<dyn MetadataStore>>,
    metadata_url: String,
    tables: TableConfig,
    blob_store: Option<Arc<dyn BlobStore>>,
    events_location: Option<String>,
    consumer_name: Option<String>,
    last_active_expiration: Duration,
    batch_size: usize,
}

impl ConsumerBuilder {
    pub fn new() -> Self {
        let defaults = BlobstreamConfig::default();
        Self {
            metadata_store: None,
            metadata_url: defaults.metadata_url.clone(),
            tables: defaults.tables(),
            blob_store: None,
            events_location: None,
            consumer_name: None,
            last_active_expiration: defaults.last_active_expiration(),
            batch_size: defaults.batch_size,
        }
    }

    /// Take every setting from `config`. Explicit stores set on the builder win.
    pub fn config(mut self, config: &BlobstreamConfig) -> Self {
        self.metadata_url = config.metadata_url.clone();
        self.tables = config.tables();
        self.events_location = config.events_location.clone();
        if config.consumer_name.is_some() {
            self.consumer_name = config.consumer_name.clone();
        }
        self.last_active_expiration = config.last_active_expiration();
        self.batch_size = config.batch_size;
        self
    }

    pub fn metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata_store = Some(store);
        self
    }

    pub fn blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    pub fn events_location(mut self, location: impl Into<String>) -> Self {
        self.events_location = Some(location.into());
        self
    }

    /// Checkpoint lineage (required).
    pub fn consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_name = Some(name.into());
        self
    }

    /// Consumer lease TTL (default: 5s). Must exceed the time a batch takes.
    pub fn last_active_expiration(mut self, ttl: Duration) -> Self {
        self.last_active_expiration = ttl;
        self
    }

    /// Default slot count per `read_events` call (default: 20).
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub async fn build(self) -> Result<Consumer> {
        let consumer_name = self
            .consumer_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ClientError::ConfigError("consumerName is required".to_string()))?;

        let blob_store = resolve_blob_store(self.blob_store, self.events_location.as_deref())?;

        let metadata_store = match self.metadata_store {
            Some(store) => store,
            None => open_metadata_store(&self.metadata_url, self.tables).await?,
        };

        let producer = Producer::builder()
            .metadata_store(Arc::clone(&metadata_store))
            .blob_store(blob_store)
            .build()
            .await?;

        Ok(Consumer {
            producer,
            consumer_name,
            lock: LeaseLock::new(metadata_store, self.last_active_expiration),
            batch_size: self.batch_size,
        })
    }
}

impl Default for ConsumerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
