//! Blobstream Client Library
//!
//! Producer and consumer for a partitioned, append-only event log that lives in a
//! blob store and is coordinated through a metadata store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Your Application                       │
//! └───────┬─────────────────────────────────────────┬───────────┘
//!         │ write_event(key, data)                  │ read_events(partition, handler)
//!         ▼                                         ▼
//! ┌──────────────────┐                     ┌──────────────────┐
//! │     Producer     │                     │     Consumer     │
//! │  - Partitioner   │                     │  - LeaseLock     │
//! │  - Notifier      │                     │  - checkpoints   │
//! └──┬─────────┬─────┘                     └──┬──────────┬────┘
//!    │ put     │ increment / lease            │ get      │ lease / checkpoint
//!    ▼         ▼                              ▼          ▼
//! ┌────────┐ ┌───────────────────┐        ┌────────┐ ┌───────────────────┐
//! │  Blob  │ │  Metadata Store   │        │  Blob  │ │  Metadata Store   │
//! │ Store  │ │ (memory / SQLite) │        │ Store  │ │                   │
//! └────────┘ └───────────────────┘        └────────┘ └───────────────────┘
//! ```
//!
//! ## Components
//!
//! - [`Partitioner`]: SHA-256 of the partition key modulo the partition count
//! - [`LeaseLock`]: time-bounded mutual exclusion over metadata items
//! - [`Producer`]: allocates sequence numbers and writes event blobs
//! - [`Notifier`]: debounced "partition advanced" messages on a topic
//! - [`Consumer`]: ordered, checkpointed, at-least-once batch reads
//!
//! ## Quick Start
//!
//! ```ignore
//! use blobstream_client::{BlobstreamConfig, Consumer, Producer, ReadRequest};
//!
//! let config = BlobstreamConfig::from_json(r#"{
//!     "eventsLocation": "file:///var/lib/blobstream/events",
//!     "metadataUrl": "/var/lib/blobstream/meta.db",
//!     "preferredPartitionCount": 4,
//!     "consumerName": "analytics"
//! }"#)?;
//!
//! let producer = Producer::builder().config(&config).build().await?;
//! producer.write_event("order-17", r#"{"total": 12}"#).await?;
//!
//! let consumer = Consumer::builder().config(&config).build().await?;
//! let partition_id = consumer.get_partition_id("order-17").await?;
//! consumer
//!     .read_events(ReadRequest::new(partition_id), |event| async move {
//!         handle(event.data).await
//!     })
//!     .await?;
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod lock;
pub mod notifier;
pub mod partitioner;
pub mod producer;
pub mod retry;

pub use config::BlobstreamConfig;
pub use consumer::{ConsumedEvent, Consumer, ConsumerBuilder, ReadRequest, ReadResult};
pub use error::{ClientError, ErrorKind, Result};
pub use lock::LeaseLock;
pub use notifier::{
    BroadcastNotificationSink, Notification, NotificationSink, Notifier, PublishedMessage,
};
pub use partitioner::{PartitionMethod, Partitioner, HIGHEST_SUPPORTED_VERSION};
pub use producer::{Producer, ProducerBuilder, WriteResult};
pub use retry::{retry_with_predicate, RetryPolicy};

pub use blobstream_metadata::{
    InMemoryMetadataStore, MetadataError, MetadataStore, SqliteMetadataStore,
};
pub use blobstream_storage::{BlobStore, ObjectBlobStore, StorageError};
