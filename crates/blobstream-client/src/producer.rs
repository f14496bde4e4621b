//! Producer API for writing events to Blobstream.
//!
//! This module provides the `Producer` type, which appends events to partitions.
//!
//! ## Write Path
//!
//! ```text
//! write_event(partition_key, data)
//!     │
//!     ├─ 1. resolve partition id     (partitioner, created on first use)
//!     ├─ 2. reserve sequence number  (atomic increment of the partition counter)
//!     ├─ 3. put blob                 events/{partition_id}/{sequence_number}
//!     └─ 4. spawn notification       (debounced, best effort)
//! ```
//!
//! There is no transaction spanning steps 2 and 3. If the blob put fails, the
//! sequence number is burned: consumers see a gap at that slot and skip it once a
//! later slot has been allocated.
//!
//! ## Partitioner Resolution
//!
//! The partitioner record is written once per deployment. The first producer to
//! write installs its preferred partitioner (or the single-partition default) with
//! a put-if-absent; racing producers lose the conditional write and re-run the whole
//! resolution, which then reads the winner's record. The resolved partitioner is
//! cached on the `Producer` instance.
//!
//! ## Example
//!
//! ```ignore
//! use blobstream_client::{BlobstreamConfig, Producer};
//!
//! let config = BlobstreamConfig::from_json(r#"{"eventsLocation":"memory:///"}"#)?;
//! let producer = Producer::builder().config(&config).build().await?;
//!
//! let written = producer.write_event("user-42", "hello").await?;
//! println!("{} @ {}", written.partition_id, written.sequence_number);
//!
//! producer.flush_notifications().await;
//! ```

use crate::config::BlobstreamConfig;
use crate::error::{ClientError, Result};
use crate::notifier::{NotificationSink, Notifier};
use crate::partitioner::Partitioner;
use crate::retry::{retry_with_predicate, RetryPolicy};
use blobstream_metadata::{open_metadata_store, LeaseRecord, MetadataStore, TableConfig};
use blobstream_observability::metrics::{
    PRODUCER_BYTES_TOTAL, PRODUCER_ERRORS_TOTAL, PRODUCER_EVENTS_TOTAL,
};
use blobstream_storage::{event_key, BlobStore, ObjectBlobStore};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;

/// Where a written event landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    pub partition_id: String,
    pub sequence_number: u64,
}

/// Appends events to partitions of a Blobstream deployment.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Producer {
    metadata_store: Arc<dyn MetadataStore>,
    blob_store: Arc<dyn BlobStore>,
    preferred_partitioner: Option<Partitioner>,
    partitioner: RwLock<Option<Partitioner>>,
    init_retry: RetryPolicy,
    notifier: Option<Arc<Notifier>>,
    notifications: Mutex<JoinSet<()>>,
}

impl Producer {
    pub fn builder() -> ProducerBuilder {
        ProducerBuilder::new()
    }

    /// Append `data` to the partition selected by `partition_key`.
    ///
    /// Returns once the blob is durable. The notification, if any, runs in a
    /// spawned task; see [`Producer::flush_notifications`].
    ///
    /// # Errors
    ///
    /// - configuration errors from partitioner resolution
    /// - `RetriesExhausted` if the partitioner could not be installed
    /// - transport errors from either store (the sequence number is burned if the
    ///   blob put failed)
    pub async fn write_event(
        &self,
        partition_key: impl AsRef<[u8]>,
        data: impl Into<Bytes>,
    ) -> Result<WriteResult> {
        let data = data.into();
        let partitioner = self.get_partitioner(true).await?;
        let partition_id = partitioner.partition_id_for_key(partition_key);

        let (sequence_number, lease_snapshot) = self
            .reserve_sequence_number(&partition_id)
            .await
            .map_err(|e| {
                PRODUCER_ERRORS_TOTAL
                    .with_label_values(&[partition_id.as_str(), "metadata"])
                    .inc();
                e
            })?;

        let key = event_key(&partition_id, sequence_number);
        let size = data.len();
        if let Err(e) = self.blob_store.put(&key, data).await {
            PRODUCER_ERRORS_TOTAL
                .with_label_values(&[partition_id.as_str(), "storage"])
                .inc();
            tracing::warn!(
                partition_id = %partition_id,
                sequence_number,
                error = %e,
                "Event write failed, sequence number will be skipped by consumers"
            );
            return Err(e.into());
        }

        PRODUCER_EVENTS_TOTAL
            .with_label_values(&[partition_id.as_str()])
            .inc();
        PRODUCER_BYTES_TOTAL
            .with_label_values(&[partition_id.as_str()])
            .inc_by(size as u64);
        tracing::debug!(
            partition_id = %partition_id,
            sequence_number,
            size,
            "Wrote event"
        );

        if let Some(notifier) = &self.notifier {
            self.spawn_notification(
                Arc::clone(notifier),
                partition_id.clone(),
                sequence_number,
                lease_snapshot,
            )
            .await;
        }

        Ok(WriteResult {
            partition_id,
            sequence_number,
        })
    }

    async fn spawn_notification(
        &self,
        notifier: Arc<Notifier>,
        partition_id: String,
        sequence_number: u64,
        lease_snapshot: Option<LeaseRecord>,
    ) {
        let mut tasks = self.notifications.lock().await;

        // Reap finished tasks so a long-lived producer does not accumulate them
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            if let Err(e) = notifier
                .notify_for_event(&partition_id, sequence_number, lease_snapshot.as_ref())
                .await
            {
                tracing::warn!(
                    partition_id = %partition_id,
                    sequence_number,
                    error = %e,
                    "Failed to publish notification"
                );
            }
        });
    }

    /// Wait for every notification spawned so far to finish.
    ///
    /// Call before shutdown; dropping the producer aborts in-flight notifications.
    pub async fn flush_notifications(&self) {
        let mut tasks = std::mem::take(&mut *self.notifications.lock().await);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Notification task failed");
            }
        }
    }

    /// Partition id for `partition_key` under the installed partitioner.
    ///
    /// Does not install a partitioner; fails with `PartitionerNotInitialized` if
    /// no producer has written yet.
    pub async fn get_partition_id(&self, partition_key: impl AsRef<[u8]>) -> Result<String> {
        let partitioner = self.get_partitioner(false).await?;
        Ok(partitioner.partition_id_for_key(partition_key))
    }

    /// Number of sequence numbers allocated in `partition_id`, or `None` if the
    /// partition was never written.
    pub async fn get_sequence_number(&self, partition_id: &str) -> Result<Option<u64>> {
        let record = self.metadata_store.get_partition(partition_id).await?;
        Ok(record.map(|r| r.sequence_number))
    }

    /// Allocate the next sequence number of `partition_id`.
    ///
    /// Also returns the lease attached to the partition counter at the time of the
    /// increment.
    pub async fn reserve_sequence_number(
        &self,
        partition_id: &str,
    ) -> Result<(u64, Option<LeaseRecord>)> {
        let record = self
            .metadata_store
            .increment_sequence_number(partition_id)
            .await?;

        let sequence_number = record.sequence_number.checked_sub(1).ok_or_else(|| {
            ClientError::Internal(format!(
                "partition {} counter did not advance on increment",
                partition_id
            ))
        })?;

        Ok((sequence_number, record.lock))
    }

    /// Resolve the installed partitioner, installing one if `create_if_absent`.
    pub async fn get_partitioner(&self, create_if_absent: bool) -> Result<Partitioner> {
        if let Some(partitioner) = self.partitioner.read().await.as_ref() {
            return Ok(partitioner.clone());
        }

        let partitioner = if create_if_absent {
            retry_with_predicate(
                &self.init_retry,
                "Unable to initialize partitioner, maximum retries reached",
                ClientError::is_condition_failed,
                || self.resolve_partitioner(true),
            )
            .await?
        } else {
            self.resolve_partitioner(false).await?
        };

        *self.partitioner.write().await = Some(partitioner.clone());
        Ok(partitioner)
    }

    async fn resolve_partitioner(&self, create_if_absent: bool) -> Result<Partitioner> {
        if let Some(serialized) = self.metadata_store.get_partitioner().await? {
            let installed = Partitioner::parse(&serialized)?;

            if let Some(preferred) = &self.preferred_partitioner {
                if !installed.is_equivalent_to(preferred) {
                    tracing::warn!(
                        installed = %installed,
                        preferred = %preferred,
                        "Installed partitioner differs from the preferred partitioner"
                    );
                }
            }

            return Ok(installed);
        }

        if !create_if_absent {
            return Err(ClientError::PartitionerNotInitialized);
        }

        let partitioner = match &self.preferred_partitioner {
            Some(preferred) => preferred.clone(),
            None => {
                tracing::warn!("No partitioner specified, installing the default partitioner");
                Partitioner::default()
            }
        };

        self.metadata_store
            .create_partitioner(&partitioner.to_json())
            .await?;

        tracing::info!(partitioner = %partitioner, "Installed partitioner");
        Ok(partitioner)
    }

    pub(crate) fn metadata_store(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata_store
    }

    pub(crate) fn blob_store(&self) -> &Arc<dyn BlobStore> {
        &self.blob_store
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("preferred_partitioner", &self.preferred_partitioner)
            .field("notifier", &self.notifier)
            .finish()
    }
}

/// Builder for [`Producer`].
///
/// A blob store (explicit, or an events location) is required. The metadata store
/// defaults to the configured metadata URL. Notifications are sent only when a
/// sink is configured, and a sink requires a topic.
pub struct ProducerBuilder {
    metadata_store: Option<Arc<dyn MetadataStore>>,
    metadata_url: String,
    tables: TableConfig,
    blob_store: Option<Arc<dyn BlobStore>>,
    events_location: Option<String>,
    notification_sink: Option<Arc<dyn NotificationSink>>,
    events_topic: Option<String>,
    preferred_partitioner: Option<Partitioner>,
    configured_partitioner: Result<Option<Partitioner>>,
    max_notify_latency: Duration,
    partitioner_init_retries: usize,
}

impl ProducerBuilder {
    pub fn new() -> Self {
        let defaults = BlobstreamConfig::default();
        Self {
            metadata_store: None,
            metadata_url: defaults.metadata_url.clone(),
            tables: defaults.tables(),
            blob_store: None,
            events_location: None,
            notification_sink: None,
            events_topic: None,
            preferred_partitioner: None,
            configured_partitioner: Ok(None),
            max_notify_latency: defaults.max_notify_latency(),
            partitioner_init_retries: defaults.partitioner_init_retries,
        }
    }

    /// Take every setting from `config`. Explicit stores set on the builder win.
    pub fn config(mut self, config: &BlobstreamConfig) -> Self {
        self.metadata_url = config.metadata_url.clone();
        self.tables = config.tables();
        self.events_location = config.events_location.clone();
        self.events_topic = config.events_topic.clone();
        self.configured_partitioner = config.preferred_partitioner();
        self.max_notify_latency = config.max_notify_latency();
        self.partitioner_init_retries = config.partitioner_init_retries;
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

    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notification_sink = Some(sink);
        self
    }

    pub fn events_topic(mut self, topic: impl Into<String>) -> Self {
        self.events_topic = Some(topic.into());
        self
    }

    /// Partitioner installed if none exists yet. Ignored (with a warning on
    /// mismatch) once a partitioner is installed.
    pub fn preferred_partitioner(mut self, partitioner: Partitioner) -> Self {
        self.preferred_partitioner = Some(partitioner);
        self
    }

    /// Notification lease TTL (default: 1s).
    pub fn max_notify_latency(mut self, latency: Duration) -> Self {
        self.max_notify_latency = latency;
        self
    }

    /// Attempts at resolving the partitioner under creation races (default: 10).
    pub fn partitioner_init_retries(mut self, attempts: usize) -> Self {
        self.partitioner_init_retries = attempts;
        self
    }

    pub async fn build(self) -> Result<Producer> {
        let blob_store = resolve_blob_store(self.blob_store, self.events_location.as_deref())?;

        let metadata_store = match self.metadata_store {
            Some(store) => store,
            None => open_metadata_store(&self.metadata_url, self.tables).await?,
        };

        let preferred_partitioner = match self.preferred_partitioner {
            Some(partitioner) => Some(partitioner),
            None => self.configured_partitioner?,
        };

        let notifier = match (self.notification_sink, self.events_topic) {
            (Some(sink), Some(topic)) => Some(Arc::new(Notifier::new(
                Arc::clone(&metadata_store),
                sink,
                topic,
                self.max_notify_latency,
            ))),
            (Some(_), None) => {
                return Err(ClientError::ConfigError(
                    "eventsTopic is required when a notification sink is set".to_string(),
                ))
            }
            (None, topic) => {
                if let Some(topic) = topic {
                    tracing::warn!(
                        topic = %topic,
                        "eventsTopic is configured but no notification sink is set, notifications disabled"
                    );
                }
                None
            }
        };

        Ok(Producer {
            metadata_store,
            blob_store,
            preferred_partitioner,
            partitioner: RwLock::new(None),
            init_retry: RetryPolicy::immediate(self.partitioner_init_retries),
            notifier,
            notifications: Mutex::new(JoinSet::new()),
        })
    }
}

impl Default for ProducerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn resolve_blob_store(
    explicit: Option<Arc<dyn BlobStore>>,
    events_location: Option<&str>,
) -> Result<Arc<dyn BlobStore>> {
    match (explicit, events_location) {
        (Some(store), _) => Ok(store),
        (None, Some(location)) => {
            let store = ObjectBlobStore::from_url(location)
                .map_err(|e| ClientError::ConfigError(e.to_string()))?;
            Ok(Arc::new(store))
        }
        (None, None) => Err(ClientError::ConfigError(
            "eventsLocation is required".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::BroadcastNotificationSink;
    use crate::ErrorKind;
    use blobstream_metadata::InMemoryMetadataStore;

    async fn producer_with(store: Arc<InMemoryMetadataStore>) -> Producer {
        Producer::builder()
            .metadata_store(store)
            .blob_store(Arc::new(ObjectBlobStore::in_memory()))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_build_requires_events_location() {
        let err = Producer::builder().build().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("eventsLocation"));
    }

    #[tokio::test]
    async fn test_build_sink_requires_topic() {
        let err = Producer::builder()
            .events_location("memory:///")
            .notification_sink(Arc::new(BroadcastNotificationSink::default()))
            .build()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("eventsTopic"));
    }

    #[tokio::test]
    async fn test_build_from_config() {
        let config = BlobstreamConfig::from_json(
            r#"{"eventsLocation":"memory:///","preferredPartitionCount":3}"#,
        )
        .unwrap();
        let producer = Producer::builder().config(&config).build().await.unwrap();

        producer.write_event("k", "v").await.unwrap();
        let partitioner = producer.get_partitioner(false).await.unwrap();
        assert_eq!(partitioner.partition_count(), 3);
    }

    #[tokio::test]
    async fn test_build_rejects_zero_partition_count_from_config() {
        let config = BlobstreamConfig::from_json(
            r#"{"eventsLocation":"memory:///","preferredPartitionCount":0}"#,
        )
        .unwrap();
        let err = Producer::builder().config(&config).build().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_explicit_partitioner_wins_over_config() {
        let config = BlobstreamConfig::from_json(
            r#"{"eventsLocation":"memory:///","preferredPartitionCount":0}"#,
        )
        .unwrap();
        let producer = Producer::builder()
            .config(&config)
            .preferred_partitioner(Partitioner::with_partition_count(5).unwrap())
            .build()
            .await
            .unwrap();

        producer.write_event("k", "v").await.unwrap();
        assert_eq!(producer.get_partitioner(false).await.unwrap().partition_count(), 5);
    }

    #[tokio::test]
    async fn test_topic_without_sink_builds_without_notifier() {
        let config = BlobstreamConfig::from_json(
            r#"{"eventsLocation":"memory:///","eventsTopic":"events"}"#,
        )
        .unwrap();
        let producer = Producer::builder().config(&config).build().await.unwrap();
        assert!(producer.notifier.is_none());

        producer.write_event("k", "v").await.unwrap();
        producer.flush_notifications().await;
    }

    #[tokio::test]
    async fn test_sequence_numbers_are_dense_per_partition() {
        let producer = producer_with(Arc::new(InMemoryMetadataStore::new())).await;

        for expected in 0..5 {
            let written = producer.write_event("key", "data").await.unwrap();
            assert_eq!(written.partition_id, "0");
            assert_eq!(written.sequence_number, expected);
        }
        assert_eq!(producer.get_sequence_number("0").await.unwrap(), Some(5));
        assert_eq!(producer.get_sequence_number("9").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_event_blob_written_at_layout_key() {
        let producer = producer_with(Arc::new(InMemoryMetadataStore::new())).await;
        producer.write_event("key", "payload").await.unwrap();

        let data = producer.blob_store().get("events/0/0").await.unwrap();
        assert_eq!(data, Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn test_default_partitioner_installed_on_first_write() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let producer = producer_with(store.clone()).await;

        producer.write_event("k", "v").await.unwrap();
        let serialized = store.get_partitioner().await.unwrap().unwrap();
        assert_eq!(
            serialized,
            r#"{"version":1,"method":"mod","partitionCount":1}"#
        );
    }

    #[tokio::test]
    async fn test_installed_partitioner_wins_over_preferred() {
        let store = Arc::new(InMemoryMetadataStore::new());
        store
            .create_partitioner(&Partitioner::with_partition_count(2).unwrap().to_json())
            .await
            .unwrap();

        let producer = Producer::builder()
            .metadata_store(store)
            .blob_store(Arc::new(ObjectBlobStore::in_memory()))
            .preferred_partitioner(Partitioner::with_partition_count(8).unwrap())
            .build()
            .await
            .unwrap();

        let partitioner = producer.get_partitioner(true).await.unwrap();
        assert_eq!(partitioner.partition_count(), 2);
    }

    #[tokio::test]
    async fn test_get_partition_id_without_partitioner() {
        let producer = producer_with(Arc::new(InMemoryMetadataStore::new())).await;
        let err = producer.get_partition_id("k").await.unwrap_err();
        assert!(matches!(err, ClientError::PartitionerNotInitialized));
    }

    #[tokio::test]
    async fn test_concurrent_first_writes_agree_on_partitioner() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let mut handles = Vec::new();
        for count in 1..=6u32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let producer = Producer::builder()
                    .metadata_store(store)
                    .blob_store(Arc::new(ObjectBlobStore::in_memory()))
                    .preferred_partitioner(Partitioner::with_partition_count(count).unwrap())
                    .build()
                    .await
                    .unwrap();
                producer.write_event("k", "v").await.unwrap();
                producer.get_partitioner(false).await.unwrap()
            }));
        }

        let mut resolved = Vec::new();
        for handle in handles {
            resolved.push(handle.await.unwrap());
        }
        assert!(resolved.windows(2).all(|w| w[0].is_equivalent_to(&w[1])));
    }

    #[tokio::test]
    async fn test_unparseable_partitioner_is_fatal() {
        let store = Arc::new(InMemoryMetadataStore::new());
        store.create_partitioner("garbage").await.unwrap();

        let producer = producer_with(store).await;
        let err = producer.write_event("k", "v").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_notifications_published_and_flushed() {
        let sink = BroadcastNotificationSink::default();
        let mut rx = sink.subscribe();

        let producer = Producer::builder()
            .metadata_store(Arc::new(InMemoryMetadataStore::new()))
            .blob_store(Arc::new(ObjectBlobStore::in_memory()))
            .notification_sink(Arc::new(sink))
            .events_topic("events")
            .max_notify_latency(Duration::from_millis(20))
            .build()
            .await
            .unwrap();

        producer.write_event("k", "v").await.unwrap();
        producer.flush_notifications().await;

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.topic, "events");
        let notification = msg.notification().unwrap();
        assert_eq!(notification.partition_id, "0");
        assert_eq!(notification.sequence_number, 0);
    }
}
