//! Debounced Write Notifications
//!
//! After every write the producer asks the notifier to announce
//! `(partition_id, sequence_number)` on the events topic. Bursts of writes to one
//! partition collapse into O(1) messages through the partition's lease:
//!
//! ```text
//! write ──▶ lease snapshot active? ──yes──▶ suppressed (a debounce window is open)
//!                    │ no
//!                    ▼
//!           acquire partition lease (ttl = max latency) ──contention──▶ suppressed
//!                    │
//!                    ▼
//!           publish(seq) ── sleep ttl/2 ── re-read counter ── advanced? ── publish(latest)
//!                    │
//!                    ▼
//!                 release
//! ```
//!
//! Worst-case notification latency is bounded by the lease TTL. Notifications are a
//! latency optimization only: consumers always discover new events by reading the
//! partition counter.

use crate::error::{ClientError, Result};
use crate::lock::LeaseLock;
use async_trait::async_trait;
use blobstream_metadata::{LeaseKey, LeaseRecord, MetadataStore};
use blobstream_observability::metrics::{
    NOTIFICATIONS_PUBLISHED_TOTAL, NOTIFICATIONS_SUPPRESSED_TOTAL,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Message body published on the events topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub partition_id: String,
    pub sequence_number: u64,
}

/// Publish side of a pub/sub topic.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, topic: &str, message: &str) -> Result<()>;
}

/// A message as delivered to [`BroadcastNotificationSink`] subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub message: String,
}

impl PublishedMessage {
    /// Decode the body as a [`Notification`].
    pub fn notification(&self) -> Result<Notification> {
        serde_json::from_str(&self.message)
            .map_err(|e| ClientError::NotificationError(format!("malformed notification: {}", e)))
    }
}

/// In-process topic over `tokio::sync::broadcast`.
///
/// Publishing with no subscribers succeeds; the message is simply dropped.
#[derive(Debug, Clone)]
pub struct BroadcastNotificationSink {
    event_tx: broadcast::Sender<PublishedMessage>,
}

impl BroadcastNotificationSink {
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self { event_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedMessage> {
        self.event_tx.subscribe()
    }
}

impl Default for BroadcastNotificationSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl NotificationSink for BroadcastNotificationSink {
    async fn publish(&self, topic: &str, message: &str) -> Result<()> {
        let receivers = self
            .event_tx
            .send(PublishedMessage {
                topic: topic.to_string(),
                message: message.to_string(),
            })
            .unwrap_or(0);
        tracing::trace!(topic = %topic, receivers, "Broadcast notification");
        Ok(())
    }
}

/// Debouncing notifier for one topic.
pub struct Notifier {
    store: Arc<dyn MetadataStore>,
    sink: Arc<dyn NotificationSink>,
    topic: String,
    lock: LeaseLock,
}

impl Notifier {
    /// `max_latency` is the partition lease TTL; the debounce sleep is half of it.
    pub fn new(
        store: Arc<dyn MetadataStore>,
        sink: Arc<dyn NotificationSink>,
        topic: impl Into<String>,
        max_latency: Duration,
    ) -> Self {
        let lock = LeaseLock::new(Arc::clone(&store), max_latency);
        Self {
            store,
            sink,
            topic: topic.into(),
            lock,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Announce that `sequence_number` was written to `partition_id`.
    ///
    /// `lease_snapshot` is the lease that was attached to the partition counter when
    /// the sequence number was allocated. Contention is absorbed; only publish or
    /// metadata failures are returned.
    pub async fn notify_for_event(
        &self,
        partition_id: &str,
        sequence_number: u64,
        lease_snapshot: Option<&LeaseRecord>,
    ) -> Result<()> {
        if LeaseLock::is_held(lease_snapshot) {
            NOTIFICATIONS_SUPPRESSED_TOTAL
                .with_label_values(&[partition_id])
                .inc();
            tracing::debug!(
                partition_id = %partition_id,
                sequence_number,
                "Debounce window open, skipping notification"
            );
            return Ok(());
        }

        let key = LeaseKey::partition(partition_id);
        let result = self
            .lock
            .with_lock(&key, || self.notify_and_wait(partition_id, sequence_number))
            .await;

        match result {
            Err(ClientError::LockContention { .. }) => {
                NOTIFICATIONS_SUPPRESSED_TOTAL
                    .with_label_values(&[partition_id])
                    .inc();
                Ok(())
            }
            other => other,
        }
    }

    async fn notify_and_wait(&self, partition_id: &str, sequence_number: u64) -> Result<()> {
        self.publish(partition_id, sequence_number).await?;

        tokio::time::sleep(self.lock.ttl() / 2).await;

        let latest = self
            .store
            .get_partition(partition_id)
            .await?
            .and_then(|record| record.sequence_number.checked_sub(1));

        if let Some(latest) = latest.filter(|latest| *latest > sequence_number) {
            self.publish(partition_id, latest).await?;
        }

        Ok(())
    }

    async fn publish(&self, partition_id: &str, sequence_number: u64) -> Result<()> {
        let message = serde_json::to_string(&Notification {
            partition_id: partition_id.to_string(),
            sequence_number,
        })
        .map_err(|e| ClientError::Internal(e.to_string()))?;

        tracing::debug!(
            topic = %self.topic,
            partition_id = %partition_id,
            sequence_number,
            "Publishing notification"
        );

        self.sink.publish(&self.topic, &message).await?;

        NOTIFICATIONS_PUBLISHED_TOTAL
            .with_label_values(&[partition_id])
            .inc();
        Ok(())
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("topic", &self.topic)
            .field("lock", &self.lock)
            .finish()
    }
}
