//! Shared fixtures for client integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use blobstream_client::{
    BlobStore, ClientError, ConsumedEvent, Consumer, MetadataStore, Notification,
    NotificationSink, ObjectBlobStore, Producer, ReadRequest, ReadResult, StorageError,
};
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Blob store that fails the next N puts, then delegates.
pub struct FlakyBlobStore {
    inner: Arc<dyn BlobStore>,
    failing_puts: AtomicUsize,
}

impl FlakyBlobStore {
    pub fn new(inner: Arc<dyn BlobStore>) -> Self {
        Self {
            inner,
            failing_puts: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_puts(&self, n: usize) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> blobstream_storage::Result<()> {
        let should_fail = self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StorageError::InvalidLocation(format!(
                "injected put failure for {}",
                key
            )));
        }
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> blobstream_storage::Result<Bytes> {
        self.inner.get(key).await
    }

    async fn list(&self, prefix: &str) -> blobstream_storage::Result<Vec<String>> {
        self.inner.list(prefix).await
    }
}

/// Notification sink that records every publish.
#[derive(Default)]
pub struct CountingSink {
    published: Mutex<Vec<Notification>>,
    count: AtomicUsize,
}

impl CountingSink {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub async fn published(&self) -> Vec<Notification> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for CountingSink {
    async fn publish(&self, _topic: &str, message: &str) -> blobstream_client::Result<()> {
        let notification: Notification = serde_json::from_str(message)
            .map_err(|e| ClientError::NotificationError(e.to_string()))?;
        self.published.lock().await.push(notification);
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Stores shared by every producer and consumer of one test.
pub struct Deployment {
    pub metadata: Arc<dyn MetadataStore>,
    pub flaky: Arc<FlakyBlobStore>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Deployment {
    pub fn in_memory() -> Self {
        Self::with_metadata(Arc::new(blobstream_client::InMemoryMetadataStore::new()))
    }

    pub fn with_metadata(metadata: Arc<dyn MetadataStore>) -> Self {
        let flaky = Arc::new(FlakyBlobStore::new(Arc::new(ObjectBlobStore::in_memory())));
        let blobs: Arc<dyn BlobStore> = flaky.clone();
        Self {
            metadata,
            flaky,
            blobs,
        }
    }

    pub async fn producer(&self) -> Producer {
        Producer::builder()
            .metadata_store(Arc::clone(&self.metadata))
            .blob_store(Arc::clone(&self.blobs))
            .build()
            .await
            .unwrap()
    }

    pub async fn notifying_producer(
        &self,
        sink: Arc<CountingSink>,
        max_latency: Duration,
    ) -> Producer {
        Producer::builder()
            .metadata_store(Arc::clone(&self.metadata))
            .blob_store(Arc::clone(&self.blobs))
            .notification_sink(sink)
            .events_topic("events")
            .max_notify_latency(max_latency)
            .build()
            .await
            .unwrap()
    }

    pub async fn consumer(&self, name: &str) -> Consumer {
        Consumer::builder()
            .metadata_store(Arc::clone(&self.metadata))
            .blob_store(Arc::clone(&self.blobs))
            .consumer_name(name)
            .build()
            .await
            .unwrap()
    }
}

/// Read one batch, collecting delivered events.
pub async fn read_batch(
    consumer: &Consumer,
    partition_id: &str,
    count: usize,
) -> (ReadResult, Vec<ConsumedEvent>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let result = consumer
        .read_events(
            ReadRequest::new(partition_id).with_count(count),
            move |event| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().await.push(event);
                    Ok::<_, ClientError>(())
                }
            },
        )
        .await
        .unwrap();
    let events = seen.lock().await.clone();
    (result, events)
}

/// Read until `done`, collecting every delivered event.
pub async fn drain(consumer: &Consumer, partition_id: &str, count: usize) -> Vec<ConsumedEvent> {
    let mut all = Vec::new();
    loop {
        let (result, events) = read_batch(consumer, partition_id, count).await;
        all.extend(events);
        if result.done {
            return all;
        }
    }
}
