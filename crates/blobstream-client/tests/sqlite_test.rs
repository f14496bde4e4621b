//! SQLite Metadata Integration Tests
//!
//! The same protocol against a file-backed SQLite metadata store, including
//! state surviving a reopen of the database.

mod common;

use blobstream_client::{
    BlobstreamConfig, Consumer, MetadataStore, Partitioner, Producer, SqliteMetadataStore,
};
use common::{drain, read_batch, Deployment};
use std::sync::Arc;

async fn sqlite_deployment(path: &std::path::Path) -> Deployment {
    let store = SqliteMetadataStore::new(path).await.unwrap();
    Deployment::with_metadata(Arc::new(store) as Arc<dyn MetadataStore>)
}

#[tokio::test]
async fn test_round_trip_with_gap_on_sqlite() {
    let temp_dir = tempfile::tempdir().unwrap();
    let deployment = sqlite_deployment(&temp_dir.path().join("roundtrip.db")).await;
    let producer = deployment.producer().await;

    producer.write_event("k", "one").await.unwrap();
    deployment.flaky.fail_next_puts(1);
    assert!(producer.write_event("k", "lost").await.is_err());
    producer.write_event("k", "three").await.unwrap();

    let consumer = deployment.consumer("sqlite").await;
    let (result, events) = read_batch(&consumer, "0", 20).await;
    assert!(result.done);
    assert_eq!(result.events_read, 2);
    assert_eq!(result.gaps_skipped, 1);
    assert_eq!(events[0].data.as_ref(), b"one");
    assert_eq!(events[1].data.as_ref(), b"three");
}

#[tokio::test]
async fn test_concurrent_readers_on_sqlite() {
    let temp_dir = tempfile::tempdir().unwrap();
    let deployment = sqlite_deployment(&temp_dir.path().join("readers.db")).await;
    let producer = deployment.producer().await;
    for i in 0..10 {
        producer.write_event("k", format!("e{}", i)).await.unwrap();
    }

    let first = deployment.consumer("shared").await;
    let second = deployment.consumer("shared").await;
    let (a, b) = tokio::join!(drain(&first, "0", 4), drain(&second, "0", 4));

    let mut offsets: Vec<u64> = a.iter().chain(b.iter()).map(|e| e.sequence_number).collect();
    let straggler = deployment.consumer("shared").await;
    offsets.extend(drain(&straggler, "0", 20).await.iter().map(|e| e.sequence_number));

    offsets.sort_unstable();
    assert_eq!(offsets, (0..10).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("reopen.db");
    let events_dir = temp_dir.path().join("events");
    std::fs::create_dir_all(&events_dir).unwrap();

    let config = BlobstreamConfig {
        events_location: Some(format!("file://{}", events_dir.display())),
        metadata_url: db_path.display().to_string(),
        preferred_partition_count: Some(2),
        consumer_name: Some("durable".to_string()),
        ..Default::default()
    };

    let partition_id = {
        let producer = Producer::builder().config(&config).build().await.unwrap();
        let written = producer.write_event("k", "persisted").await.unwrap();

        let consumer = Consumer::builder().config(&config).build().await.unwrap();
        assert_eq!(consumer.get_sequence_number(&written.partition_id).await.unwrap(), 0);
        written.partition_id
    };

    // Everything below reads state written by the instances above
    let producer = Producer::builder().config(&config).build().await.unwrap();
    let partitioner = producer.get_partitioner(false).await.unwrap();
    assert!(partitioner.is_equivalent_to(&Partitioner::with_partition_count(2).unwrap()));
    assert_eq!(producer.get_sequence_number(&partition_id).await.unwrap(), Some(1));

    let consumer = Consumer::builder().config(&config).build().await.unwrap();
    let events = drain(&consumer, &partition_id, 20).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data.as_ref(), b"persisted");

    let reopened = Consumer::builder().config(&config).build().await.unwrap();
    assert_eq!(reopened.get_sequence_number(&partition_id).await.unwrap(), 1);
}
