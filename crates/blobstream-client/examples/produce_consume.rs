//! Produce/Consume Example
//!
//! Writes a handful of events with a local filesystem event store and a SQLite
//! metadata store, then reads every partition back with a consumer and prints the
//! resulting metrics.
//!
//! Run with:
//! ```bash
//! RUST_LOG=blobstream_client=debug cargo run --package blobstream-client --example produce_consume
//! ```

use blobstream_client::{
    BlobstreamConfig, BroadcastNotificationSink, Consumer, Producer, ReadRequest,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    blobstream_observability::init();

    let temp_dir = tempfile::tempdir()?;
    let events_dir = temp_dir.path().join("events");
    std::fs::create_dir_all(&events_dir)?;

    let config = BlobstreamConfig {
        events_location: Some(format!("file://{}", events_dir.display())),
        metadata_url: temp_dir.path().join("meta.db").display().to_string(),
        events_topic: Some("blobstream-events".to_string()),
        preferred_partition_count: Some(3),
        consumer_name: Some("example".to_string()),
        max_notify_latency_ms: 200,
        ..Default::default()
    };

    let sink = BroadcastNotificationSink::default();
    let mut notifications = sink.subscribe();
    tokio::spawn(async move {
        while let Ok(msg) = notifications.recv().await {
            if let Ok(n) = msg.notification() {
                println!("notified: partition {} advanced to {}", n.partition_id, n.sequence_number);
            }
        }
    });

    let producer = Producer::builder()
        .config(&config)
        .notification_sink(Arc::new(sink))
        .build()
        .await?;

    for i in 0..12 {
        let user = format!("user-{}", i % 4);
        let written = producer
            .write_event(&user, format!(r#"{{"user":"{}","n":{}}}"#, user, i))
            .await?;
        println!(
            "wrote {} -> partition {} @ {}",
            user, written.partition_id, written.sequence_number
        );
    }
    producer.flush_notifications().await;

    let consumer = Consumer::builder().config(&config).build().await?;
    for partition_id in consumer.partition_ids().await? {
        loop {
            let result = consumer
                .read_events(ReadRequest::new(&partition_id).with_count(2), |event| async move {
                    println!(
                        "read partition {} @ {}: {}",
                        event.partition_id,
                        event.sequence_number,
                        String::from_utf8_lossy(&event.data)
                    );
                    Ok::<_, std::io::Error>(())
                })
                .await?;
            if result.done {
                break;
            }
        }
    }

    println!("\n{}", blobstream_observability::metrics::render()?);
    Ok(())
}
