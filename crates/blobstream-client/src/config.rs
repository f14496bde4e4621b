//! Client configuration.
//!
//! One configuration object describes a Blobstream deployment and is shared by
//! producers and consumers. It can be passed around as a JSON string:
//!
//! ```text
//! {
//!   "eventsLocation": "s3://my-bucket/events-root",
//!   "metadataUrl": "sqlite:///var/lib/blobstream/meta.db",
//!   "partitionsTable": "blobstream_partitions",
//!   "consumersTable": "blobstream_consumers",
//!   "eventsTopic": "blobstream-events",
//!   "preferredPartitionCount": 4,
//!   "consumerName": "analytics",
//!   "maxNotifyLatencyMs": 1000,
//!   "lastActiveExpirationMs": 5000,
//!   "batchSize": 20
//! }
//! ```
//!
//! or through `BLOBSTREAM_*` environment variables (see [`BlobstreamConfig::from_env`]).

use crate::error::{ClientError, Result};
use crate::partitioner::Partitioner;
use blobstream_metadata::{TableConfig, DEFAULT_CONSUMERS_TABLE, DEFAULT_PARTITIONS_TABLE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobstreamConfig {
    /// Event storage location (`memory:///`, `file:///…`, `s3://bucket/prefix`)
    #[serde(default)]
    pub events_location: Option<String>,

    /// Metadata store URL (`memory://` or a SQLite path/URL)
    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,

    #[serde(default = "default_partitions_table")]
    pub partitions_table: String,

    #[serde(default = "default_consumers_table")]
    pub consumers_table: String,

    /// Topic that write notifications are published on
    #[serde(default)]
    pub events_topic: Option<String>,

    /// Partition count installed when no partitioner exists yet
    #[serde(default)]
    pub preferred_partition_count: Option<u32>,

    /// Checkpoint lineage; required by consumers
    #[serde(default)]
    pub consumer_name: Option<String>,

    /// Notification lease TTL, upper bound on notification latency
    #[serde(default = "default_max_notify_latency_ms")]
    pub max_notify_latency_ms: u64,

    /// Consumer batch lease TTL
    #[serde(default = "default_last_active_expiration_ms")]
    pub last_active_expiration_ms: u64,

    /// Events read per `read_events` call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Attempts at resolving the partitioner when producers race to create it
    #[serde(default = "default_partitioner_init_retries")]
    pub partitioner_init_retries: usize,
}

fn default_metadata_url() -> String {
    "memory://".to_string()
}

fn default_partitions_table() -> String {
    DEFAULT_PARTITIONS_TABLE.to_string()
}

fn default_consumers_table() -> String {
    DEFAULT_CONSUMERS_TABLE.to_string()
}

fn default_max_notify_latency_ms() -> u64 {
    1000
}

fn default_last_active_expiration_ms() -> u64 {
    5000
}

fn default_batch_size() -> usize {
    20
}

fn default_partitioner_init_retries() -> usize {
    10
}

impl Default for BlobstreamConfig {
    fn default() -> Self {
        Self {
            events_location: None,
            metadata_url: default_metadata_url(),
            partitions_table: default_partitions_table(),
            consumers_table: default_consumers_table(),
            events_topic: None,
            preferred_partition_count: None,
            consumer_name: None,
            max_notify_latency_ms: default_max_notify_latency_ms(),
            last_active_expiration_ms: default_last_active_expiration_ms(),
            batch_size: default_batch_size(),
            partitioner_init_retries: default_partitioner_init_retries(),
        }
    }
}

impl BlobstreamConfig {
    /// Parse the JSON string form. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ClientError::ConfigError(format!("Invalid configuration: {}", e)))
    }

    /// Load from environment variables
    ///
    /// - `BLOBSTREAM_EVENTS_LOCATION`
    /// - `BLOBSTREAM_METADATA_URL`
    /// - `BLOBSTREAM_PARTITIONS_TABLE`
    /// - `BLOBSTREAM_CONSUMERS_TABLE`
    /// - `BLOBSTREAM_EVENTS_TOPIC`
    /// - `BLOBSTREAM_PREFERRED_PARTITION_COUNT`
    /// - `BLOBSTREAM_CONSUMER_NAME`
    /// - `BLOBSTREAM_MAX_NOTIFY_LATENCY_MS`
    /// - `BLOBSTREAM_LAST_ACTIVE_EXPIRATION_MS`
    /// - `BLOBSTREAM_BATCH_SIZE`
    /// - `BLOBSTREAM_PARTITIONER_INIT_RETRIES`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("BLOBSTREAM_EVENTS_LOCATION") {
            config.events_location = Some(v);
        }
        if let Some(v) = lookup("BLOBSTREAM_METADATA_URL") {
            config.metadata_url = v;
        }
        if let Some(v) = lookup("BLOBSTREAM_PARTITIONS_TABLE") {
            config.partitions_table = v;
        }
        if let Some(v) = lookup("BLOBSTREAM_CONSUMERS_TABLE") {
            config.consumers_table = v;
        }
        if let Some(v) = lookup("BLOBSTREAM_EVENTS_TOPIC") {
            config.events_topic = Some(v);
        }
        if let Some(v) = lookup("BLOBSTREAM_PREFERRED_PARTITION_COUNT") {
            config.preferred_partition_count =
                Some(parse_number("BLOBSTREAM_PREFERRED_PARTITION_COUNT", &v)?);
        }
        if let Some(v) = lookup("BLOBSTREAM_CONSUMER_NAME") {
            config.consumer_name = Some(v);
        }
        if let Some(v) = lookup("BLOBSTREAM_MAX_NOTIFY_LATENCY_MS") {
            config.max_notify_latency_ms = parse_number("BLOBSTREAM_MAX_NOTIFY_LATENCY_MS", &v)?;
        }
        if let Some(v) = lookup("BLOBSTREAM_LAST_ACTIVE_EXPIRATION_MS") {
            config.last_active_expiration_ms =
                parse_number("BLOBSTREAM_LAST_ACTIVE_EXPIRATION_MS", &v)?;
        }
        if let Some(v) = lookup("BLOBSTREAM_BATCH_SIZE") {
            config.batch_size = parse_number("BLOBSTREAM_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("BLOBSTREAM_PARTITIONER_INIT_RETRIES") {
            config.partitioner_init_retries =
                parse_number("BLOBSTREAM_PARTITIONER_INIT_RETRIES", &v)?;
        }

        Ok(config)
    }

    pub fn tables(&self) -> TableConfig {
        TableConfig {
            partitions_table: self.partitions_table.clone(),
            consumers_table: self.consumers_table.clone(),
        }
    }

    pub fn max_notify_latency(&self) -> Duration {
        Duration::from_millis(self.max_notify_latency_ms)
    }

    pub fn last_active_expiration(&self) -> Duration {
        Duration::from_millis(self.last_active_expiration_ms)
    }

    /// Partitioner to install on first use, if a partition count was configured.
    pub fn preferred_partitioner(&self) -> Result<Option<Partitioner>> {
        self.preferred_partition_count
            .map(Partitioner::with_partition_count)
            .transpose()
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ClientError::ConfigError(format!("{} = {:?}: {}", name, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = BlobstreamConfig::default();
        assert_eq!(config.metadata_url, "memory://");
        assert_eq!(config.partitions_table, "blobstream_partitions");
        assert_eq!(config.consumers_table, "blobstream_consumers");
        assert_eq!(config.max_notify_latency(), Duration::from_millis(1000));
        assert_eq!(config.last_active_expiration(), Duration::from_millis(5000));
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.partitioner_init_retries, 10);
        assert!(config.preferred_partitioner().unwrap().is_none());
    }

    #[test]
    fn test_from_json_camel_case() {
        let config = BlobstreamConfig::from_json(
            r#"{
                "eventsLocation": "memory:///",
                "eventsTopic": "events",
                "preferredPartitionCount": 4,
                "consumerName": "analytics",
                "batchSize": 60
            }"#,
        )
        .unwrap();

        assert_eq!(config.events_location.as_deref(), Some("memory:///"));
        assert_eq!(config.events_topic.as_deref(), Some("events"));
        assert_eq!(config.consumer_name.as_deref(), Some("analytics"));
        assert_eq!(config.batch_size, 60);
        assert_eq!(config.max_notify_latency_ms, 1000);

        let partitioner = config.preferred_partitioner().unwrap().unwrap();
        assert_eq!(partitioner.partition_count(), 4);
    }

    #[test]
    fn test_from_json_empty_object() {
        let config = BlobstreamConfig::from_json("{}").unwrap();
        assert_eq!(config, BlobstreamConfig::default());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = BlobstreamConfig::from_json("{").unwrap_err();
        assert!(matches!(err, ClientError::ConfigError(_)));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("BLOBSTREAM_EVENTS_LOCATION", "file:///tmp/events"),
            ("BLOBSTREAM_CONSUMER_NAME", "billing"),
            ("BLOBSTREAM_BATCH_SIZE", " 5 "),
            ("BLOBSTREAM_LAST_ACTIVE_EXPIRATION_MS", "250"),
        ]
        .into_iter()
        .collect();

        let config =
            BlobstreamConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.events_location.as_deref(), Some("file:///tmp/events"));
        assert_eq!(config.consumer_name.as_deref(), Some("billing"));
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.last_active_expiration(), Duration::from_millis(250));
        assert_eq!(config.metadata_url, "memory://");
    }

    #[test]
    fn test_from_lookup_rejects_bad_number() {
        let err = BlobstreamConfig::from_lookup(|name| {
            (name == "BLOBSTREAM_BATCH_SIZE").then(|| "many".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("BLOBSTREAM_BATCH_SIZE"));
    }

    #[test]
    fn test_zero_partition_count_is_config_error() {
        let config = BlobstreamConfig {
            preferred_partition_count: Some(0),
            ..Default::default()
        };
        assert!(config.preferred_partitioner().is_err());
    }
}
