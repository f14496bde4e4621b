//! Metadata Type Definitions
//!
//! This module defines the items kept in the metadata store.
//!
//! ## Types Overview
//!
//! ### PartitionRecord
//! One item per partition id in the partitions table. Holds the partition's
//! sequence counter (the number of sequence numbers ever allocated) and the
//! notification lease, when a debounce window is open.
//!
//! ### ConsumerCheckpoint
//! One item per (consumer name, partition id) in the consumers table. Holds the
//! next offset to read and the consumer batch lease.
//!
//! ### LeaseRecord
//! `{owner_id, expires_at}` sub-record attached to either item kind.
//!
//! ### LeaseKey
//! Addresses the item a lease lives on.
//!
//! ## Design Decisions
//!
//! - Timestamps are i64 (milliseconds since epoch) for simplicity
//! - Sequence numbers are u64; the counter starts at 0 and is only ever incremented
//! - The partitioner record shares the partitions table under a reserved key

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved partitions-table key under which the serialized partitioner lives.
pub const PARTITIONER_KEY: &str = "meta_partitioner";

/// Default partitions table name.
pub const DEFAULT_PARTITIONS_TABLE: &str = "blobstream_partitions";

/// Default consumers table name.
pub const DEFAULT_CONSUMERS_TABLE: &str = "blobstream_consumers";

/// Ownership-tagged, time-bounded lease attached to a metadata item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRecord {
    /// Random token identifying the owning instance
    pub owner_id: String,

    /// Lease expiration timestamp (milliseconds since Unix epoch)
    pub expires_at: i64,
}

impl LeaseRecord {
    /// Whether the lease is still in force at `now_ms`.
    pub fn is_active_at(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms
    }
}

/// Sequence counter item for one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionRecord {
    /// Partition ID (decimal string)
    pub partition_id: String,

    /// Number of sequence numbers allocated so far; the next allocation returns this value
    pub sequence_number: u64,

    /// Notification lease, present only while a debounce window is open
    pub lock: Option<LeaseRecord>,
}

/// Checkpoint + batch lease for one (consumer name, partition) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerCheckpoint {
    /// Consumer name (identifies the checkpoint lineage)
    pub consumer_name: String,

    /// Partition ID
    pub partition_id: String,

    /// Offset of the next event to read
    pub sequence_number: u64,

    /// Batch lease, present while a reader holds (or abandoned) it
    pub lock: Option<LeaseRecord>,
}

/// Address of a leasable metadata item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LeaseKey {
    /// Item in the partitions table (notification debouncing)
    Partition { partition_id: String },

    /// Item in the consumers table (batch reads)
    Consumer {
        consumer_name: String,
        partition_id: String,
    },
}

impl LeaseKey {
    pub fn partition(partition_id: impl Into<String>) -> Self {
        LeaseKey::Partition {
            partition_id: partition_id.into(),
        }
    }

    pub fn consumer(consumer_name: impl Into<String>, partition_id: impl Into<String>) -> Self {
        LeaseKey::Consumer {
            consumer_name: consumer_name.into(),
            partition_id: partition_id.into(),
        }
    }

    /// Short label used for metrics.
    pub fn scope(&self) -> &'static str {
        match self {
            LeaseKey::Partition { .. } => "partition",
            LeaseKey::Consumer { .. } => "consumer",
        }
    }
}

impl fmt::Display for LeaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseKey::Partition { partition_id } => write!(f, "partition/{}", partition_id),
            LeaseKey::Consumer {
                consumer_name,
                partition_id,
            } => write!(f, "consumer/{}/{}", consumer_name, partition_id),
        }
    }
}

/// Names of the two tables the store operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    pub partitions_table: String,
    pub consumers_table: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            partitions_table: DEFAULT_PARTITIONS_TABLE.to_string(),
            consumers_table: DEFAULT_CONSUMERS_TABLE.to_string(),
        }
    }
}

/// Current time in milliseconds since Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
