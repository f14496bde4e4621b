//! In-Memory Metadata Store
//!
//! Process-local implementation of [`MetadataStore`]. All tables sit behind one
//! `tokio::sync::RwLock`, and every conditional write is checked and applied under
//! the write guard, which gives the same single-item atomicity the protocol expects
//! from a real key-value store.
//!
//! Used by tests and by single-process deployments that do not need durability.

use crate::{
    error::{MetadataError, Result},
    types::*,
    MetadataStore,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    partitioner: Option<String>,
    partitions: HashMap<String, PartitionItem>,
    consumers: HashMap<(String, String), CheckpointItem>,
}

#[derive(Debug, Default, Clone)]
struct PartitionItem {
    sequence_number: u64,
    lock: Option<LeaseRecord>,
}

#[derive(Debug, Default, Clone)]
struct CheckpointItem {
    sequence_number: u64,
    lock: Option<LeaseRecord>,
}

/// In-memory metadata store
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadataStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shared lease condition: no lease, or a lease no longer active at `now_ms`.
fn lease_available(lock: &Option<LeaseRecord>, now_ms: i64) -> bool {
    match lock {
        None => true,
        Some(lease) => !lease.is_active_at(now_ms),
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get_partitioner(&self) -> Result<Option<String>> {
        Ok(self.tables.read().await.partitioner.clone())
    }

    async fn create_partitioner(&self, serialized: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.partitioner.is_some() {
            return Err(MetadataError::ConditionFailed(format!(
                "{} already exists",
                PARTITIONER_KEY
            )));
        }
        tables.partitioner = Some(serialized.to_string());
        Ok(())
    }

    async fn get_partition(&self, partition_id: &str) -> Result<Option<PartitionRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .partitions
            .get(partition_id)
            .map(|item| PartitionRecord {
                partition_id: partition_id.to_string(),
                sequence_number: item.sequence_number,
                lock: item.lock.clone(),
            }))
    }

    async fn increment_sequence_number(&self, partition_id: &str) -> Result<PartitionRecord> {
        let mut tables = self.tables.write().await;
        let item = tables
            .partitions
            .entry(partition_id.to_string())
            .or_default();
        item.sequence_number += 1;

        Ok(PartitionRecord {
            partition_id: partition_id.to_string(),
            sequence_number: item.sequence_number,
            lock: item.lock.clone(),
        })
    }

    async fn acquire_lease(
        &self,
        key: &LeaseKey,
        owner_id: &str,
        now_ms: i64,
        expires_at: i64,
    ) -> Result<LeaseRecord> {
        let mut tables = self.tables.write().await;
        let lease = LeaseRecord {
            owner_id: owner_id.to_string(),
            expires_at,
        };

        let lock = match key {
            LeaseKey::Partition { partition_id } => {
                &mut tables
                    .partitions
                    .entry(partition_id.clone())
                    .or_default()
                    .lock
            }
            LeaseKey::Consumer {
                consumer_name,
                partition_id,
            } => {
                &mut tables
                    .consumers
                    .entry((consumer_name.clone(), partition_id.clone()))
                    .or_default()
                    .lock
            }
        };

        if !lease_available(lock, now_ms) {
            return Err(MetadataError::ConditionFailed(format!(
                "lease on {} is held",
                key
            )));
        }

        *lock = Some(lease.clone());
        Ok(lease)
    }

    async fn release_lease(&self, key: &LeaseKey, owner_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;

        let lock = match key {
            LeaseKey::Partition { partition_id } => tables
                .partitions
                .get_mut(partition_id)
                .map(|item| &mut item.lock),
            LeaseKey::Consumer {
                consumer_name,
                partition_id,
            } => tables
                .consumers
                .get_mut(&(consumer_name.clone(), partition_id.clone()))
                .map(|item| &mut item.lock),
        };

        match lock {
            Some(lock) if lock.as_ref().is_some_and(|l| l.owner_id == owner_id) => {
                *lock = None;
                Ok(())
            }
            _ => Err(MetadataError::ConditionFailed(format!(
                "lease on {} is not owned by {}",
                key, owner_id
            ))),
        }
    }

    async fn get_checkpoint(
        &self,
        consumer_name: &str,
        partition_id: &str,
    ) -> Result<Option<ConsumerCheckpoint>> {
        let tables = self.tables.read().await;
        Ok(tables
            .consumers
            .get(&(consumer_name.to_string(), partition_id.to_string()))
            .map(|item| ConsumerCheckpoint {
                consumer_name: consumer_name.to_string(),
                partition_id: partition_id.to_string(),
                sequence_number: item.sequence_number,
                lock: item.lock.clone(),
            }))
    }

    async fn commit_checkpoint(
        &self,
        consumer_name: &str,
        partition_id: &str,
        sequence_number: u64,
        owner_id: &str,
        lease_expires_at: i64,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let item = tables
            .consumers
            .get_mut(&(consumer_name.to_string(), partition_id.to_string()));

        match item {
            Some(item) if item.lock.as_ref().is_some_and(|l| l.owner_id == owner_id) => {
                item.sequence_number = sequence_number;
                item.lock = Some(LeaseRecord {
                    owner_id: owner_id.to_string(),
                    expires_at: lease_expires_at,
                });
                Ok(())
            }
            _ => Err(MetadataError::ConditionFailed(format!(
                "checkpoint {}/{} is not leased to {}",
                consumer_name, partition_id, owner_id
            ))),
        }
    }
}
