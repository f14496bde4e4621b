//! SQLite Metadata Store Implementation
//!
//! This module implements the MetadataStore trait using SQLite as the backend.
//!
//! ## What Does This Do?
//!
//! SqliteMetadataStore keeps the coordination items durable:
//! - The partitioner record (reserved row of the partitions table)
//! - Partition sequence counters and notification leases
//! - Consumer checkpoints and batch leases
//!
//! ## Usage
//!
//! ### File-Based
//! ```ignore
//! use blobstream_metadata::{SqliteMetadataStore, MetadataStore};
//!
//! // Creates metadata.db file (or opens if exists)
//! let store = SqliteMetadataStore::new("metadata.db").await?;
//! ```
//!
//! ### In-Memory (Testing)
//! ```ignore
//! let store = SqliteMetadataStore::new_in_memory().await?;
//! ```
//!
//! ## Implementation Details
//!
//! ### Conditional Writes
//! Every conditional primitive is a single statement, so SQLite's per-statement
//! atomicity is the only isolation we rely on:
//! - put-if-absent: `INSERT .. ON CONFLICT DO NOTHING`, success iff one row changed
//! - lease acquire: `INSERT .. ON CONFLICT DO UPDATE .. WHERE <lease free or expired>`
//! - lease release / checkpoint commit: `UPDATE .. WHERE lock_owner_id = ?`
//! - increment: `INSERT .. ON CONFLICT DO UPDATE SET n = n + 1 RETURNING ..`
//!
//! ### Connection Pool
//! - File databases: 10 connections, WAL journal, 5s busy timeout so concurrent
//!   writers queue instead of failing with SQLITE_BUSY
//! - In-memory databases: one connection that is never recycled (each SQLite
//!   connection would otherwise see its own empty database)
//!
//! ### Table Names
//! Table names come from configuration and are interpolated into SQL, so they are
//! validated as plain identifiers first.

use crate::{
    error::{MetadataError, Result},
    types::*,
    MetadataStore,
};
use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLite-based metadata store implementation
pub struct SqliteMetadataStore {
    pool: SqlitePool,
    partitions_table: String,
    consumers_table: String,
}

impl SqliteMetadataStore {
    /// Create a new SQLite metadata store with the default table names
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let url = path.as_ref().display().to_string();
        Self::with_tables(&url, TableConfig::default()).await
    }

    /// Create a SQLite metadata store at `url` (a path or a `sqlite:` URL) using
    /// the given table names
    pub async fn with_tables(url: &str, tables: TableConfig) -> Result<Self> {
        validate_identifier(&tables.partitions_table)?;
        validate_identifier(&tables.consumers_table)?;

        let url = if url.starts_with("sqlite:") {
            url.to_string()
        } else {
            format!("sqlite://{}", url)
        };

        let options = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        Self::from_pool(pool, tables).await
    }

    /// Create in-memory database (for testing)
    pub async fn new_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool, TableConfig::default()).await
    }

    async fn from_pool(pool: SqlitePool, tables: TableConfig) -> Result<Self> {
        let store = Self {
            pool,
            partitions_table: tables.partitions_table,
            consumers_table: tables.consumers_table,
        };
        store.create_schema().await?;
        Ok(store)
    }

    async fn create_schema(&self) -> Result<()> {
        let partitions = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                partition_id TEXT PRIMARY KEY NOT NULL,
                sequence_number INTEGER NOT NULL DEFAULT 0,
                partitioner TEXT,
                lock_owner_id TEXT,
                lock_expires_at INTEGER
            )",
            self.partitions_table
        );
        sqlx::query(&partitions).execute(&self.pool).await?;

        let consumers = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                consumer_name TEXT NOT NULL,
                partition_id TEXT NOT NULL,
                sequence_number INTEGER NOT NULL DEFAULT 0,
                lock_owner_id TEXT,
                lock_expires_at INTEGER,
                PRIMARY KEY (consumer_name, partition_id)
            )",
            self.consumers_table
        );
        sqlx::query(&consumers).execute(&self.pool).await?;

        Ok(())
    }
}

/// Accept only `[A-Za-z_][A-Za-z0-9_]*`.
fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(MetadataError::InvalidIdentifier(name.to_string()))
    }
}

fn lease_from_row(row: &SqliteRow) -> Result<Option<LeaseRecord>> {
    let owner_id: Option<String> = row.try_get("lock_owner_id")?;
    let expires_at: Option<i64> = row.try_get("lock_expires_at")?;

    Ok(match (owner_id, expires_at) {
        (Some(owner_id), Some(expires_at)) => Some(LeaseRecord {
            owner_id,
            expires_at,
        }),
        _ => None,
    })
}

fn sequence_from_row(row: &SqliteRow) -> Result<u64> {
    let value: i64 = row.try_get("sequence_number")?;
    Ok(value.max(0) as u64)
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get_partitioner(&self) -> Result<Option<String>> {
        let sql = format!(
            "SELECT partitioner FROM {} WHERE partition_id = ?",
            self.partitions_table
        );
        let row = sqlx::query(&sql)
            .bind(PARTITIONER_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get::<Option<String>, _>("partitioner")?),
            None => Ok(None),
        }
    }

    async fn create_partitioner(&self, serialized: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (partition_id, partitioner) VALUES (?, ?)
             ON CONFLICT(partition_id) DO NOTHING",
            self.partitions_table
        );
        let result = sqlx::query(&sql)
            .bind(PARTITIONER_KEY)
            .bind(serialized)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::ConditionFailed(format!(
                "{} already exists",
                PARTITIONER_KEY
            )));
        }

        Ok(())
    }

    async fn get_partition(&self, partition_id: &str) -> Result<Option<PartitionRecord>> {
        let sql = format!(
            "SELECT sequence_number, lock_owner_id, lock_expires_at FROM {} WHERE partition_id = ?",
            self.partitions_table
        );
        let row = sqlx::query(&sql)
            .bind(partition_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(PartitionRecord {
                partition_id: partition_id.to_string(),
                sequence_number: sequence_from_row(&row)?,
                lock: lease_from_row(&row)?,
            })),
            None => Ok(None),
        }
    }

    async fn increment_sequence_number(&self, partition_id: &str) -> Result<PartitionRecord> {
        let sql = format!(
            "INSERT INTO {} (partition_id, sequence_number) VALUES (?, 1)
             ON CONFLICT(partition_id) DO UPDATE SET sequence_number = sequence_number + 1
             RETURNING sequence_number, lock_owner_id, lock_expires_at",
            self.partitions_table
        );
        let row = sqlx::query(&sql)
            .bind(partition_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(PartitionRecord {
            partition_id: partition_id.to_string(),
            sequence_number: sequence_from_row(&row)?,
            lock: lease_from_row(&row)?,
        })
    }

    async fn acquire_lease(
        &self,
        key: &LeaseKey,
        owner_id: &str,
        now_ms: i64,
        expires_at: i64,
    ) -> Result<LeaseRecord> {
        let result = match key {
            LeaseKey::Partition { partition_id } => {
                let sql = format!(
                    "INSERT INTO {t} (partition_id, lock_owner_id, lock_expires_at) VALUES (?, ?, ?)
                     ON CONFLICT(partition_id) DO UPDATE SET
                         lock_owner_id = excluded.lock_owner_id,
                         lock_expires_at = excluded.lock_expires_at
                     WHERE {t}.lock_owner_id IS NULL OR {t}.lock_expires_at <= ?",
                    t = self.partitions_table
                );
                sqlx::query(&sql)
                    .bind(partition_id)
                    .bind(owner_id)
                    .bind(expires_at)
                    .bind(now_ms)
                    .execute(&self.pool)
                    .await?
            }
            LeaseKey::Consumer {
                consumer_name,
                partition_id,
            } => {
                let sql = format!(
                    "INSERT INTO {t} (consumer_name, partition_id, lock_owner_id, lock_expires_at)
                     VALUES (?, ?, ?, ?)
                     ON CONFLICT(consumer_name, partition_id) DO UPDATE SET
                         lock_owner_id = excluded.lock_owner_id,
                         lock_expires_at = excluded.lock_expires_at
                     WHERE {t}.lock_owner_id IS NULL OR {t}.lock_expires_at <= ?",
                    t = self.consumers_table
                );
                sqlx::query(&sql)
                    .bind(consumer_name)
                    .bind(partition_id)
                    .bind(owner_id)
                    .bind(expires_at)
                    .bind(now_ms)
                    .execute(&self.pool)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(MetadataError::ConditionFailed(format!(
                "lease on {} is held",
                key
            )));
        }

        Ok(LeaseRecord {
            owner_id: owner_id.to_string(),
            expires_at,
        })
    }

    async fn release_lease(&self, key: &LeaseKey, owner_id: &str) -> Result<()> {
        let result = match key {
            LeaseKey::Partition { partition_id } => {
                let sql = format!(
                    "UPDATE {} SET lock_owner_id = NULL, lock_expires_at = NULL
                     WHERE partition_id = ? AND lock_owner_id = ?",
                    self.partitions_table
                );
                sqlx::query(&sql)
                    .bind(partition_id)
                    .bind(owner_id)
                    .execute(&self.pool)
                    .await?
            }
            LeaseKey::Consumer {
                consumer_name,
                partition_id,
            } => {
                let sql = format!(
                    "UPDATE {} SET lock_owner_id = NULL, lock_expires_at = NULL
                     WHERE consumer_name = ? AND partition_id = ? AND lock_owner_id = ?",
                    self.consumers_table
                );
                sqlx::query(&sql)
                    .bind(consumer_name)
                    .bind(partition_id)
                    .bind(owner_id)
                    .execute(&self.pool)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(MetadataError::ConditionFailed(format!(
                "lease on {} is not owned by {}",
                key, owner_id
            )));
        }

        Ok(())
    }

    async fn get_checkpoint(
        &self,
        consumer_name: &str,
        partition_id: &str,
    ) -> Result<Option<ConsumerCheckpoint>> {
        let sql = format!(
            "SELECT sequence_number, lock_owner_id, lock_expires_at FROM {}
             WHERE consumer_name = ? AND partition_id = ?",
            self.consumers_table
        );
        let row = sqlx::query(&sql)
            .bind(consumer_name)
            .bind(partition_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(ConsumerCheckpoint {
                consumer_name: consumer_name.to_string(),
                partition_id: partition_id.to_string(),
                sequence_number: sequence_from_row(&row)?,
                lock: lease_from_row(&row)?,
            })),
            None => Ok(None),
        }
    }

    async fn commit_checkpoint(
        &self,
        consumer_name: &str,
        partition_id: &str,
        sequence_number: u64,
        owner_id: &str,
        lease_expires_at: i64,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET sequence_number = ?, lock_expires_at = ?
             WHERE consumer_name = ? AND partition_id = ? AND lock_owner_id = ?",
            self.consumers_table
        );
        let result = sqlx::query(&sql)
            .bind(sequence_number as i64)
            .bind(lease_expires_at)
            .bind(consumer_name)
            .bind(partition_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::ConditionFailed(format!(
                "checkpoint {}/{} is not leased to {}",
                consumer_name, partition_id, owner_id
            )));
        }

        Ok(())
    }
}
