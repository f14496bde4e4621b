//! Lease-based mutual exclusion over the metadata store.
//!
//! ## Protocol
//!
//! ```text
//! acquire:  SET lock = {owner_id, now + ttl}
//!           IF lock absent OR lock.expires_at <= now     ── rejected ─▶ LockContention
//!              │
//!              ▼
//! body:     runs while the lease is held
//!              │
//!              ▼
//! release:  CLEAR lock IF lock.owner_id = owner_id       ── rejected ─▶ warn! and move on
//! ```
//!
//! The owner id is generated once per `LeaseLock` instance, so repeated attempts
//! from one instance are told apart from other instances. A body that outlives
//! the TTL lets a second owner in; the TTL is an operational parameter and must
//! exceed the expected duration of the body.

use crate::error::{ClientError, Result};
use blobstream_metadata::{now_ms, LeaseKey, LeaseRecord, MetadataStore};
use blobstream_observability::metrics::LEASE_CONTENTION_TOTAL;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Lease lock bound to one owner id and one TTL.
#[derive(Clone)]
pub struct LeaseLock {
    store: Arc<dyn MetadataStore>,
    owner_id: String,
    ttl: Duration,
}

impl LeaseLock {
    pub fn new(store: Arc<dyn MetadataStore>, ttl: Duration) -> Self {
        Self {
            store,
            owner_id: uuid::Uuid::new_v4().to_string(),
            ttl,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Expiration timestamp for a lease taken or refreshed right now.
    pub fn expires_at_from_now(&self) -> i64 {
        now_ms() + self.ttl_ms()
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    /// Whether a lease snapshot read from the store is still in force.
    pub fn is_held(lease: Option<&LeaseRecord>) -> bool {
        lease.is_some_and(|l| l.is_active_at(now_ms()))
    }

    /// Run `body` while holding the lease on `key`.
    ///
    /// # Errors
    ///
    /// - `LockContention`: another owner holds an unexpired lease; `body` did not run
    /// - any error of `body`, returned after the release attempt
    pub async fn with_lock<F, Fut, T>(&self, key: &LeaseKey, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.acquire(key).await?;

        let result = body().await;

        self.release(key).await;

        result
    }

    async fn acquire(&self, key: &LeaseKey) -> Result<LeaseRecord> {
        let now = now_ms();
        let expires_at = now.saturating_add(self.ttl_ms());

        tracing::debug!(key = %key, owner = %self.short_owner(), "Obtaining lease");

        match self
            .store
            .acquire_lease(key, &self.owner_id, now, expires_at)
            .await
        {
            Ok(lease) => {
                tracing::debug!(
                    key = %key,
                    owner = %self.short_owner(),
                    expires_at,
                    "Obtained lease"
                );
                Ok(lease)
            }
            Err(e) if e.is_condition_failed() => {
                LEASE_CONTENTION_TOTAL
                    .with_label_values(&[key.scope()])
                    .inc();
                tracing::debug!(key = %key, owner = %self.short_owner(), "Lease held by another owner");
                Err(ClientError::LockContention {
                    key: key.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Release failures are logged and swallowed: the lease expires on its own.
    async fn release(&self, key: &LeaseKey) {
        tracing::debug!(key = %key, owner = %self.short_owner(), "Releasing lease");

        if let Err(e) = self.store.release_lease(key, &self.owner_id).await {
            tracing::warn!(
                key = %key,
                owner = %self.short_owner(),
                error = %e,
                "Failed to release lease, it will expire on its own"
            );
        }
    }

    fn short_owner(&self) -> &str {
        self.owner_id.get(..8).unwrap_or(&self.owner_id)
    }
}

impl std::fmt::Debug for LeaseLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseLock")
            .field("owner_id", &self.owner_id)
            .field("ttl", &self.ttl)
            .finish()
    }
}
