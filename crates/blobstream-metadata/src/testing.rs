//! Behavioural checks shared by every `MetadataStore` implementation's tests.

use crate::{types::*, MetadataError, MetadataStore};
use std::collections::HashSet;
use std::sync::Arc;

pub(crate) async fn partitioner_put_if_absent(store: &dyn MetadataStore) {
    assert!(store.get_partitioner().await.unwrap().is_none());

    store.create_partitioner("first").await.unwrap();
    let err = store.create_partitioner("second").await.unwrap_err();
    assert!(err.is_condition_failed());

    assert_eq!(store.get_partitioner().await.unwrap().as_deref(), Some("first"));
}

pub(crate) async fn increment_is_gap_free(store: &dyn MetadataStore) {
    assert!(store.get_partition("0").await.unwrap().is_none());

    for expected in 1..=5u64 {
        let record = store.increment_sequence_number("0").await.unwrap();
        assert_eq!(record.sequence_number, expected);
        assert_eq!(record.partition_id, "0");
    }

    // Other partitions count independently
    let record = store.increment_sequence_number("1").await.unwrap();
    assert_eq!(record.sequence_number, 1);

    let record = store.get_partition("0").await.unwrap().unwrap();
    assert_eq!(record.sequence_number, 5);
}

pub(crate) async fn concurrent_increments_are_unique<S>(store: Arc<S>)
where
    S: MetadataStore + 'static,
{
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let mut allocated = Vec::new();
            for _ in 0..10 {
                let record = store.increment_sequence_number("hot").await.unwrap();
                allocated.push(record.sequence_number - 1);
            }
            allocated
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for sequence_number in handle.await.unwrap() {
            assert!(seen.insert(sequence_number), "duplicate {}", sequence_number);
        }
    }

    assert_eq!(seen.len(), 80);
    assert_eq!(seen.iter().max(), Some(&79));
}

pub(crate) async fn lease_exclusion_and_expiry(store: &dyn MetadataStore) {
    let key = LeaseKey::consumer("group", "0");

    let lease = store.acquire_lease(&key, "a", 1_000, 2_000).await.unwrap();
    assert_eq!(lease.owner_id, "a");
    assert_eq!(lease.expires_at, 2_000);

    // Held and unexpired: everybody is rejected, including the holder
    let err = store.acquire_lease(&key, "b", 1_500, 2_500).await.unwrap_err();
    assert!(matches!(err, MetadataError::ConditionFailed(_)));
    let err = store.acquire_lease(&key, "a", 1_500, 2_500).await.unwrap_err();
    assert!(err.is_condition_failed());

    // Expired: anybody may take it over
    let lease = store.acquire_lease(&key, "b", 2_001, 3_000).await.unwrap();
    assert_eq!(lease.owner_id, "b");

    let checkpoint = store.get_checkpoint("group", "0").await.unwrap().unwrap();
    assert_eq!(checkpoint.sequence_number, 0);
    assert_eq!(checkpoint.lock, Some(lease));
}

pub(crate) async fn lease_expires_at_its_deadline(store: &dyn MetadataStore) {
    let key = LeaseKey::partition("5");
    store.acquire_lease(&key, "a", 1_000, 2_000).await.unwrap();

    let record = store.get_partition("5").await.unwrap().unwrap();
    let lease = record.lock.unwrap();
    assert!(lease.is_active_at(1_999));
    assert!(store.acquire_lease(&key, "b", 1_999, 3_000).await.unwrap_err().is_condition_failed());

    // The snapshot and the conditional write agree on the deadline itself
    assert!(!lease.is_active_at(2_000));
    let taken = store.acquire_lease(&key, "b", 2_000, 3_000).await.unwrap();
    assert_eq!(taken.owner_id, "b");
}

pub(crate) async fn release_requires_ownership(store: &dyn MetadataStore) {
    let key = LeaseKey::partition("4");

    // Nothing to release yet
    assert!(store.release_lease(&key, "a").await.unwrap_err().is_condition_failed());

    store.acquire_lease(&key, "a", 0, 10_000).await.unwrap();
    assert!(store.release_lease(&key, "b").await.unwrap_err().is_condition_failed());

    store.release_lease(&key, "a").await.unwrap();
    let record = store.get_partition("4").await.unwrap().unwrap();
    assert!(record.lock.is_none());
    assert_eq!(record.sequence_number, 0);

    // Released lease is immediately available again
    store.acquire_lease(&key, "b", 0, 10_000).await.unwrap();
}

pub(crate) async fn increment_returns_attached_lease(store: &dyn MetadataStore) {
    let record = store.increment_sequence_number("2").await.unwrap();
    assert!(record.lock.is_none());

    store
        .acquire_lease(&LeaseKey::partition("2"), "notifier", 0, 99_000)
        .await
        .unwrap();

    let record = store.increment_sequence_number("2").await.unwrap();
    assert_eq!(record.sequence_number, 2);
    assert_eq!(
        record.lock,
        Some(LeaseRecord {
            owner_id: "notifier".to_string(),
            expires_at: 99_000,
        })
    );
}

pub(crate) async fn checkpoint_commit_requires_lease(store: &dyn MetadataStore) {
    // No item at all
    let err = store
        .commit_checkpoint("group", "1", 1, "a", 5_000)
        .await
        .unwrap_err();
    assert!(err.is_condition_failed());

    let key = LeaseKey::consumer("group", "1");
    store.acquire_lease(&key, "a", 0, 5_000).await.unwrap();

    // Wrong owner
    let err = store
        .commit_checkpoint("group", "1", 1, "b", 5_000)
        .await
        .unwrap_err();
    assert!(err.is_condition_failed());

    store
        .commit_checkpoint("group", "1", 3, "a", 8_000)
        .await
        .unwrap();

    let checkpoint = store.get_checkpoint("group", "1").await.unwrap().unwrap();
    assert_eq!(checkpoint.sequence_number, 3);
    assert_eq!(checkpoint.lock.map(|l| l.expires_at), Some(8_000));

    // Checkpoint survives release
    store.release_lease(&key, "a").await.unwrap();
    let checkpoint = store.get_checkpoint("group", "1").await.unwrap().unwrap();
    assert_eq!(checkpoint.sequence_number, 3);
    assert!(checkpoint.lock.is_none());
}

pub(crate) async fn consumer_names_are_independent(store: &dyn MetadataStore) {
    store
        .acquire_lease(&LeaseKey::consumer("alpha", "0"), "a", 0, 10_000)
        .await
        .unwrap();
    store
        .acquire_lease(&LeaseKey::consumer("beta", "0"), "b", 0, 10_000)
        .await
        .unwrap();

    // A partition-table lease on the same id does not collide either
    store
        .acquire_lease(&LeaseKey::partition("0"), "n", 0, 10_000)
        .await
        .unwrap();

    store.commit_checkpoint("alpha", "0", 7, "a", 10_000).await.unwrap();

    let beta = store.get_checkpoint("beta", "0").await.unwrap().unwrap();
    assert_eq!(beta.sequence_number, 0);
    let alpha = store.get_checkpoint("alpha", "0").await.unwrap().unwrap();
    assert_eq!(alpha.sequence_number, 7);
}
