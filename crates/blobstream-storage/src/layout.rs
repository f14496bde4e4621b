//! Event key layout inside the blob store.
//!
//! ```text
//! events/{partition_id}/{sequence_number}
//! ```
//!
//! One immutable object per event. Sequence numbers are rendered in plain decimal;
//! nothing relies on lexicographic listing order.

/// Top-level prefix of all event objects.
pub const EVENTS_PREFIX: &str = "events";

/// Key of the event at `sequence_number` in `partition_id`.
pub fn event_key(partition_id: &str, sequence_number: u64) -> String {
    format!("{}/{}/{}", EVENTS_PREFIX, partition_id, sequence_number)
}

/// Prefix shared by every event of `partition_id`.
pub fn partition_prefix(partition_id: &str) -> String {
    format!("{}/{}/", EVENTS_PREFIX, partition_id)
}
