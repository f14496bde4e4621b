//! Error types for Blobstream client operations.
//!
//! This module defines all possible errors that can occur during Producer and Consumer
//! operations.
//!
//! ## Error Handling Strategy
//!
//! Every variant maps onto an [`ErrorKind`] so callers branch with a `match`
//! instead of inspecting messages:
//!
//! - **Configuration** (fatal, never retried): `ConfigError`,
//!   `UnsupportedPartitionerMethod`, `UnsupportedPartitionerVersion`,
//!   `InvalidPartitioner`, `PartitionerNotInitialized`
//! - **LockContention** (expected, frequent): `LockContention`
//! - **RetriesExhausted**: `RetriesExhausted`
//! - **Transport** (propagated, caller may retry the whole operation):
//!   `MetadataError`, `StorageError`, `NotificationError`
//! - **Handler**: `HandlerError`
//! - **Internal**: `Internal`
//!
//! ## Examples
//!
//! ```ignore
//! use blobstream_client::{ClientError, ErrorKind};
//!
//! match consumer.skip_to_end("3").await {
//!     Ok(()) => {}
//!     Err(e) if e.kind() == ErrorKind::LockContention => {
//!         // someone else is reading this partition right now
//!     }
//!     Err(e) => return Err(e),
//! }
//! ```

use thiserror::Error;

/// Convenience type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Coarse classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    LockContention,
    RetriesExhausted,
    Transport,
    Handler,
    Internal,
}

/// Error type for Blobstream client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid or missing client configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The partitioner names a method this library does not implement.
    #[error("Partitioner method '{0}' is not supported. Supported methods: mod")]
    UnsupportedPartitionerMethod(String),

    /// The installed partitioner is newer than this library understands.
    #[error(
        "Partitioner version {requested} is higher than the highest supported version {supported}"
    )]
    UnsupportedPartitionerVersion { requested: u32, supported: u32 },

    /// The stored partitioner record could not be parsed.
    #[error("Unable to parse partitioner: {0}")]
    InvalidPartitioner(String),

    /// A read API was used before any producer installed a partitioner.
    #[error("No partitioner has been initialized yet")]
    PartitionerNotInitialized,

    /// Another owner holds an unexpired lease on the key.
    #[error("Unable to obtain lock on {key}: another instance is operating on it")]
    LockContention { key: String },

    /// A bounded retry loop gave up.
    #[error("{message} (after {attempts} attempts)")]
    RetriesExhausted { attempts: usize, message: String },

    /// The event handler failed; the batch stopped before the failing event was checkpointed.
    #[error("Event handler error: {0}")]
    HandlerError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Metadata store operation failed.
    #[error("Metadata store error: {0}")]
    MetadataError(#[from] blobstream_metadata::MetadataError),

    /// Blob store operation failed.
    #[error("Storage error: {0}")]
    StorageError(#[from] blobstream_storage::StorageError),

    /// Publishing a notification failed.
    #[error("Notification error: {0}")]
    NotificationError(String),

    /// Internal error that shouldn't normally occur.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::ConfigError(_)
            | ClientError::UnsupportedPartitionerMethod(_)
            | ClientError::UnsupportedPartitionerVersion { .. }
            | ClientError::InvalidPartitioner(_)
            | ClientError::PartitionerNotInitialized => ErrorKind::Configuration,
            ClientError::LockContention { .. } => ErrorKind::LockContention,
            ClientError::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            ClientError::MetadataError(_)
            | ClientError::StorageError(_)
            | ClientError::NotificationError(_) => ErrorKind::Transport,
            ClientError::HandlerError(_) => ErrorKind::Handler,
            ClientError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the error is a rejected conditional write in the metadata store.
    pub fn is_condition_failed(&self) -> bool {
        matches!(self, ClientError::MetadataError(e) if e.is_condition_failed())
    }
}
