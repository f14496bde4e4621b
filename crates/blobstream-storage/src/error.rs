//! Storage Error Types
//!
//! This module defines all error types that can occur during blob operations.
//!
//! ## Error Categories
//!
//! - `NotFound`: The key has no object. For event reads this is either "not written
//!   yet" or "never will be" - the consumer tells them apart with the partition counter.
//! - `InvalidLocation`: The event-storage location could not be resolved to a store
//! - `ObjectStoreError`: Low-level object store operation failed (transport)
//!
//! ## Usage
//!
//! All storage operations return `Result<T>` which is aliased to
//! `Result<T, StorageError>`. This allows clean error propagation with `?`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage location: {0}")]
    InvalidLocation(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[source] object_store::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<object_store::Error> for StorageError {
    fn from(e: object_store::Error) -> Self {
        match e {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound(path),
            other => StorageError::ObjectStoreError(other),
        }
    }
}
