//! Metadata Error Types
//!
//! This module defines all error types that can occur during metadata operations.
//!
//! ## Error Categories
//!
//! ### Conditional Write Errors
//! - `ConditionFailed`: A put-if-absent or update-with-condition was rejected
//!   because the item's current attributes did not satisfy the condition.
//!   This is the protocol-level signal that someone else holds a lease or
//!   already created an item; it is never a transport failure.
//!
//! ### Configuration Errors
//! - `InvalidIdentifier`: A configured table name is not a safe SQL identifier
//!
//! ### Backend Errors
//! - `DatabaseError`: SQLite/database operation failed (connection, query, etc.)
//!
//! ## Usage
//!
//! ```ignore
//! use blobstream_metadata::{MetadataError, MetadataStore};
//!
//! match store.create_partitioner(&serialized).await {
//!     Ok(()) => println!("Installed"),
//!     Err(MetadataError::ConditionFailed(_)) => println!("Somebody else won the race"),
//!     Err(e) => return Err(e),
//! }
//! ```

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetadataError>;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Conditional write rejected: {0}")]
    ConditionFailed(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl MetadataError {
    /// Whether this error is a rejected conditional write.
    pub fn is_condition_failed(&self) -> bool {
        matches!(self, MetadataError::ConditionFailed(_))
    }
}
