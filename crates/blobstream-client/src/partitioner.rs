//! Partition Assignment
//!
//! Maps a partition key (arbitrary bytes) to one of `partition_count` partition ids.
//!
//! ## Algorithm
//!
//! ```text
//! key ──SHA-256──▶ 32-byte digest ──as big-endian integer──▶ N
//!                                                            │
//!                                        N mod partition_count
//!                                                            │
//!                                                            ▼
//!                                                  "0" .. "count-1"
//! ```
//!
//! The digest is reduced byte by byte (`acc = (acc * 256 + byte) mod count`),
//! which yields the same remainder as reducing the full 256-bit integer.
//!
//! ## Storage Form
//!
//! The partitioner is installed once per deployment as a compact JSON string:
//!
//! ```text
//! {"version":1,"method":"mod","partitionCount":4}
//! ```
//!
//! Every producer and consumer parses the same record, so a key maps to the same
//! partition everywhere. Parsing rejects unknown methods and versions newer than
//! [`HIGHEST_SUPPORTED_VERSION`].

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Highest partitioner record version this library understands.
pub const HIGHEST_SUPPORTED_VERSION: u32 = 1;

/// Partition assignment method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionMethod {
    /// SHA-256 of the key modulo the partition count
    Mod,
}

impl PartitionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionMethod::Mod => "mod",
        }
    }
}

impl FromStr for PartitionMethod {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mod" => Ok(PartitionMethod::Mod),
            other => Err(ClientError::UnsupportedPartitionerMethod(other.to_string())),
        }
    }
}

/// Deterministic key to partition mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partitioner {
    version: u32,
    method: PartitionMethod,
    partition_count: u32,
}

/// Wire form of a partitioner record.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartitionerRecord {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default = "default_partition_count")]
    partition_count: u32,
}

fn default_version() -> u32 {
    1
}

fn default_method() -> String {
    PartitionMethod::Mod.as_str().to_string()
}

fn default_partition_count() -> u32 {
    1
}

impl Default for Partitioner {
    fn default() -> Self {
        Self {
            version: 1,
            method: PartitionMethod::Mod,
            partition_count: 1,
        }
    }
}

impl Partitioner {
    /// Create a partitioner, validating version and partition count.
    pub fn new(version: u32, method: PartitionMethod, partition_count: u32) -> Result<Self> {
        if version > HIGHEST_SUPPORTED_VERSION {
            return Err(ClientError::UnsupportedPartitionerVersion {
                requested: version,
                supported: HIGHEST_SUPPORTED_VERSION,
            });
        }
        if partition_count == 0 {
            return Err(ClientError::InvalidPartitioner(
                "partitionCount must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            version,
            method,
            partition_count,
        })
    }

    /// Current-version `mod` partitioner over `partition_count` partitions.
    pub fn with_partition_count(partition_count: u32) -> Result<Self> {
        Self::new(HIGHEST_SUPPORTED_VERSION, PartitionMethod::Mod, partition_count)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn method(&self) -> PartitionMethod {
        self.method
    }

    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Partition id for `key`, as a decimal string.
    pub fn partition_id_for_key(&self, key: impl AsRef<[u8]>) -> String {
        match self.method {
            PartitionMethod::Mod => {
                let digest = Sha256::digest(key.as_ref());
                let modulus = u128::from(self.partition_count);
                let remainder = digest
                    .iter()
                    .fold(0u128, |acc, byte| (acc * 256 + u128::from(*byte)) % modulus);
                remainder.to_string()
            }
        }
    }

    /// All partition ids, `"0"` through `"partition_count - 1"`.
    pub fn partition_ids(&self) -> Vec<String> {
        match self.method {
            PartitionMethod::Mod => (0..self.partition_count).map(|p| p.to_string()).collect(),
        }
    }

    /// Structural equality on version, method and partition count.
    pub fn is_equivalent_to(&self, other: &Partitioner) -> bool {
        self.version == other.version
            && self.method == other.method
            && self.partition_count == other.partition_count
    }

    /// Parse the stored JSON form.
    pub fn parse(serialized: &str) -> Result<Self> {
        let record: PartitionerRecord = serde_json::from_str(serialized)
            .map_err(|e| ClientError::InvalidPartitioner(format!("{}: {}", serialized, e)))?;
        let method = record.method.parse::<PartitionMethod>()?;
        Self::new(record.version, method, record.partition_count)
    }

    /// Render the stored JSON form.
    pub fn to_json(&self) -> String {
        let record = PartitionerRecord {
            version: self.version,
            method: self.method.as_str().to_string(),
            partition_count: self.partition_count,
        };
        // A struct of two integers and a string always serializes
        serde_json::to_string(&record).unwrap_or_default()
    }
}

impl fmt::Display for Partitioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

impl FromStr for Partitioner {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_partitioner() {
        let p = Partitioner::default();
        assert_eq!(p.version(), 1);
        assert_eq!(p.method(), PartitionMethod::Mod);
        assert_eq!(p.partition_count(), 1);
        assert_eq!(p.partition_id_for_key("anything"), "0");
    }

    #[test]
    fn test_partition_id_is_deterministic_and_in_range() {
        let p = Partitioner::with_partition_count(7).unwrap();
        for i in 0..200 {
            let key = format!("key-{}", i);
            let id = p.partition_id_for_key(&key);
            assert_eq!(id, p.partition_id_for_key(&key));
            let n: u32 = id.parse().unwrap();
            assert!(n < 7);
        }
    }

    #[test]
    fn test_partition_id_matches_big_integer_mod() {
        // sha256("") = e3b0c442...b855; its low byte 0x55 = 85 decides mod 256
        let p = Partitioner::with_partition_count(256).unwrap();
        assert_eq!(p.partition_id_for_key(""), "85");

        // mod 2 is the parity of the last byte
        let p = Partitioner::with_partition_count(2).unwrap();
        assert_eq!(p.partition_id_for_key(""), "1");
    }

    #[test]
    fn test_keys_spread_across_partitions() {
        let p = Partitioner::with_partition_count(4).unwrap();
        let mut seen = std::collections::HashSet::new();
        for i in 0..100 {
            seen.insert(p.partition_id_for_key(format!("user-{}", i)));
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_partition_ids() {
        let p = Partitioner::with_partition_count(3).unwrap();
        assert_eq!(p.partition_ids(), vec!["0", "1", "2"]);
    }

    #[test]
    fn test_serialized_form() {
        let p = Partitioner::with_partition_count(4).unwrap();
        assert_eq!(
            p.to_string(),
            r#"{"version":1,"method":"mod","partitionCount":4}"#
        );

        let parsed: Partitioner = p.to_string().parse().unwrap();
        assert!(parsed.is_equivalent_to(&p));
    }

    #[test]
    fn test_parse_fills_defaults() {
        let p = Partitioner::parse("{}").unwrap();
        assert!(p.is_equivalent_to(&Partitioner::default()));
    }

    #[test]
    fn test_parse_rejects_unknown_method() {
        let err = Partitioner::parse(r#"{"version":1,"method":"range","partitionCount":2}"#)
            .unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedPartitionerMethod(m) if m == "range"));
    }

    #[test]
    fn test_parse_rejects_newer_version() {
        let err = Partitioner::parse(r#"{"version":2,"method":"mod","partitionCount":2}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::UnsupportedPartitionerVersion {
                requested: 2,
                supported: 1
            }
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = Partitioner::parse("not json").unwrap_err();
        assert!(matches!(err, ClientError::InvalidPartitioner(_)));
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn test_zero_partitions_rejected() {
        assert!(Partitioner::with_partition_count(0).is_err());
    }

    #[test]
    fn test_equivalence() {
        let a = Partitioner::with_partition_count(4).unwrap();
        let b = Partitioner::with_partition_count(4).unwrap();
        let c = Partitioner::with_partition_count(5).unwrap();
        assert!(a.is_equivalent_to(&b));
        assert!(!a.is_equivalent_to(&c));
    }
}
