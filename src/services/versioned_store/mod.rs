//! Versioned object store abstraction used for ledger replication.
//!
//! A store holds one object. Reads return the content with an opaque
//! version token; writes must present the version they were based on and
//! fail with [`StoreError::Conflict`] when the object moved underneath them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod http_store;
pub mod memory_store;
pub mod redis_store;

pub use http_store::HttpStore;
pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;

/// Opaque revision token for a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version(pub String);

impl Version {
    pub fn new(v: impl Into<String>) -> Self {
        Self(v.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object content paired with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub content: Vec<u8>,
    pub version: Version,
}

/// Versioned store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object's current version differs from the expected one
    #[error("Version conflict (expected {expected:?})")]
    Conflict { expected: Option<Version> },

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Remote object with optimistic-concurrency writes.
#[async_trait]
pub trait VersionedStore: Send + Sync + fmt::Debug {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Read the object, or `None` if it does not exist yet.
    async fn pull(&self) -> Result<Option<Versioned>, StoreError>;

    /// Write `content` if the object is still at `expected`.
    ///
    /// `expected = None` means "create only if absent". Returns the new
    /// version on success.
    async fn put(&self, content: &[u8], expected: Option<&Version>) -> Result<Version, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Conflict {
            expected: Some(Version::new("7")),
        };
        assert!(err.is_conflict());
        assert_eq!(err.to_string(), "Version conflict (expected Some(Version(\"7\")))");

        let err = StoreError::Http {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(!err.is_conflict());
        assert_eq!(err.to_string(), "HTTP error 503: unavailable");
    }

    #[test]
    fn test_version_display() {
        assert_eq!(Version::new("W/\"abc\"").to_string(), "W/\"abc\"");
    }
}
