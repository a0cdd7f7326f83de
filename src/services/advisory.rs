//! Advisory override sources.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::types::Override;

/// Result of reading the advisory override.
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideRead {
    /// No override published; trade with the configured parameters
    Absent,
    Valid(Override),
    /// An override exists but could not be read or parsed; no entries
    Malformed(String),
}

/// Supplies the current advisory override.
#[async_trait]
pub trait OverrideSource: Send + Sync {
    async fn current(&self) -> OverrideRead;
}

/// Reads an override from a JSON file on every call, so edits take effect
/// on the next tick.
#[derive(Debug, Clone)]
pub struct FileOverrideSource {
    path: PathBuf,
}

impl FileOverrideSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl OverrideSource for FileOverrideSource {
    async fn current(&self) -> OverrideRead {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No override file at {}", self.path.display());
                return OverrideRead::Absent;
            }
            Err(e) => {
                warn!("Failed to read override file {}: {}", self.path.display(), e);
                return OverrideRead::Malformed(e.to_string());
            }
        };

        match serde_json::from_slice::<Override>(&bytes) {
            Ok(ov) => OverrideRead::Valid(ov),
            Err(e) => {
                warn!("Malformed override file {}: {}", self.path.display(), e);
                OverrideRead::Malformed(e.to_string())
            }
        }
    }
}

/// Always returns the same override. Used when no override file is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticOverride(pub Option<Override>);

#[async_trait]
impl OverrideSource for StaticOverride {
    async fn current(&self) -> OverrideRead {
        match self.0 {
            Some(ref ov) => OverrideRead::Valid(ov.clone()),
            None => OverrideRead::Absent,
        }
    }
}
