//! Ledger replication over a [`VersionedStore`].
//!
//! Last-writer-wins across process instances. Every push writes the current
//! local state against the last known version. A push that hits a version
//! conflict refreshes the version once and retries; if that also fails the
//! push is dropped and the next trigger tries again. Local state is never
//! rolled back.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::services::versioned_store::{StoreError, Version, VersionedStore};
use crate::types::LedgerState;

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to encode ledger: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of a push attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Remote now holds the local state at this version
    Pushed(Version),
    /// Conflict persisted after the single retry
    Abandoned,
}

pub struct Replicator {
    store: Arc<dyn VersionedStore>,
    last_version: Option<Version>,
}

impl Replicator {
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self {
            store,
            last_version: None,
        }
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub fn last_version(&self) -> Option<&Version> {
        self.last_version.as_ref()
    }

    /// Fetch the replicated ledger on startup.
    ///
    /// Returns `None` on first run, on transport errors, and when the
    /// remote content cannot be decoded; the caller keeps its local state.
    pub async fn restore(&mut self) -> Option<LedgerState> {
        let object = match self.store.pull().await {
            Ok(Some(object)) => object,
            Ok(None) => {
                info!("No replicated ledger in {} store, keeping local state", self.store.name());
                return None;
            }
            Err(e) => {
                warn!("Failed to pull replicated ledger: {}", e);
                return None;
            }
        };

        // Remember the version even if decoding fails so the next push
        // can replace the unreadable copy.
        self.last_version = Some(object.version.clone());

        match serde_json::from_slice::<LedgerState>(&object.content) {
            Ok(state) => {
                info!(
                    "Restored replicated ledger at version {} ({} positions, balance {:.2})",
                    object.version,
                    state.positions.len(),
                    state.balance
                );
                Some(state)
            }
            Err(e) => {
                warn!("Replicated ledger at version {} is unreadable: {}", object.version, e);
                None
            }
        }
    }

    /// Write `state` to the remote store.
    pub async fn push(&mut self, state: &LedgerState) -> Result<PushOutcome, ReplicationError> {
        let content = serde_json::to_vec(state)?;

        match self.store.put(&content, self.last_version.as_ref()).await {
            Ok(version) => return Ok(self.accepted(version)),
            Err(e) if e.is_conflict() => {
                warn!(
                    "Replication conflict at version {:?}, refreshing version and retrying once",
                    self.last_version
                );
            }
            Err(e) => return Err(e.into()),
        }

        let current = self.store.pull().await?.map(|object| object.version);
        match self.store.put(&content, current.as_ref()).await {
            Ok(version) => Ok(self.accepted(version)),
            Err(e) if e.is_conflict() => {
                warn!("Replication conflict persisted after retry, abandoning this push");
                self.last_version = current;
                Ok(PushOutcome::Abandoned)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn accepted(&mut self, version: Version) -> PushOutcome {
        debug!("Pushed ledger to {} store at version {}", self.store.name(), version);
        self.last_version = Some(version.clone());
        PushOutcome::Pushed(version)
    }
}
