//! Read-only boundary to the negotiation store.
//!
//! The pipeline only ever reads: persisting the resulting action,
//! message, or review flag is the caller's responsibility after a run
//! returns. [`JsonFileStore`] is the shipped implementation, backing the
//! CLI and the test suites with a single JSON document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::negotiation::{AgentPolicy, NegotiationSnapshot};

/// A negotiation snapshot together with its policy record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationCase {
    /// The read-only negotiation snapshot.
    pub snapshot: NegotiationSnapshot,
    /// The caller's policy configuration for this negotiation.
    #[serde(default)]
    pub policy: AgentPolicy,
}

/// Errors from store access.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("store read failed: {0}")]
    Io(#[from] std::io::Error),
    /// The record did not deserialize.
    #[error("store record malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    /// No record for the requested negotiation.
    #[error("negotiation {0} not found")]
    NotFound(Uuid),
}

/// Read access to negotiation records by identifier.
#[async_trait]
pub trait NegotiationStore: Send + Sync {
    /// Load the snapshot and policy for one negotiation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record is missing or unreadable.
    async fn load(&self, id: Uuid) -> Result<NegotiationCase, StoreError>;
}

/// File-backed store: one JSON document holding a [`NegotiationCase`].
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store reading from the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the single case this file holds, whatever its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O or deserialization failure.
    pub async fn load_case(&self) -> Result<NegotiationCase, StoreError> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let case: NegotiationCase = serde_json::from_str(&contents)?;
        Ok(case)
    }
}

#[async_trait]
impl NegotiationStore for JsonFileStore {
    async fn load(&self, id: Uuid) -> Result<NegotiationCase, StoreError> {
        let case = self.load_case().await?;
        if case.snapshot.id != id {
            return Err(StoreError::NotFound(id));
        }
        Ok(case)
    }
}
