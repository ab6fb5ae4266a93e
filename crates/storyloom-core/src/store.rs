//! Persistence boundary.
//!
//! The core never talks to a database. Durability is delegated to an
//! abstract collaborator that commits the event log up to a version and
//! hands back snapshots; how it stores them is its own business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SyncError;
use crate::graph::StoryGraph;

/// A materialized document state at a known version, used to bound
/// replay cost. Snapshot plus the event suffix after `version` must
/// reconstruct the same state as full replay from zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The document captured.
    pub document_id: Uuid,
    /// Server sequence at capture time.
    pub version: u64,
    /// The serialized graph state.
    pub state: StoryGraph,
}

/// Abstract persistence collaborator for the autosave engine.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Durably commits the document's events up to `up_to_version`.
    /// Must be idempotent: committing the same version twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::PersistenceFailure`] if the backend rejects
    /// the commit.
    async fn commit(&self, document_id: Uuid, up_to_version: u64) -> Result<(), SyncError>;

    /// Loads the most recent snapshot for a document, if any exists.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::PersistenceFailure`] if the backend cannot be
    /// read.
    async fn load_snapshot(&self, document_id: Uuid) -> Result<Option<Snapshot>, SyncError>;
}
