//! Mock `DocumentStore` implementations for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use storyloom_core::error::SyncError;
use storyloom_core::store::{DocumentStore, Snapshot};

/// A document store that records every commit and serves a configurable
/// snapshot. Commits can be toggled to fail to exercise retry paths.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    commits: Mutex<Vec<(Uuid, u64)>>,
    snapshot: Mutex<Option<Snapshot>>,
    fail_commits: AtomicBool,
}

impl MemoryDocumentStore {
    /// Creates an empty store that accepts all commits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the snapshot returned by `load_snapshot`.
    pub fn set_snapshot(&self, snapshot: Snapshot) {
        *self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    /// Makes future commits fail (or succeed again).
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// All `(document_id, up_to_version)` commits recorded so far.
    #[must_use]
    pub fn commits(&self) -> Vec<(Uuid, u64)> {
        self.commits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn commit(&self, document_id: Uuid, up_to_version: u64) -> Result<(), SyncError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(SyncError::PersistenceFailure("commit refused".to_owned()));
        }
        self.commits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((document_id, up_to_version));
        Ok(())
    }

    async fn load_snapshot(&self, _document_id: Uuid) -> Result<Option<Snapshot>, SyncError> {
        Ok(self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// A document store whose commits never complete, for shutdown-deadline
/// paths.
#[derive(Debug, Default)]
pub struct StalledDocumentStore;

#[async_trait]
impl DocumentStore for StalledDocumentStore {
    async fn commit(&self, _document_id: Uuid, _up_to_version: u64) -> Result<(), SyncError> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn load_snapshot(&self, _document_id: Uuid) -> Result<Option<Snapshot>, SyncError> {
        Ok(None)
    }
}

/// A document store that always fails, for error-handling paths.
#[derive(Debug, Default)]
pub struct FailingDocumentStore;

#[async_trait]
impl DocumentStore for FailingDocumentStore {
    async fn commit(&self, _document_id: Uuid, _up_to_version: u64) -> Result<(), SyncError> {
        Err(SyncError::PersistenceFailure("backend down".to_owned()))
    }

    async fn load_snapshot(&self, _document_id: Uuid) -> Result<Option<Snapshot>, SyncError> {
        Err(SyncError::PersistenceFailure("backend down".to_owned()))
    }
}
