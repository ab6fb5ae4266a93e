//! Synchronization error taxonomy.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for the synchronization core.
///
/// Only `SequenceGap` is unrecoverable for a session; every other kind
/// degrades to a retry-with-visible-status path, and no variant ever
/// implies a silently dropped edit.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A command payload is invalid against the current state. Rejected,
    /// not retried, surfaced to the caller.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// A pending command's preconditions were invalidated by a concurrent
    /// structural change. The command is rebased to a no-op, not replayed.
    #[error("stale version: command {command_id} preconditions no longer hold")]
    StaleVersion {
        /// The pending command whose target went away.
        command_id: Uuid,
    },

    /// A push or catch-up could not reach the server. Retried with
    /// backoff; save state stays dirty.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The persistence collaborator rejected a commit. Retried, surfaced
    /// as a non-fatal "unsaved" status.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// Replay observed a missing server sequence number. Fatal for the
    /// session; forces a full snapshot reload.
    #[error("sequence gap: expected {expected}, found {found}")]
    SequenceGap {
        /// The sequence number replay expected next.
        expected: u64,
        /// The sequence number actually observed.
        found: u64,
    },
}

impl SyncError {
    /// Whether the error is recoverable within the current session.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::SequenceGap { .. })
    }
}
