//! Durable event records.
//!
//! An [`Event`] is the append-only record of a command's acceptance by
//! the authoritative log. Events are immutable in sequence and payload;
//! only the resolution marker may be set later, when a concurrent edit
//! supersedes an already-appended one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::Command;
use crate::version::VersionVector;

/// Why a command was rebased into a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoopReason {
    /// The command's target entity was removed concurrently.
    TargetRemoved,
}

/// How conflict resolution disposed of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    /// The command's effect is part of the converged state.
    Applied,
    /// A concurrent command won last-writer-wins; this one remains in the
    /// log for audit and undo, but contributes no state effect.
    Superseded {
        /// The command that won.
        by: Uuid,
    },
    /// The command was rebased to a no-op because its preconditions no
    /// longer held.
    Noop {
        /// Why the effect was dropped.
        reason: NoopReason,
    },
}

/// The durable record of an accepted command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic, gap-free sequence number within the document.
    pub server_sequence: u64,
    /// The document this event belongs to.
    pub document_id: Uuid,
    /// The accepted command.
    pub command: Command,
    /// Causal version at acceptance: the author's entry plus everything
    /// the author had seen when issuing the command.
    pub causal_version: VersionVector,
    /// Server time of acceptance; first component of the LWW stamp.
    pub accepted_at: DateTime<Utc>,
    /// Conflict-resolution disposition.
    pub resolution: Resolution,
}

impl Event {
    /// Whether this event contributes a state effect during replay.
    #[must_use]
    pub fn is_effective(&self) -> bool {
        matches!(self.resolution, Resolution::Applied)
    }

    /// The totally ordered last-writer-wins stamp. Ties on `accepted_at`
    /// break on the globally unique author id.
    #[must_use]
    pub fn lww_stamp(&self) -> (DateTime<Utc>, Uuid) {
        (self.accepted_at, self.command.author_id)
    }
}
