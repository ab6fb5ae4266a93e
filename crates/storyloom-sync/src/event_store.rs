//! Append-only, versioned event log.
//!
//! The store is the single point of sequence-number assignment for a
//! document. Concurrency is resolved *before* append by the conflict
//! resolver; the store itself only serializes writes and replays them
//! deterministically.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use storyloom_core::command::Command;
use storyloom_core::error::SyncError;
use storyloom_core::event::{Event, Resolution};
use storyloom_core::graph::StoryGraph;
use storyloom_core::store::Snapshot;
use storyloom_core::version::VersionVector;

/// Per-document append-only event log.
///
/// Server side this is the authoritative log; client side it is a
/// read-mostly cache of it, fed by ingested events.
#[derive(Debug, Clone, Default)]
pub struct EventStore {
    document_id: Uuid,
    /// Sequence number the log starts after; non-zero only for client
    /// caches resumed from a snapshot, which hold a suffix of the log.
    base: u64,
    events: Vec<Event>,
}

impl EventStore {
    /// Creates an empty log for a document, starting at sequence 1.
    #[must_use]
    pub fn new(document_id: Uuid) -> Self {
        Self::resume(document_id, 0)
    }

    /// Creates a cache resumed from a snapshot: it holds only events
    /// after `base_version`.
    #[must_use]
    pub fn resume(document_id: Uuid, base_version: u64) -> Self {
        Self {
            document_id,
            base: base_version,
            events: Vec::new(),
        }
    }

    /// The document this log belongs to.
    #[must_use]
    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    /// Highest held sequence number, `base` when empty.
    #[must_use]
    pub fn head(&self) -> u64 {
        self.base + self.events.len() as u64
    }

    /// Appends an accepted command, assigning the next sequence number.
    /// This is the only place sequence numbers are minted; the returned
    /// event is immutable apart from later supersession marking.
    pub fn append(
        &mut self,
        command: Command,
        causal_version: VersionVector,
        accepted_at: DateTime<Utc>,
        resolution: Resolution,
    ) -> &Event {
        let event = Event {
            server_sequence: self.head() + 1,
            document_id: self.document_id,
            command,
            causal_version,
            accepted_at,
            resolution,
        };
        tracing::debug!(
            document_id = %self.document_id,
            server_sequence = event.server_sequence,
            command_type = event.command.kind.command_type(),
            "event appended"
        );
        self.events.push(event);
        self.events.last().unwrap_or_else(|| unreachable!())
    }

    /// Ingests an already-sequenced event from the authoritative stream
    /// into this cache.
    ///
    /// Re-delivery of an already-held sequence is a tolerated no-op
    /// (returns `Ok(false)`); network retries redeliver events.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SequenceGap`] if the event skips past the
    /// cache head, which forces a full snapshot reload.
    pub fn ingest(&mut self, event: Event) -> Result<bool, SyncError> {
        let expected = self.head() + 1;
        if event.server_sequence < expected {
            return Ok(false);
        }
        if event.server_sequence > expected {
            return Err(SyncError::SequenceGap {
                expected,
                found: event.server_sequence,
            });
        }
        self.events.push(event);
        Ok(true)
    }

    /// Events with sequence numbers strictly after `from_version`, in
    /// order. Deterministic and side-effect free.
    #[must_use]
    pub fn replay(&self, from_version: u64) -> &[Event] {
        let offset = from_version.saturating_sub(self.base);
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        if start >= self.events.len() {
            &[]
        } else {
            &self.events[start..]
        }
    }

    /// The full log.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Looks up an event by sequence number.
    #[must_use]
    pub fn get(&self, server_sequence: u64) -> Option<&Event> {
        server_sequence
            .checked_sub(self.base + 1)
            .and_then(|i| self.events.get(usize::try_from(i).ok()?))
    }

    /// Marks an already-appended event superseded by a later concurrent
    /// winner. Payload and ordering are untouched; only the resolution
    /// marker changes, so audit and undo keep seeing the loser.
    pub fn mark_superseded(&mut self, server_sequence: u64, winner: Uuid) {
        if let Some(index) = server_sequence
            .checked_sub(self.base + 1)
            .and_then(|i| usize::try_from(i).ok())
            && let Some(event) = self.events.get_mut(index)
        {
            event.resolution = Resolution::Superseded { by: winner };
        }
    }

    /// Materializes a snapshot of the state at `at_version`. Requires a
    /// log that starts at genesis (sequence 1).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SequenceGap`] if this log is a resumed suffix
    /// and the prefix is unavailable, or [`SyncError::ValidationFailed`]
    /// if an effective event does not apply cleanly (the log is corrupt).
    pub fn snapshot(&self, at_version: u64) -> Result<Snapshot, SyncError> {
        if self.base != 0 {
            return Err(SyncError::SequenceGap {
                expected: 1,
                found: self.base + 1,
            });
        }
        let mut state = MaterializedState::empty();
        for event in self.events() {
            if event.server_sequence > at_version {
                break;
            }
            state.apply_event(event)?;
        }
        Ok(Snapshot {
            document_id: self.document_id,
            version: state.applied(),
            state: state.into_graph(),
        })
    }
}

/// A graph materialized from the event log, tracking the applied-sequence
/// watermark so replay is idempotent.
#[derive(Debug, Clone, Default)]
pub struct MaterializedState {
    graph: StoryGraph,
    applied: u64,
}

impl MaterializedState {
    /// Empty state at version 0.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resumes from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            graph: snapshot.state,
            applied: snapshot.version,
        }
    }

    /// The materialized graph.
    #[must_use]
    pub fn graph(&self) -> &StoryGraph {
        &self.graph
    }

    /// Highest sequence reflected in the graph.
    #[must_use]
    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// Consumes the state, yielding the graph.
    #[must_use]
    pub fn into_graph(self) -> StoryGraph {
        self.graph
    }

    /// Applies one event. Events at or below the watermark are skipped
    /// (idempotent replay); only `Applied` resolutions mutate the graph.
    ///
    /// Returns whether the event advanced the state.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SequenceGap`] on a skipped sequence and
    /// [`SyncError::ValidationFailed`] if an effective payload does not
    /// apply (both indicate a corrupt or incomplete log).
    pub fn apply_event(&mut self, event: &Event) -> Result<bool, SyncError> {
        if event.server_sequence <= self.applied {
            return Ok(false);
        }
        if event.server_sequence != self.applied + 1 {
            return Err(SyncError::SequenceGap {
                expected: self.applied + 1,
                found: event.server_sequence,
            });
        }
        if event.is_effective() {
            self.graph.apply_command(&event.command)?;
        }
        self.applied = event.server_sequence;
        Ok(true)
    }

    /// Applies a batch of events in order.
    ///
    /// # Errors
    ///
    /// Propagates the first [`SyncError`] from [`Self::apply_event`].
    pub fn apply_events(&mut self, events: &[Event]) -> Result<(), SyncError> {
        for event in events {
            self.apply_event(event)?;
        }
        Ok(())
    }
}
