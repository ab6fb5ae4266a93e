//! Authoritative per-document state.
//!
//! The host owns the canonical event log for one document. Its lock is
//! the single-writer append path the ordering guarantees rely on: all
//! concurrency between collaborators is resolved before append, inside
//! the lock, by the conflict resolver. Connected editors receive events
//! and presence over a broadcast channel.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use storyloom_core::command::Command;
use storyloom_core::error::SyncError;
use storyloom_core::event::Resolution;
use storyloom_core::store::Snapshot;
use storyloom_core::version::VersionVector;
use storyloom_sync::conflict::ConflictResolver;
use storyloom_sync::event_store::{EventStore, MaterializedState};
use storyloom_sync::wire::Frame;

const BROADCAST_CAPACITY: usize = 256;

struct HostInner {
    store: EventStore,
    state: MaterializedState,
}

/// One document's authoritative log plus its fan-out channel.
pub struct DocumentHost {
    document_id: Uuid,
    inner: Mutex<HostInner>,
    broadcast: broadcast::Sender<Frame>,
}

impl DocumentHost {
    /// Creates an empty host for a document.
    #[must_use]
    pub fn new(document_id: Uuid) -> Self {
        let (broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            document_id,
            inner: Mutex::new(HostInner {
                store: EventStore::new(document_id),
                state: MaterializedState::empty(),
            }),
            broadcast,
        }
    }

    /// The hosted document.
    #[must_use]
    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    /// Subscribes to the event/presence fan-out.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.broadcast.subscribe()
    }

    /// Catch-up for a reconnecting client: every event after
    /// `from_sequence`, oldest first, as event frames.
    #[must_use]
    pub fn catch_up(&self, from_sequence: u64) -> Vec<Frame> {
        let inner = self.lock();
        inner
            .store
            .replay(from_sequence)
            .iter()
            .map(|event| Frame::Event {
                document_id: self.document_id,
                event: event.clone(),
            })
            .collect()
    }

    /// Accepts a push: resolves each command against the log, appends it,
    /// broadcasts the resulting event, and returns the reply frames
    /// (acks and per-command errors) for the pushing client.
    pub fn handle_push(
        &self,
        commands: Vec<Command>,
        sender_version: &VersionVector,
        now: DateTime<Utc>,
    ) -> Vec<Frame> {
        let mut inner = self.lock();
        let mut replies = Vec::with_capacity(commands.len());
        // Grows as the push's own commands are accepted, so later
        // commands in the same push are causally after earlier ones.
        let mut causal = sender_version.clone();

        for command in commands {
            if inner.store.events().iter().any(|e| e.command.id == command.id) {
                // Redelivered push; answer with the original position.
                if let Some(event) = inner
                    .store
                    .events()
                    .iter()
                    .find(|e| e.command.id == command.id)
                {
                    replies.push(Frame::Ack {
                        document_id: self.document_id,
                        command_id: command.id,
                        server_sequence: event.server_sequence,
                    });
                }
                continue;
            }

            let resolved =
                ConflictResolver::resolve_incoming(&command, &causal, now, inner.store.events());

            if matches!(resolved.resolution, Resolution::Applied) {
                // Validate against the live state before the append
                // commits a sequence number to an unappliable payload.
                let mut probe = inner.state.graph().clone();
                if let Err(err) = probe.apply_command(&command) {
                    tracing::warn!(
                        document_id = %self.document_id,
                        command_id = %command.id,
                        error = %err,
                        "rejecting invalid command"
                    );
                    replies.push(Frame::Error {
                        document_id: self.document_id,
                        command_id: Some(command.id),
                        reason: err.to_string(),
                    });
                    continue;
                }
            }

            for sequence in &resolved.supersedes {
                inner.store.mark_superseded(*sequence, command.id);
            }
            causal.observe(command.author_id, command.local_sequence);

            let event = inner
                .store
                .append(command, causal.clone(), now, resolved.resolution)
                .clone();
            if let Err(err) = inner.state.apply_event(&event) {
                // The probe above makes this unreachable for valid logs.
                tracing::error!(
                    document_id = %self.document_id,
                    server_sequence = event.server_sequence,
                    error = %err,
                    "authoritative state diverged from log"
                );
            }

            replies.push(Frame::Ack {
                document_id: self.document_id,
                command_id: event.command.id,
                server_sequence: event.server_sequence,
            });
            let _ = self.broadcast.send(Frame::Event {
                document_id: self.document_id,
                event,
            });
        }
        replies
    }

    /// Rebroadcasts a presence frame to all connected editors. Presence
    /// never touches the log.
    pub fn broadcast_presence(&self, frame: Frame) {
        if matches!(frame, Frame::Presence { .. }) {
            let _ = self.broadcast.send(frame);
        }
    }

    /// Materializes the current state as a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] if the log cannot be replayed.
    pub fn snapshot(&self) -> Result<Snapshot, SyncError> {
        let inner = self.lock();
        inner.store.snapshot(inner.store.head())
    }

    /// The current log head.
    #[must_use]
    pub fn head(&self) -> u64 {
        self.lock().store.head()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HostInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
