//! Per-document editing session.
//!
//! The session is the composition root created when an editor opens a
//! blueprint: it owns the undo history, the canonical event cache, the
//! event bus, the sync manager, the autosave engine, and the presence
//! tracker, and drives the transport between them. All state mutation
//! happens on the session's logical task; the only suspension points are
//! transport sends/receives and persistence commits.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use storyloom_core::clock::Clock;
use storyloom_core::command::{Command, CommandKind};
use storyloom_core::error::SyncError;
use storyloom_core::event::Event;
use storyloom_core::graph::StoryGraph;
use storyloom_core::save_state::SaveState;
use storyloom_core::store::{DocumentStore, Snapshot};

use crate::autosave::{AutoSave, AutoSaveConfig};
use crate::bus::{SessionEvent, StateEventBus, SubscriptionId};
use crate::command_stack::CommandStack;
use crate::conflict::ConflictResolver;
use crate::event_store::{EventStore, MaterializedState};
use crate::presence::{PresenceInfo, PresenceTracker};
use crate::sync_manager::{RetryPolicy, SyncManager};
use crate::wire::{Frame, SyncTransport};

/// Tunables for one editing session.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Autosave debounce and checkpoint timing.
    pub autosave: AutoSaveConfig,
    /// Push retry backoff.
    pub retry: RetryPolicy,
    /// Presence heartbeat timeout in milliseconds.
    pub presence_timeout_ms: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave: AutoSaveConfig::default(),
            retry: RetryPolicy::default(),
            presence_timeout_ms: 15_000,
        }
    }
}

/// One editor's live session on one document.
pub struct DocumentSession {
    document_id: Uuid,
    clock: Arc<dyn Clock>,
    persistence: Arc<dyn DocumentStore>,
    bus: Arc<StateEventBus>,
    stack: CommandStack,
    /// Read-mostly cache of the canonical event log.
    store: EventStore,
    /// State materialized from acknowledged canonical events only.
    canonical: MaterializedState,
    /// Canonical state plus optimistically applied pending commands.
    optimistic: StoryGraph,
    sync: SyncManager,
    autosave: AutoSave,
    presence: PresenceTracker,
}

impl DocumentSession {
    /// Opens a session, resuming from a snapshot when one is available.
    #[must_use]
    pub fn open(
        document_id: Uuid,
        author_id: Uuid,
        snapshot: Option<Snapshot>,
        clock: Arc<dyn Clock>,
        persistence: Arc<dyn DocumentStore>,
        config: SessionConfig,
    ) -> Self {
        let now = clock.now();
        let (store, canonical) = match snapshot {
            Some(snapshot) => (
                EventStore::resume(document_id, snapshot.version),
                MaterializedState::from_snapshot(snapshot),
            ),
            None => (EventStore::new(document_id), MaterializedState::empty()),
        };
        let optimistic = canonical.graph().clone();
        let mut sync = SyncManager::new(document_id, author_id, config.retry);
        // Resuming from a snapshot means everything up to its version is
        // already durable for this client.
        sync.set_acknowledged_floor(canonical.applied());
        Self {
            document_id,
            clock,
            persistence,
            bus: Arc::new(StateEventBus::new(document_id)),
            stack: CommandStack::new(author_id),
            store,
            canonical,
            optimistic,
            sync,
            autosave: AutoSave::new(config.autosave, config.retry, now),
            presence: PresenceTracker::new(config.presence_timeout_ms),
        }
    }

    /// The document being edited.
    #[must_use]
    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    /// The current graph as the editor sees it: canonical state plus
    /// optimistic pending edits.
    #[must_use]
    pub fn graph(&self) -> &StoryGraph {
        &self.optimistic
    }

    /// Highest canonical sequence reflected locally.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.canonical.applied()
    }

    /// Registers a UI handler for session events.
    pub fn subscribe(&self, handler: impl FnMut(&SessionEvent) + Send + 'static) -> SubscriptionId {
        self.bus.subscribe(handler)
    }

    /// Removes a UI handler.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.bus.unsubscribe(id);
    }

    /// Applies one user edit optimistically: validates it against the
    /// current graph, records it for undo, queues it for push, marks the
    /// document dirty, and fans it out on the bus.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ValidationFailed`] if the edit is invalid
    /// against the current state; nothing is recorded in that case.
    pub fn dispatch(&mut self, kind: CommandKind) -> Result<Command, SyncError> {
        let now = self.clock.now();
        let command = self.stack.create(kind, now);
        self.optimistic.apply_command(&command)?;
        self.stack.record(command.clone());
        self.sync.push_local(command.clone());
        self.autosave.mark_dirty(now);
        self.bus.publish(&SessionEvent::LocalApplied {
            command: command.clone(),
        });
        Ok(command)
    }

    /// Undoes the most recent edit by applying a fresh compensating
    /// command through the normal pipeline. Returns `None` when there is
    /// nothing to undo.
    pub fn undo(&mut self) -> Option<Command> {
        let now = self.clock.now();
        let compensating = self.stack.undo(now)?;
        if let Some(original_id) = compensating.undo_of {
            self.sync.mark_undone(original_id);
        }
        Some(self.apply_compensating(compensating))
    }

    /// Re-applies the most recently undone edit as a fresh compensating
    /// command. Returns `None` when there is nothing to redo.
    pub fn redo(&mut self) -> Option<Command> {
        let compensating = self.stack.redo(self.clock.now())?;
        Some(self.apply_compensating(compensating))
    }

    fn apply_compensating(&mut self, command: Command) -> Command {
        let now = self.clock.now();
        if let Err(err) = self.optimistic.apply_command(&command) {
            // Target vanished under a concurrent structural change; the
            // command still goes to the log and replays as a no-op there.
            tracing::debug!(
                command_id = %command.id,
                error = %err,
                "compensating command no longer applies locally"
            );
        }
        self.sync.push_local(command.clone());
        self.autosave.mark_dirty(now);
        self.bus.publish(&SessionEvent::LocalApplied {
            command: command.clone(),
        });
        command
    }

    /// Commands applied locally that the server has not yet confirmed.
    #[must_use]
    pub fn peek_pending(&self) -> Vec<Command> {
        self.sync.pending_commands()
    }

    /// The durability view of this session.
    #[must_use]
    pub fn reconcile(&self) -> SaveState {
        let mut state = self.sync.reconcile();
        state.dirty = state.dirty || self.autosave.is_dirty();
        state.last_autosave_at = self.autosave.last_save_at();
        state
    }

    /// Presence of other editors on this document.
    #[must_use]
    pub fn peers(&self) -> Vec<PresenceInfo> {
        self.presence.peers().cloned().collect()
    }

    /// Sends the reconnect handshake; the server replies with every event
    /// after our acknowledged sequence before accepting new pushes.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NetworkUnavailable`] if the transport is down.
    pub async fn connect(&mut self, transport: &mut dyn SyncTransport) -> Result<(), SyncError> {
        transport.send(self.sync.hello()).await
    }

    /// When the earliest pending command becomes due for a retry push;
    /// the driver arms its flush timer from this. `None` when nothing is
    /// scheduled.
    #[must_use]
    pub fn next_flush_at(&self) -> Option<DateTime<Utc>> {
        self.sync.next_retry_at()
    }

    /// Pushes due pending commands, if any. A send failure leaves them
    /// queued with backoff; they are never dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NetworkUnavailable`] if the transport is
    /// down; the pending region is unaffected.
    pub async fn flush(&mut self, transport: &mut dyn SyncTransport) -> Result<(), SyncError> {
        if let Some(frame) = self.sync.make_push(self.clock.now()) {
            transport.send(frame).await?;
        }
        Ok(())
    }

    /// Handles one inbound frame from the server.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SequenceGap`] when the canonical stream
    /// skipped past the local cache; the caller should invoke
    /// [`DocumentSession::recover_from_gap`]. Validation rejections are
    /// surfaced as status, not errors.
    pub fn on_frame(&mut self, frame: Frame) -> Result<(), SyncError> {
        match frame {
            Frame::Event { event, .. } => self.on_remote_event(event),
            Frame::Ack {
                command_id,
                server_sequence,
                ..
            } => {
                self.sync.on_ack(command_id, server_sequence);
                self.stack.mark_committed(command_id);
                Ok(())
            }
            Frame::Error {
                command_id: Some(command_id),
                reason,
                ..
            } => {
                // Rejected: drop from retry, roll back the optimistic
                // effect, and surface the reason to subscribers.
                if let Err(err) = self.sync.on_reject(command_id, &reason) {
                    self.bus.publish(&SessionEvent::Rejected {
                        command_id,
                        reason: err.to_string(),
                    });
                }
                self.stack.mark_committed(command_id);
                self.rebuild_optimistic();
                self.bus.publish(&SessionEvent::SaveStatus {
                    state: self.reconcile(),
                });
                Ok(())
            }
            Frame::Error {
                command_id: None,
                reason,
                ..
            } => {
                tracing::warn!(document_id = %self.document_id, reason, "server error");
                Ok(())
            }
            Frame::Presence { presence, .. } => {
                self.presence.observe(presence);
                self.presence.sweep(self.clock.now());
                Ok(())
            }
            Frame::Hello { .. } | Frame::Push { .. } => {
                tracing::warn!(document_id = %self.document_id, "unexpected client-bound frame");
                Ok(())
            }
        }
    }

    fn on_remote_event(&mut self, event: Event) -> Result<(), SyncError> {
        // Duplicate delivery: the canonical stream already covered this
        // sequence locally.
        if self.sync.is_duplicate(&event) || !self.store.ingest(event.clone())? {
            return Ok(());
        }
        self.canonical.apply_event(&event)?;

        // Rebase the queued commands (acknowledged echoes still in
        // flight included) against the new base state.
        let outcome = ConflictResolver::merge(
            &self.sync.queued_commands(),
            std::slice::from_ref(&event),
            &storyloom_core::version::VersionVector::new(),
        );
        self.sync.apply_rebase(&outcome.rebased);
        self.sync.observe_remote(&event);
        self.rebuild_optimistic();
        self.autosave.mark_dirty(self.clock.now());
        self.bus.publish(&SessionEvent::Committed { event });
        Ok(())
    }

    /// Rebuilds the optimistic graph as canonical state plus the pending
    /// commands that still apply.
    fn rebuild_optimistic(&mut self) {
        let mut graph = self.canonical.graph().clone();
        for entry in self.sync.pending() {
            if entry.noop.is_some() {
                continue;
            }
            if let Err(err) = graph.apply_command(&entry.command) {
                tracing::debug!(
                    command_id = %entry.command.id,
                    error = %err,
                    "pending command skipped during optimistic rebuild"
                );
            }
        }
        self.optimistic = graph;
    }

    /// Recovers from a detected sequence gap by reloading the latest
    /// snapshot and requesting catch-up from its version.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::PersistenceFailure`] if no snapshot can be
    /// loaded; the session cannot continue without one.
    pub async fn recover_from_gap(
        &mut self,
        transport: &mut dyn SyncTransport,
    ) -> Result<(), SyncError> {
        let snapshot = self
            .persistence
            .load_snapshot(self.document_id)
            .await?
            .ok_or_else(|| {
                SyncError::PersistenceFailure("no snapshot available for gap recovery".to_owned())
            })?;
        tracing::info!(
            document_id = %self.document_id,
            version = snapshot.version,
            "recovering from sequence gap via snapshot reload"
        );
        self.store = EventStore::resume(self.document_id, snapshot.version);
        self.canonical = MaterializedState::from_snapshot(snapshot);
        self.sync.set_acknowledged_floor(self.canonical.applied());
        self.rebuild_optimistic();
        self.connect(transport).await
    }

    /// Runs one autosave decision: fires a commit to the persistence
    /// collaborator when the debounce window or forced-checkpoint
    /// interval says so. Safe to call on every timer tick.
    pub async fn autosave_tick(&mut self) {
        let now = self.clock.now();
        if let Some(trigger) = self.autosave.tick(now) {
            tracing::debug!(document_id = %self.document_id, ?trigger, "autosave firing");
            let result = self
                .persistence
                .commit(self.document_id, self.sync.last_acknowledged_sequence())
                .await;
            self.autosave.on_save_result(self.clock.now(), result);
            self.bus.publish(&SessionEvent::SaveStatus {
                state: self.reconcile(),
            });
        }
    }

    /// Closes the session: a dirty document gets one final save attempt
    /// bounded by `grace`; on timeout or failure the document is marked
    /// dirty-on-exit for resumption. The bus is torn down with the
    /// session.
    pub async fn close(mut self, grace: std::time::Duration) -> SaveState {
        if self.autosave.is_dirty() {
            let commit = self
                .persistence
                .commit(self.document_id, self.sync.last_acknowledged_sequence());
            match tokio::time::timeout(grace, commit).await {
                Ok(Ok(())) => {
                    self.autosave.on_save_result(self.clock.now(), Ok(()));
                }
                Ok(Err(err)) => {
                    tracing::warn!(document_id = %self.document_id, error = %err, "final save failed; dirty on exit");
                    self.autosave.on_save_result(self.clock.now(), Err(err));
                }
                Err(_) => {
                    tracing::warn!(document_id = %self.document_id, "final save timed out; dirty on exit");
                }
            }
        }
        self.reconcile()
    }
}
