//! Bidirectional state reconciliation.
//!
//! The sync manager owns the boundary between the acknowledged region of
//! local history (confirmed durable by the server) and the pending region
//! (applied optimistically, awaiting confirmation). It decides what goes
//! on the wire and when; actual network I/O happens in the session driver
//! so all state mutation here stays on one logical task.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use storyloom_core::command::Command;
use storyloom_core::error::SyncError;
use storyloom_core::event::{Event, NoopReason};
use storyloom_core::save_state::SaveState;
use storyloom_core::version::VersionVector;

use crate::conflict::RebasedCommand;
use crate::wire::Frame;

/// Exponential backoff schedule for failed pushes, bounded by a maximum
/// retry interval. Pushes are never silently dropped.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// First retry delay in milliseconds.
    pub base_ms: i64,
    /// Upper bound on the retry delay in milliseconds.
    pub max_ms: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_ms: 500,
            max_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, given how many have failed so far.
    #[must_use]
    pub fn delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        let ms = self
            .base_ms
            .saturating_mul(1_i64 << exponent)
            .min(self.max_ms);
        Duration::milliseconds(ms)
    }
}

/// A command in the pending region of local history.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    /// The optimistically applied command.
    pub command: Command,
    /// Set once a concurrent structural change rebased this command to a
    /// no-op; it is still pushed so the log records it.
    pub noop: Option<NoopReason>,
    /// Delivery attempts so far.
    pub attempts: u32,
    /// Earliest time the next delivery attempt may run.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// The server confirmed this command but its canonical event has not
    /// been ingested yet. Not retried, not reported unsaved, but still
    /// part of the optimistic graph until the event arrives.
    pub acknowledged: bool,
}

/// Result of processing a server acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The command moved from pending to acknowledged.
    Promoted,
    /// The command was undone while in flight; the acknowledgment is
    /// recorded but the effect is not reapplied.
    PromotedUndone,
    /// No pending command matches; a duplicate or stale acknowledgment.
    Unknown,
}

/// Reconciles local optimistic state against the authoritative server
/// stream for one document.
#[derive(Debug)]
pub struct SyncManager {
    document_id: Uuid,
    author_id: Uuid,
    last_acknowledged_sequence: u64,
    pending: VecDeque<PendingEntry>,
    /// Commands undone locally before their acknowledgment arrived.
    undone: HashSet<Uuid>,
    /// Causal versions reflected in local state, sent with every push.
    seen: VersionVector,
    retry: RetryPolicy,
}

impl SyncManager {
    /// Creates a manager for one author editing one document.
    #[must_use]
    pub fn new(document_id: Uuid, author_id: Uuid, retry: RetryPolicy) -> Self {
        Self {
            document_id,
            author_id,
            last_acknowledged_sequence: 0,
            pending: VecDeque::new(),
            undone: HashSet::new(),
            seen: VersionVector::new(),
            retry,
        }
    }

    /// Highest server sequence confirmed durable for this client.
    #[must_use]
    pub fn last_acknowledged_sequence(&self) -> u64 {
        self.last_acknowledged_sequence
    }

    /// Raises the acknowledged floor, used when resuming from a snapshot
    /// whose version is already durable. Never lowers it.
    pub fn set_acknowledged_floor(&mut self, sequence: u64) {
        self.last_acknowledged_sequence = self.last_acknowledged_sequence.max(sequence);
    }

    /// The causal versions reflected in local state.
    #[must_use]
    pub fn seen(&self) -> &VersionVector {
        &self.seen
    }

    /// The pending region, in push order.
    #[must_use]
    pub fn pending(&self) -> &VecDeque<PendingEntry> {
        &self.pending
    }

    /// Commands not yet acknowledged by the server, in push order.
    #[must_use]
    pub fn pending_commands(&self) -> Vec<Command> {
        self.pending
            .iter()
            .filter(|e| !e.acknowledged)
            .map(|e| e.command.clone())
            .collect()
    }

    /// Every command still awaiting its canonical event, acknowledged or
    /// not, in push order. This is the set the optimistic graph replays
    /// on top of the canonical state.
    #[must_use]
    pub fn queued_commands(&self) -> Vec<Command> {
        self.pending.iter().map(|e| e.command.clone()).collect()
    }

    /// Appends a locally applied command to the pending region.
    pub fn push_local(&mut self, command: Command) {
        self.seen.observe(command.author_id, command.local_sequence);
        self.pending.push_back(PendingEntry {
            command,
            noop: None,
            attempts: 0,
            next_attempt_at: None,
            acknowledged: false,
        });
    }

    /// Builds the next push frame, if any pending command is due. Each
    /// included command's retry clock is advanced with exponential
    /// backoff, so an unacknowledged push is retried rather than dropped.
    pub fn make_push(&mut self, now: DateTime<Utc>) -> Option<Frame> {
        let mut commands = Vec::new();
        for entry in &mut self.pending {
            if entry.acknowledged {
                continue;
            }
            let due = entry.next_attempt_at.is_none_or(|at| at <= now);
            if due {
                entry.attempts += 1;
                entry.next_attempt_at = Some(now + self.retry.delay(entry.attempts));
                commands.push(entry.command.clone());
            }
        }
        if commands.is_empty() {
            return None;
        }
        tracing::debug!(
            document_id = %self.document_id,
            count = commands.len(),
            "pushing pending commands"
        );
        Some(Frame::Push {
            document_id: self.document_id,
            commands,
            version_vector: self.seen.clone(),
        })
    }

    /// Earliest time a pending command becomes due again, if any.
    #[must_use]
    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.pending.iter().filter_map(|e| e.next_attempt_at).min()
    }

    /// The catch-up handshake frame sent on (re)connect: the server
    /// replies with every event after `last_acknowledged_sequence` before
    /// accepting new pushes.
    #[must_use]
    pub fn hello(&self) -> Frame {
        Frame::Hello {
            document_id: self.document_id,
            last_acknowledged_sequence: self.last_acknowledged_sequence,
        }
    }

    /// Records that a command was undone locally before its
    /// acknowledgment arrived. The later acknowledgment is matched by
    /// command id and must not reapply the effect.
    pub fn mark_undone(&mut self, command_id: Uuid) {
        if self.pending.iter().any(|e| e.command.id == command_id) {
            self.undone.insert(command_id);
        }
    }

    /// Processes a server acknowledgment, promoting the command off the
    /// retry queue and out of the unsaved set.
    ///
    /// The entry stays queued until its canonical event arrives in the
    /// stream: between the ack and the echo the edit lives in neither the
    /// canonical log nor the unacknowledged set, and dropping it here
    /// would make it vanish from the optimistic graph on the next rebuild.
    ///
    /// The acknowledged-sequence watermark is NOT advanced here either:
    /// the ack can outrun canonical events this client has not ingested
    /// yet, and the watermark must stay contiguous with the local event
    /// cache. Both resolve when the event itself is observed.
    pub fn on_ack(&mut self, command_id: Uuid, server_sequence: u64) -> AckOutcome {
        let Some(entry) = self
            .pending
            .iter_mut()
            .find(|e| e.command.id == command_id && !e.acknowledged)
        else {
            return AckOutcome::Unknown;
        };
        entry.acknowledged = true;
        entry.next_attempt_at = None;
        tracing::debug!(
            document_id = %self.document_id,
            %command_id,
            server_sequence,
            "command acknowledged"
        );
        if self.undone.contains(&command_id) {
            AckOutcome::PromotedUndone
        } else {
            AckOutcome::Promoted
        }
    }

    /// Processes an explicit server rejection: the command leaves the
    /// retry queue and the failure surfaces to autosave/UI instead of
    /// being retried.
    ///
    /// # Errors
    ///
    /// Always returns [`SyncError::ValidationFailed`] carrying the
    /// server's reason; the caller surfaces it.
    pub fn on_reject(&mut self, command_id: Uuid, reason: &str) -> Result<(), SyncError> {
        self.pending.retain(|e| e.command.id != command_id);
        self.undone.remove(&command_id);
        tracing::warn!(
            document_id = %self.document_id,
            %command_id,
            reason,
            "server rejected command"
        );
        Err(SyncError::ValidationFailed(reason.to_owned()))
    }

    /// Whether the canonical event is already reflected locally and can
    /// be discarded (duplicate-delivery tolerance).
    #[must_use]
    pub fn is_duplicate(&self, event: &Event) -> bool {
        event.server_sequence <= self.last_acknowledged_sequence
    }

    /// Records a canonical event observed from the server stream. An
    /// event authored by this client is an implicit acknowledgment of the
    /// matching pending command.
    pub fn observe_remote(&mut self, event: &Event) {
        self.seen.merge(&event.causal_version);
        self.last_acknowledged_sequence =
            self.last_acknowledged_sequence.max(event.server_sequence);
        if event.command.author_id == self.author_id {
            let command_id = event.command.id;
            self.pending.retain(|e| e.command.id != command_id);
            self.undone.remove(&command_id);
        }
    }

    /// Applies a rebase computed by the conflict resolver to the pending
    /// region, marking no-op commands without dropping them.
    pub fn apply_rebase(&mut self, rebased: &[RebasedCommand]) {
        for rb in rebased {
            if rb.noop.is_some()
                && let Some(entry) = self
                    .pending
                    .iter_mut()
                    .find(|e| e.command.id == rb.command.id)
            {
                entry.noop = rb.noop;
            }
        }
    }

    /// Assembles the durability view of this client's history. The
    /// session overlays autosave's dirty flag and timestamp.
    #[must_use]
    pub fn reconcile(&self) -> SaveState {
        let pending = self.pending_commands();
        SaveState {
            dirty: !pending.is_empty(),
            last_acknowledged_sequence: self.last_acknowledged_sequence,
            pending,
            last_autosave_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use storyloom_core::command::CommandKind;
    use storyloom_core::event::Resolution;
    use storyloom_core::graph::{NodeKind, Position, StoryNode};

    fn t(seconds: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, seconds).unwrap()
    }

    fn add_command(author: Uuid, seq: u64) -> Command {
        Command::new(
            author,
            seq,
            t(0),
            CommandKind::AddNode {
                node: StoryNode {
                    id: Uuid::new_v4(),
                    kind: NodeKind::Scene,
                    title: "scene".to_owned(),
                    body: String::new(),
                    position: Position::default(),
                },
                edges: vec![],
            },
        )
    }

    fn manager() -> (SyncManager, Uuid) {
        let author = Uuid::new_v4();
        (
            SyncManager::new(Uuid::new_v4(), author, RetryPolicy::default()),
            author,
        )
    }

    #[test]
    fn test_backoff_is_exponential_and_bounded() {
        let policy = RetryPolicy {
            base_ms: 500,
            max_ms: 4_000,
        };
        assert_eq!(policy.delay(1), Duration::milliseconds(500));
        assert_eq!(policy.delay(2), Duration::milliseconds(1_000));
        assert_eq!(policy.delay(3), Duration::milliseconds(2_000));
        assert_eq!(policy.delay(4), Duration::milliseconds(4_000));
        assert_eq!(policy.delay(10), Duration::milliseconds(4_000));
    }

    #[test]
    fn test_push_includes_due_commands_and_schedules_retry() {
        let (mut sync, author) = manager();
        sync.push_local(add_command(author, 1));

        let frame = sync.make_push(t(0)).unwrap();
        let Frame::Push { commands, .. } = frame else {
            panic!("expected push frame");
        };
        assert_eq!(commands.len(), 1);

        // Not due again until the backoff elapses.
        assert!(sync.make_push(t(0)).is_none());
        assert!(sync.make_push(t(1)).is_some());
    }

    #[test]
    fn test_ack_promotes_pending_out_of_retry() {
        let (mut sync, author) = manager();
        let command = add_command(author, 1);
        let id = command.id;
        sync.push_local(command);

        assert_eq!(sync.on_ack(id, 7), AckOutcome::Promoted);
        // No longer retried, no longer unsaved, but still queued for the
        // optimistic graph until the canonical event arrives.
        assert!(sync.make_push(t(0)).is_none());
        assert!(sync.pending_commands().is_empty());
        assert!(!sync.reconcile().dirty);
        assert_eq!(sync.queued_commands().len(), 1);
        // The watermark waits for the event itself; an ack can arrive
        // ahead of canonical events this client has not seen.
        assert_eq!(sync.last_acknowledged_sequence(), 0);
        assert_eq!(sync.on_ack(id, 7), AckOutcome::Unknown);
    }

    #[test]
    fn test_ack_for_undone_command_is_not_reapplied() {
        let (mut sync, author) = manager();
        let command = add_command(author, 1);
        let id = command.id;
        sync.push_local(command);
        sync.mark_undone(id);

        assert_eq!(sync.on_ack(id, 3), AckOutcome::PromotedUndone);
        assert!(sync.pending_commands().is_empty());
    }

    #[test]
    fn test_next_retry_at_tracks_the_earliest_due_entry() {
        let (mut sync, author) = manager();
        assert!(sync.next_retry_at().is_none());

        let command = add_command(author, 1);
        let id = command.id;
        sync.push_local(command);
        sync.make_push(t(0)).unwrap();
        assert_eq!(
            sync.next_retry_at(),
            Some(t(0) + RetryPolicy::default().delay(1))
        );

        sync.on_ack(id, 1);
        assert!(sync.next_retry_at().is_none());
    }

    #[test]
    fn test_rejection_removes_command_and_surfaces_error() {
        let (mut sync, author) = manager();
        let command = add_command(author, 1);
        let id = command.id;
        sync.push_local(command);

        let err = sync.on_reject(id, "node already exists").unwrap_err();
        assert!(matches!(err, SyncError::ValidationFailed(_)));
        assert!(sync.pending().is_empty());
        // Rejected commands never re-enter the retry queue.
        assert!(sync.make_push(t(10)).is_none());
    }

    #[test]
    fn test_own_event_in_stream_is_an_implicit_ack() {
        let (mut sync, author) = manager();
        let command = add_command(author, 1);
        sync.push_local(command.clone());

        let mut causal_version = VersionVector::new();
        causal_version.observe(author, 1);
        let event = Event {
            server_sequence: 1,
            document_id: sync.document_id,
            command,
            causal_version,
            accepted_at: t(1),
            resolution: Resolution::Applied,
        };
        sync.observe_remote(&event);
        assert!(sync.pending().is_empty());
        assert_eq!(sync.last_acknowledged_sequence(), 1);
        assert!(sync.is_duplicate(&event));
    }

    #[test]
    fn test_reconcile_reports_pending_region() {
        let (mut sync, author) = manager();
        sync.push_local(add_command(author, 1));
        sync.push_local(add_command(author, 2));

        let state = sync.reconcile();
        assert!(state.dirty);
        assert_eq!(state.pending.len(), 2);
        assert_eq!(state.last_acknowledged_sequence, 0);
    }
}
