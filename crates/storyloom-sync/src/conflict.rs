//! Deterministic conflict resolution.
//!
//! Two commands are concurrent when neither's causal version dominates
//! the other's. Concurrent commands on disjoint `(entity, slot)` keys
//! commute and need no resolution. Same-slot conflicts resolve
//! last-writer-wins on the `(accepted_at, author_id)` stamp — author ids
//! are globally unique, so the order is total. Structural conflicts use
//! delete-dominates: an edit racing a removal becomes a no-op event
//! carrying a target-removed marker instead of resurrecting the entity.
//! Losers are never dropped from history.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use storyloom_core::command::{Command, CommandKind};
use storyloom_core::event::{Event, NoopReason, Resolution};
use storyloom_core::version::VersionVector;

/// Disposition of an incoming command against the authoritative log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAppend {
    /// How the command should be recorded.
    pub resolution: Resolution,
    /// Sequences of earlier events this command retroactively supersedes.
    pub supersedes: Vec<u64>,
}

/// A pending local command after rebasing onto a newer base state.
#[derive(Debug, Clone, PartialEq)]
pub struct RebasedCommand {
    /// The pending command, payload untouched.
    pub command: Command,
    /// Set when the command's preconditions no longer hold and it must
    /// replay as a no-op.
    pub noop: Option<NoopReason>,
}

/// Result of merging remote events into a client with unsynced edits.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Remote events to apply, duplicates already filtered out.
    pub events: Vec<Event>,
    /// The pending queue, rebased against the incoming events.
    pub rebased: Vec<RebasedCommand>,
}

/// Stateless resolver shared by the server append path and the client
/// merge path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    /// Server side: decides how an incoming command lands in the log.
    ///
    /// `sender_version` is the version vector the author sent with the
    /// push — everything the author had observed when editing. Events the
    /// sender had not seen are concurrent with the command.
    #[must_use]
    pub fn resolve_incoming(
        command: &Command,
        sender_version: &VersionVector,
        accepted_at: DateTime<Utc>,
        log: &[Event],
    ) -> ResolvedAppend {
        let concurrent: Vec<&Event> = log
            .iter()
            .filter(|e| {
                e.command.author_id != command.author_id
                    && !sender_version.includes(e.command.author_id, e.command.local_sequence)
            })
            .collect();

        // Delete dominates edit: a concurrent removal of the target turns
        // this command into a no-op rather than resurrecting the entity.
        let removed: HashSet<Uuid> = concurrent
            .iter()
            .filter(|e| e.is_effective())
            .flat_map(|e| e.command.kind.removed_entities())
            .collect();
        if invalidated_by(&command.kind, &removed) {
            return ResolvedAppend {
                resolution: Resolution::Noop {
                    reason: NoopReason::TargetRemoved,
                },
                supersedes: Vec::new(),
            };
        }

        if command.kind.is_removal() {
            return ResolvedAppend {
                resolution: Resolution::Applied,
                supersedes: Vec::new(),
            };
        }

        // Same-slot concurrent writes: total order on (accepted_at, author).
        let incoming_stamp = (accepted_at, command.author_id);
        let key = command.kind.conflict_key();
        let mut supersedes = Vec::new();
        let mut winner: Option<&Event> = None;
        for event in concurrent
            .iter()
            .filter(|e| e.is_effective() && e.command.kind.conflict_key() == key)
        {
            if event.lww_stamp() < incoming_stamp {
                supersedes.push(event.server_sequence);
            } else {
                match winner {
                    Some(w) if w.lww_stamp() >= event.lww_stamp() => {}
                    _ => winner = Some(event),
                }
            }
        }

        match winner {
            Some(w) => ResolvedAppend {
                resolution: Resolution::Superseded { by: w.command.id },
                supersedes: Vec::new(),
            },
            None => ResolvedAppend {
                resolution: Resolution::Applied,
                supersedes,
            },
        }
    }

    /// Client side: merges the canonical event stream into a client that
    /// may hold unsynced local edits.
    ///
    /// Events whose causal version is already covered by `base_version`
    /// are duplicates (redelivery) and are filtered out. Pending commands
    /// whose targets were removed by an incoming effective event are
    /// rebased to no-ops, preserving the invariant that every replayed
    /// payload is valid against the state it applies to.
    #[must_use]
    pub fn merge(
        local_pending: &[Command],
        incoming: &[Event],
        base_version: &VersionVector,
    ) -> MergeOutcome {
        let events: Vec<Event> = incoming
            .iter()
            .filter(|e| !base_version.includes(e.command.author_id, e.command.local_sequence))
            .cloned()
            .collect();

        let removed: HashSet<Uuid> = events
            .iter()
            .filter(|e| e.is_effective())
            .flat_map(|e| e.command.kind.removed_entities())
            .collect();

        let rebased = local_pending
            .iter()
            .map(|command| {
                let noop = if invalidated_by(&command.kind, &removed) {
                    tracing::debug!(
                        command_id = %command.id,
                        command_type = command.kind.command_type(),
                        "pending command rebased to no-op: target removed concurrently"
                    );
                    Some(NoopReason::TargetRemoved)
                } else {
                    None
                };
                RebasedCommand {
                    command: command.clone(),
                    noop,
                }
            })
            .collect();

        MergeOutcome { events, rebased }
    }
}

/// Whether a command's preconditions are broken by the given set of
/// concurrently removed entity ids.
fn invalidated_by(kind: &CommandKind, removed: &HashSet<Uuid>) -> bool {
    if removed.is_empty() {
        return false;
    }
    match kind {
        CommandKind::AddNode { .. } => false,
        CommandKind::AddEdge { edge } => {
            removed.contains(&edge.from) || removed.contains(&edge.to)
        }
        CommandKind::MoveNode { node_id, .. } | CommandKind::EditField { node_id, .. } => {
            removed.contains(node_id)
        }
        CommandKind::RemoveNode { node, .. } => removed.contains(&node.id),
        CommandKind::RemoveEdge { edge } => removed.contains(&edge.id),
    }
}
