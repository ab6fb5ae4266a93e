//! Per-session undo/redo history.
//!
//! History is an arena of immutable commands with index-based undo and
//! redo stacks, which keeps ownership simple and leaves the arena
//! serializable for crash recovery. Undo and redo never delete history:
//! each emits a fresh compensating command carrying `undo_of`, so the
//! event log stays append-only even under undo.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use storyloom_core::command::{Command, CommandKind};

/// Linear undo/redo history for one author's editing session.
#[derive(Debug)]
pub struct CommandStack {
    author_id: Uuid,
    /// Every command recorded this session, in record order. Immutable
    /// once pushed.
    arena: Vec<Command>,
    /// Indices into `arena` eligible for undo, most recent last.
    undo: Vec<usize>,
    /// Indices into `arena` eligible for redo, most recently undone last.
    redo: Vec<usize>,
    /// Arena commands confirmed durable by the server.
    committed: HashSet<Uuid>,
    next_local_sequence: u64,
}

impl CommandStack {
    /// Creates an empty history for an author.
    #[must_use]
    pub fn new(author_id: Uuid) -> Self {
        Self {
            author_id,
            arena: Vec::new(),
            undo: Vec::new(),
            redo: Vec::new(),
            committed: HashSet::new(),
            next_local_sequence: 0,
        }
    }

    /// The author owning this history.
    #[must_use]
    pub fn author_id(&self) -> Uuid {
        self.author_id
    }

    /// Mints the next local sequence number for this author's stream.
    pub fn next_sequence(&mut self) -> u64 {
        self.next_local_sequence += 1;
        self.next_local_sequence
    }

    /// Builds a fresh command for a direct user edit, assigning its local
    /// sequence from this author's stream.
    pub fn create(&mut self, kind: CommandKind, now: DateTime<Utc>) -> Command {
        let sequence = self.next_sequence();
        Command::new(self.author_id, sequence, now, kind)
    }

    /// Records a successfully applied command. A fresh edit discards any
    /// redo branch (standard linear-history discipline).
    pub fn record(&mut self, command: Command) {
        self.redo.clear();
        self.undo.push(self.arena.len());
        self.arena.push(command);
    }

    /// Pops the most recent command and returns the compensating command
    /// that reverses it. Returns `None` on an empty stack — a normal
    /// boundary condition, not an error.
    pub fn undo(&mut self, now: DateTime<Utc>) -> Option<Command> {
        let index = self.undo.pop()?;
        self.redo.push(index);
        let sequence = self.next_sequence();
        let original = &self.arena[index];
        Some(Command::compensating(
            original.id,
            self.author_id,
            sequence,
            now,
            original.kind.inverse(),
        ))
    }

    /// Re-applies the most recently undone command as a fresh
    /// compensating command. Returns `None` when there is nothing to redo.
    pub fn redo(&mut self, now: DateTime<Utc>) -> Option<Command> {
        let index = self.redo.pop()?;
        self.undo.push(index);
        let sequence = self.next_sequence();
        let original = &self.arena[index];
        Some(Command::compensating(
            original.id,
            self.author_id,
            sequence,
            now,
            original.kind.clone(),
        ))
    }

    /// Marks a recorded command as committed (durable at the server).
    pub fn mark_committed(&mut self, command_id: Uuid) {
        self.committed.insert(command_id);
    }

    /// Commands recorded this session that the server has not yet
    /// confirmed, in record order.
    #[must_use]
    pub fn peek_pending(&self) -> Vec<&Command> {
        self.arena
            .iter()
            .filter(|c| !self.committed.contains(&c.id))
            .collect()
    }

    /// Number of commands available to undo.
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Number of commands available to redo.
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyloom_core::graph::{NodeKind, Position, StoryNode};

    fn move_kind(node_id: Uuid, to_x: f64) -> CommandKind {
        CommandKind::MoveNode {
            node_id,
            from: Position::default(),
            to: Position::new(to_x, 0.0),
        }
    }

    fn add_kind() -> CommandKind {
        CommandKind::AddNode {
            node: StoryNode {
                id: Uuid::new_v4(),
                kind: NodeKind::Scene,
                title: "scene".to_owned(),
                body: String::new(),
                position: Position::default(),
            },
            edges: vec![],
        }
    }

    #[test]
    fn test_undo_on_empty_stack_returns_none() {
        let mut stack = CommandStack::new(Uuid::new_v4());
        assert!(stack.undo(Utc::now()).is_none());
        assert!(stack.redo(Utc::now()).is_none());
    }

    #[test]
    fn test_undo_emits_compensating_inverse_with_fresh_identity() {
        let mut stack = CommandStack::new(Uuid::new_v4());
        let node_id = Uuid::new_v4();
        let original = stack.create(move_kind(node_id, 10.0), Utc::now());
        stack.record(original.clone());

        let undo = stack.undo(Utc::now()).unwrap();
        assert_eq!(undo.undo_of, Some(original.id));
        assert_ne!(undo.id, original.id);
        assert_eq!(undo.kind, original.kind.inverse());
        assert!(undo.local_sequence > original.local_sequence);
    }

    #[test]
    fn test_redo_replays_forward_kind_as_new_command() {
        let mut stack = CommandStack::new(Uuid::new_v4());
        let original = stack.create(add_kind(), Utc::now());
        stack.record(original.clone());

        stack.undo(Utc::now()).unwrap();
        let redo = stack.redo(Utc::now()).unwrap();
        assert_eq!(redo.kind, original.kind);
        assert_eq!(redo.undo_of, Some(original.id));
        assert_eq!(stack.redo_depth(), 0);
        assert_eq!(stack.undo_depth(), 1);
    }

    #[test]
    fn test_fresh_edit_discards_redo_branch() {
        let mut stack = CommandStack::new(Uuid::new_v4());
        let first = stack.create(add_kind(), Utc::now());
        stack.record(first);
        stack.undo(Utc::now()).unwrap();
        assert_eq!(stack.redo_depth(), 1);

        let second = stack.create(add_kind(), Utc::now());
        stack.record(second);
        assert_eq!(stack.redo_depth(), 0);
        assert!(stack.redo(Utc::now()).is_none());
    }

    #[test]
    fn test_peek_pending_tracks_commitment() {
        let mut stack = CommandStack::new(Uuid::new_v4());
        let first = stack.create(add_kind(), Utc::now());
        let second = stack.create(add_kind(), Utc::now());
        stack.record(first.clone());
        stack.record(second.clone());
        assert_eq!(stack.peek_pending().len(), 2);

        stack.mark_committed(first.id);
        let pending = stack.peek_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
    }

    #[test]
    fn test_local_sequences_are_strictly_increasing_across_undo() {
        let mut stack = CommandStack::new(Uuid::new_v4());
        let a = stack.create(add_kind(), Utc::now());
        stack.record(a.clone());
        let undo = stack.undo(Utc::now()).unwrap();
        let redo = stack.redo(Utc::now()).unwrap();
        assert!(a.local_sequence < undo.local_sequence);
        assert!(undo.local_sequence < redo.local_sequence);
    }
}
