//! Reversible edit commands.
//!
//! Each [`CommandKind`] variant carries its forward and inverse payloads
//! together, so [`CommandKind::inverse`] is total and pure: for any state
//! `s` a command applies cleanly to, `apply(inverse(c), apply(c, s)) == s`.
//! The variant set is closed; adding a command type is a compile-time
//! checked extension of every match in the system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::graph::{ChoiceEdge, Position, StoryNode};

/// A mutable scalar field of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeField {
    /// The node title.
    Title,
    /// The node prose body.
    Body,
}

/// The logical slot a command writes to, used for conflict detection.
///
/// Two concurrent commands conflict only when they touch the same slot of
/// the same entity; commands on disjoint slots commute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSlot {
    /// Canvas position.
    Position,
    /// A scalar field (title or body).
    Field(NodeField),
    /// Existence of the entity itself (add/remove).
    Structure,
}

/// Conflict key: the `(entity, slot)` pair a command writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConflictKey {
    /// The entity written.
    pub entity_id: Uuid,
    /// The slot written within that entity.
    pub slot: FieldSlot,
}

/// The closed set of graph edits, each with paired forward/inverse data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CommandKind {
    /// Insert a node, restoring any edges severed by a prior removal.
    /// `edges` is empty for a fresh add.
    AddNode {
        /// The node to insert.
        node: StoryNode,
        /// Edges to restore alongside the node.
        edges: Vec<ChoiceEdge>,
    },
    /// Remove a node together with its incident edges, captured so the
    /// inverse can restore them.
    RemoveNode {
        /// The node being removed.
        node: StoryNode,
        /// Incident edges severed by the removal.
        edges: Vec<ChoiceEdge>,
    },
    /// Reposition a node on the canvas.
    MoveNode {
        /// The node to move.
        node_id: Uuid,
        /// Position before the move.
        from: Position,
        /// Position after the move.
        to: Position,
    },
    /// Overwrite a scalar field of a node.
    EditField {
        /// The node edited.
        node_id: Uuid,
        /// Which field is written.
        field: NodeField,
        /// Value before the edit.
        from: String,
        /// Value after the edit.
        to: String,
    },
    /// Insert a choice edge.
    AddEdge {
        /// The edge to insert.
        edge: ChoiceEdge,
    },
    /// Remove a choice edge.
    RemoveEdge {
        /// The edge to remove.
        edge: ChoiceEdge,
    },
}

impl CommandKind {
    /// Returns the pure inverse of this edit.
    #[must_use]
    pub fn inverse(&self) -> Self {
        match self {
            Self::AddNode { node, edges } => Self::RemoveNode {
                node: node.clone(),
                edges: edges.clone(),
            },
            Self::RemoveNode { node, edges } => Self::AddNode {
                node: node.clone(),
                edges: edges.clone(),
            },
            Self::MoveNode { node_id, from, to } => Self::MoveNode {
                node_id: *node_id,
                from: *to,
                to: *from,
            },
            Self::EditField {
                node_id,
                field,
                from,
                to,
            } => Self::EditField {
                node_id: *node_id,
                field: *field,
                from: to.clone(),
                to: from.clone(),
            },
            Self::AddEdge { edge } => Self::RemoveEdge { edge: edge.clone() },
            Self::RemoveEdge { edge } => Self::AddEdge { edge: edge.clone() },
        }
    }

    /// The command type name (for logging and wire routing).
    #[must_use]
    pub fn command_type(&self) -> &'static str {
        match self {
            Self::AddNode { .. } => "blueprint.add_node",
            Self::RemoveNode { .. } => "blueprint.remove_node",
            Self::MoveNode { .. } => "blueprint.move_node",
            Self::EditField { .. } => "blueprint.edit_field",
            Self::AddEdge { .. } => "blueprint.add_edge",
            Self::RemoveEdge { .. } => "blueprint.remove_edge",
        }
    }

    /// The primary entity this command targets.
    #[must_use]
    pub fn target_entity(&self) -> Uuid {
        match self {
            Self::AddNode { node, .. } | Self::RemoveNode { node, .. } => node.id,
            Self::MoveNode { node_id, .. } | Self::EditField { node_id, .. } => *node_id,
            Self::AddEdge { edge } | Self::RemoveEdge { edge } => edge.id,
        }
    }

    /// The `(entity, slot)` conflict key this command writes.
    #[must_use]
    pub fn conflict_key(&self) -> ConflictKey {
        let slot = match self {
            Self::AddNode { .. }
            | Self::RemoveNode { .. }
            | Self::AddEdge { .. }
            | Self::RemoveEdge { .. } => FieldSlot::Structure,
            Self::MoveNode { .. } => FieldSlot::Position,
            Self::EditField { field, .. } => FieldSlot::Field(*field),
        };
        ConflictKey {
            entity_id: self.target_entity(),
            slot,
        }
    }

    /// Whether this command removes its target entity.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        matches!(self, Self::RemoveNode { .. } | Self::RemoveEdge { .. })
    }

    /// Entity ids this command removes from the graph (the node and any
    /// severed edges for a node removal).
    #[must_use]
    pub fn removed_entities(&self) -> Vec<Uuid> {
        match self {
            Self::RemoveNode { node, edges } => {
                let mut ids = vec![node.id];
                ids.extend(edges.iter().map(|e| e.id));
                ids
            }
            Self::RemoveEdge { edge } => vec![edge.id],
            _ => Vec::new(),
        }
    }
}

/// A single user edit: immutable once created, reversible by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Unique command identifier.
    pub id: Uuid,
    /// The author who issued the edit.
    pub author_id: Uuid,
    /// Position in the author's local command stream.
    pub local_sequence: u64,
    /// Wall-clock time at the client when the edit was made.
    pub client_timestamp: DateTime<Utc>,
    /// Set when this command was generated by undo/redo of another
    /// command; history stays append-only even under undo.
    pub undo_of: Option<Uuid>,
    /// The edit itself.
    pub kind: CommandKind,
}

impl Command {
    /// Creates a fresh command for a direct user edit.
    #[must_use]
    pub fn new(
        author_id: Uuid,
        local_sequence: u64,
        client_timestamp: DateTime<Utc>,
        kind: CommandKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id,
            local_sequence,
            client_timestamp,
            undo_of: None,
            kind,
        }
    }

    /// Creates the compensating command emitted by undo/redo of
    /// `original`. Undo passes the inverse kind; redo passes the forward
    /// kind again.
    #[must_use]
    pub fn compensating(
        original_id: Uuid,
        author_id: Uuid,
        local_sequence: u64,
        client_timestamp: DateTime<Utc>,
        kind: CommandKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id,
            local_sequence,
            client_timestamp,
            undo_of: Some(original_id),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeKind, StoryGraph};

    fn node(title: &str) -> StoryNode {
        StoryNode {
            id: Uuid::new_v4(),
            kind: NodeKind::Scene,
            title: title.to_owned(),
            body: String::new(),
            position: Position::new(0.0, 0.0),
        }
    }

    fn edge(from: Uuid, to: Uuid) -> ChoiceEdge {
        ChoiceEdge {
            id: Uuid::new_v4(),
            from,
            to,
            label: "choice".to_owned(),
        }
    }

    /// Builds a graph with two connected nodes and returns representative
    /// commands valid against it, one per kind.
    fn commands_against(graph: &StoryGraph, a: &StoryNode, b: &StoryNode) -> Vec<CommandKind> {
        let existing_edge = graph.edges.values().next().cloned().unwrap();
        vec![
            CommandKind::AddNode {
                node: node("fresh"),
                edges: vec![],
            },
            CommandKind::RemoveNode {
                node: a.clone(),
                edges: graph.incident_edges(a.id),
            },
            CommandKind::MoveNode {
                node_id: b.id,
                from: b.position,
                to: Position::new(40.0, 8.0),
            },
            CommandKind::EditField {
                node_id: b.id,
                field: NodeField::Title,
                from: b.title.clone(),
                to: "revised".to_owned(),
            },
            CommandKind::AddEdge {
                edge: edge(b.id, a.id),
            },
            CommandKind::RemoveEdge {
                edge: existing_edge,
            },
        ]
    }

    #[test]
    fn test_apply_inverse_apply_restores_state_for_every_kind() {
        let a = node("intro");
        let b = node("cavern");
        let mut graph = StoryGraph::new();
        graph
            .apply_kind(&CommandKind::AddNode {
                node: a.clone(),
                edges: vec![],
            })
            .unwrap();
        graph
            .apply_kind(&CommandKind::AddNode {
                node: b.clone(),
                edges: vec![],
            })
            .unwrap();
        graph
            .apply_kind(&CommandKind::AddEdge {
                edge: edge(a.id, b.id),
            })
            .unwrap();

        for kind in commands_against(&graph, &a, &b) {
            let before = graph.clone();
            let mut after = graph.clone();
            after.apply_kind(&kind).unwrap();
            after.apply_kind(&kind.inverse()).unwrap();
            assert_eq!(after, before, "inverse did not restore {}", kind.command_type());
        }
    }

    #[test]
    fn test_inverse_is_an_involution() {
        let n = node("solo");
        let kind = CommandKind::MoveNode {
            node_id: n.id,
            from: Position::new(1.0, 2.0),
            to: Position::new(3.0, 4.0),
        };
        assert_eq!(kind.inverse().inverse(), kind);
    }

    #[test]
    fn test_conflict_keys_distinguish_fields_of_the_same_node() {
        let id = Uuid::new_v4();
        let title = CommandKind::EditField {
            node_id: id,
            field: NodeField::Title,
            from: String::new(),
            to: "a".to_owned(),
        };
        let body = CommandKind::EditField {
            node_id: id,
            field: NodeField::Body,
            from: String::new(),
            to: "b".to_owned(),
        };
        let mv = CommandKind::MoveNode {
            node_id: id,
            from: Position::default(),
            to: Position::new(1.0, 1.0),
        };
        assert_ne!(title.conflict_key(), body.conflict_key());
        assert_ne!(title.conflict_key(), mv.conflict_key());
        assert_eq!(mv.conflict_key(), mv.conflict_key());
    }

    #[test]
    fn test_remove_node_lists_severed_edges_as_removed_entities() {
        let n = node("hub");
        let e = edge(n.id, Uuid::new_v4());
        let kind = CommandKind::RemoveNode {
            node: n.clone(),
            edges: vec![e.clone()],
        };
        assert_eq!(kind.removed_entities(), vec![n.id, e.id]);
        assert!(kind.is_removal());
    }
}
