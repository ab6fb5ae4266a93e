//! Story graph document model.
//!
//! The blueprint editor manipulates a branching-story graph: scene nodes
//! connected by choice edges. All mutation goes through
//! [`StoryGraph::apply_kind`], which validates preconditions so every
//! applied change is reversible by the command's inverse payload.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::{Command, CommandKind, NodeField};
use crate::error::SyncError;

/// A 2D canvas position for a node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal canvas coordinate.
    pub x: f64,
    /// Vertical canvas coordinate.
    pub y: f64,
}

impl Position {
    /// Creates a position.
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The role a node plays in the story graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A narrative scene with prose content.
    Scene,
    /// A branch point presenting choices.
    Branch,
    /// A terminal ending.
    Ending,
}

/// A single node in the story graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryNode {
    /// Unique node identifier.
    pub id: Uuid,
    /// The node's role in the story.
    pub kind: NodeKind,
    /// Short title shown on the canvas.
    pub title: String,
    /// Prose body of the scene.
    pub body: String,
    /// Canvas position.
    pub position: Position,
}

/// A directed choice edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceEdge {
    /// Unique edge identifier.
    pub id: Uuid,
    /// Source node.
    pub from: Uuid,
    /// Destination node.
    pub to: Uuid,
    /// Choice text shown to the reader.
    pub label: String,
}

/// The shared document: a branching-story node graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryGraph {
    /// Nodes keyed by id.
    pub nodes: HashMap<Uuid, StoryNode>,
    /// Edges keyed by id.
    pub edges: HashMap<Uuid, ChoiceEdge>,
}

impl StoryGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the graph contains the given entity (node or edge) id.
    #[must_use]
    pub fn contains_entity(&self, entity_id: Uuid) -> bool {
        self.nodes.contains_key(&entity_id) || self.edges.contains_key(&entity_id)
    }

    /// Applies a command's forward payload to the graph.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ValidationFailed`] if the command's
    /// preconditions do not hold against the current state.
    pub fn apply_command(&mut self, command: &Command) -> Result<(), SyncError> {
        self.apply_kind(&command.kind)
    }

    /// Applies one command kind to the graph, validating preconditions.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ValidationFailed`] on an unknown target,
    /// duplicate id, or dangling edge endpoint.
    pub fn apply_kind(&mut self, kind: &CommandKind) -> Result<(), SyncError> {
        match kind {
            CommandKind::AddNode { node, edges } => {
                if self.nodes.contains_key(&node.id) {
                    return Err(SyncError::ValidationFailed(format!(
                        "node {} already exists",
                        node.id
                    )));
                }
                self.nodes.insert(node.id, node.clone());
                for edge in edges {
                    self.insert_edge(edge)?;
                }
                Ok(())
            }
            CommandKind::RemoveNode { node, edges } => {
                if self.nodes.remove(&node.id).is_none() {
                    return Err(SyncError::ValidationFailed(format!(
                        "node {} does not exist",
                        node.id
                    )));
                }
                for edge in edges {
                    self.edges.remove(&edge.id);
                }
                Ok(())
            }
            CommandKind::MoveNode { node_id, to, .. } => {
                let node = self.node_mut(*node_id)?;
                node.position = *to;
                Ok(())
            }
            CommandKind::EditField { node_id, field, to, .. } => {
                let node = self.node_mut(*node_id)?;
                match field {
                    NodeField::Title => node.title = to.clone(),
                    NodeField::Body => node.body = to.clone(),
                }
                Ok(())
            }
            CommandKind::AddEdge { edge } => self.insert_edge(edge),
            CommandKind::RemoveEdge { edge } => {
                if self.edges.remove(&edge.id).is_none() {
                    return Err(SyncError::ValidationFailed(format!(
                        "edge {} does not exist",
                        edge.id
                    )));
                }
                Ok(())
            }
        }
    }

    /// Edges incident to the given node, in deterministic id order.
    #[must_use]
    pub fn incident_edges(&self, node_id: Uuid) -> Vec<ChoiceEdge> {
        let mut edges: Vec<ChoiceEdge> = self
            .edges
            .values()
            .filter(|e| e.from == node_id || e.to == node_id)
            .cloned()
            .collect();
        edges.sort_by_key(|e| e.id);
        edges
    }

    fn node_mut(&mut self, node_id: Uuid) -> Result<&mut StoryNode, SyncError> {
        self.nodes
            .get_mut(&node_id)
            .ok_or_else(|| SyncError::ValidationFailed(format!("node {node_id} does not exist")))
    }

    fn insert_edge(&mut self, edge: &ChoiceEdge) -> Result<(), SyncError> {
        if self.edges.contains_key(&edge.id) {
            return Err(SyncError::ValidationFailed(format!(
                "edge {} already exists",
                edge.id
            )));
        }
        if !self.nodes.contains_key(&edge.from) || !self.nodes.contains_key(&edge.to) {
            return Err(SyncError::ValidationFailed(format!(
                "edge {} references a missing node",
                edge.id
            )));
        }
        self.edges.insert(edge.id, edge.clone());
        Ok(())
    }
}
