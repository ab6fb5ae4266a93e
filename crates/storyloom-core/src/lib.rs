//! Storyloom Core — shared domain types for the blueprint editor.
//!
//! This crate defines the story-graph document model, the reversible
//! command set, the durable event record, and the boundary traits the
//! synchronization core depends on. It contains no infrastructure code.

pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod graph;
pub mod save_state;
pub mod store;
pub mod version;
