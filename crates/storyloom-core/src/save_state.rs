//! Per-client durability bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::Command;

/// Snapshot of a client's durability position for one document.
///
/// Mutated only by the sync manager and the autosave engine; the UI reads
/// it to render save status but never writes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    /// Whether local committed state has outrun the last durable save.
    pub dirty: bool,
    /// Highest server sequence confirmed durable for this client.
    pub last_acknowledged_sequence: u64,
    /// Commands applied optimistically but not yet acknowledged.
    pub pending: Vec<Command>,
    /// When the last successful autosave completed.
    pub last_autosave_at: Option<DateTime<Utc>>,
}
