//! Storyloom Sync — the collaborative state-synchronization core.
//!
//! Turns a user's edit to the story graph into a durable, undoable,
//! conflict-resolved, eventually consistent piece of shared state:
//!
//! UI action → [`command_stack::CommandStack`] (local apply + undo
//! history) → [`event_store::EventStore`] (append) → [`bus::StateEventBus`]
//! (fan-out) → {[`sync_manager::SyncManager`] (network queue),
//! [`autosave::AutoSave`] (dirty tracking), [`presence::PresenceTracker`]
//! (unaffected)}. Inbound frames enter through the sync manager, pass the
//! [`conflict::ConflictResolver`] when unsynced local edits exist, and
//! fan back out as committed events.

pub mod autosave;
pub mod bus;
pub mod command_stack;
pub mod conflict;
pub mod event_store;
pub mod presence;
pub mod session;
pub mod sync_manager;
pub mod wire;
