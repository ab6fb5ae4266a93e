//! Wire protocol frames and the transport boundary.
//!
//! Frames are JSON-serializable and tagged by type so either end can
//! route without peeking at payloads. The core never touches sockets:
//! it speaks [`SyncTransport`], which the server crate adapts to
//! WebSockets and tests back with in-memory channels.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storyloom_core::command::Command;
use storyloom_core::error::SyncError;
use storyloom_core::event::Event;
use storyloom_core::version::VersionVector;

use crate::presence::PresenceInfo;

/// A single message on the bidirectional sync channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Client → server on (re)connect: requests catch-up from the given
    /// sequence before any new pushes are accepted.
    Hello {
        /// The document being opened.
        document_id: Uuid,
        /// Highest sequence the client already holds.
        last_acknowledged_sequence: u64,
    },
    /// Client → server: one or more commands plus the sender's last-known
    /// version vector.
    Push {
        /// The document edited.
        document_id: Uuid,
        /// Commands in the author's local order.
        commands: Vec<Command>,
        /// Everything the sender had observed when editing.
        version_vector: VersionVector,
    },
    /// Server → pushing client: a command is durable.
    Ack {
        /// The document.
        document_id: Uuid,
        /// The acknowledged command.
        command_id: Uuid,
        /// The sequence the command landed at.
        server_sequence: u64,
    },
    /// Server → all clients: one canonical event.
    Event {
        /// The document.
        document_id: Uuid,
        /// The event.
        event: Event,
    },
    /// Either direction: ephemeral collaborator metadata. Never
    /// persisted, never version-numbered.
    Presence {
        /// The document.
        document_id: Uuid,
        /// The collaborator's state.
        presence: PresenceInfo,
    },
    /// Server → client: a push was rejected.
    Error {
        /// The document.
        document_id: Uuid,
        /// The rejected command, when the failure is per-command.
        command_id: Option<Uuid>,
        /// Human-readable rejection reason.
        reason: String,
    },
}

impl Frame {
    /// The document a frame belongs to.
    #[must_use]
    pub fn document_id(&self) -> Uuid {
        match self {
            Self::Hello { document_id, .. }
            | Self::Push { document_id, .. }
            | Self::Ack { document_id, .. }
            | Self::Event { document_id, .. }
            | Self::Presence { document_id, .. }
            | Self::Error { document_id, .. } => *document_id,
        }
    }
}

/// The bidirectional message channel the sync core drives.
#[async_trait]
pub trait SyncTransport: Send {
    /// Sends one frame.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NetworkUnavailable`] if the channel is down;
    /// the caller queues the content for retry.
    async fn send(&mut self, frame: Frame) -> Result<(), SyncError>;

    /// Receives the next frame, or `None` once the channel is closed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NetworkUnavailable`] on a broken channel.
    async fn recv(&mut self) -> Result<Option<Frame>, SyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_round_trip_through_json_with_type_tags() {
        let frame = Frame::Ack {
            document_id: Uuid::new_v4(),
            command_id: Uuid::new_v4(),
            server_sequence: 12,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "ack");
        assert_eq!(json["server_sequence"], 12);

        let back: Frame = serde_json::from_value(json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_error_frame_may_omit_command_id() {
        let frame = Frame::Error {
            document_id: Uuid::new_v4(),
            command_id: None,
            reason: "catch-up required".to_owned(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        let back: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }
}
