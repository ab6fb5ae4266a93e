//! Ephemeral collaborator presence.
//!
//! Presence rides the same transport as durable events with its own frame
//! type, but never touches the event store and carries no version
//! numbers. Peers that stop heartbeating are garbage-collected.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storyloom_core::graph::Position;

/// What a collaborator is currently doing, broadcast on every heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceInfo {
    /// The collaborating user.
    pub user_id: Uuid,
    /// Canvas cursor position.
    pub cursor: Position,
    /// The entity the collaborator has selected, if any.
    pub selected_entity: Option<Uuid>,
    /// Time of the last heartbeat carrying this info.
    pub last_heartbeat_at: DateTime<Utc>,
}

/// Tracks the presence of other editors on one document.
#[derive(Debug)]
pub struct PresenceTracker {
    timeout: Duration,
    peers: HashMap<Uuid, PresenceInfo>,
}

impl PresenceTracker {
    /// Creates a tracker that expires peers after `timeout_ms` without a
    /// heartbeat.
    #[must_use]
    pub fn new(timeout_ms: i64) -> Self {
        Self {
            timeout: Duration::milliseconds(timeout_ms),
            peers: HashMap::new(),
        }
    }

    /// Records a heartbeat from a collaborator.
    pub fn observe(&mut self, info: PresenceInfo) {
        self.peers.insert(info.user_id, info);
    }

    /// Currently live collaborators, in no particular order.
    pub fn peers(&self) -> impl Iterator<Item = &PresenceInfo> {
        self.peers.values()
    }

    /// Drops peers whose last heartbeat is older than the timeout and
    /// returns their user ids.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<Uuid> {
        let timeout = self.timeout;
        let expired: Vec<Uuid> = self
            .peers
            .values()
            .filter(|p| now - p.last_heartbeat_at > timeout)
            .map(|p| p.user_id)
            .collect();
        for id in &expired {
            self.peers.remove(id);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn heartbeat(user_id: Uuid, at: DateTime<Utc>) -> PresenceInfo {
        PresenceInfo {
            user_id,
            cursor: Position::new(10.0, 20.0),
            selected_entity: None,
            last_heartbeat_at: at,
        }
    }

    #[test]
    fn test_sweep_expires_silent_peers() {
        let mut tracker = PresenceTracker::new(5_000);
        let chatty = Uuid::new_v4();
        let silent = Uuid::new_v4();
        tracker.observe(heartbeat(silent, t(0)));
        tracker.observe(heartbeat(chatty, t(4_000)));

        let expired = tracker.sweep(t(6_000));
        assert_eq!(expired, vec![silent]);
        assert_eq!(tracker.peers().count(), 1);
    }

    #[test]
    fn test_fresh_heartbeat_replaces_stale_info() {
        let mut tracker = PresenceTracker::new(5_000);
        let user = Uuid::new_v4();
        tracker.observe(heartbeat(user, t(0)));
        tracker.observe(heartbeat(user, t(3_000)));

        assert!(tracker.sweep(t(5_500)).is_empty());
        let peer = tracker.peers().next().unwrap();
        assert_eq!(peer.last_heartbeat_at, t(3_000));
    }
}
