//! In-process publish/subscribe hub.
//!
//! One bus exists per open document session and is torn down with it, so
//! nothing leaks across documents. Dispatch is synchronous: the handler
//! list is snapshotted before fan-out, which makes subscribing or
//! unsubscribing from inside a handler safe, and messages are delivered
//! by shared reference so no subscriber can mutate them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use storyloom_core::command::Command;
use storyloom_core::event::Event;
use storyloom_core::save_state::SaveState;

/// A state change delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A command was applied optimistically to local state.
    LocalApplied {
        /// The command applied.
        command: Command,
    },
    /// A canonical event from the authoritative log was applied.
    Committed {
        /// The committed event.
        event: Event,
    },
    /// The server rejected a command; its optimistic effect was rolled
    /// back and it will not be retried.
    Rejected {
        /// The rejected command.
        command_id: Uuid,
        /// The server's reason.
        reason: String,
    },
    /// The durability status changed (save succeeded, failed, or went
    /// dirty).
    SaveStatus {
        /// The new save state.
        state: SaveState,
    },
}

/// Handle returned by [`StateEventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<Mutex<dyn FnMut(&SessionEvent) + Send>>;

struct Subscriber {
    id: SubscriptionId,
    handler: Handler,
}

/// Per-session pub/sub registry routing committed state changes to the
/// sync manager, autosave, presence layer, and UI bindings without
/// coupling producers to consumers.
pub struct StateEventBus {
    document_id: Uuid,
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl StateEventBus {
    /// Creates a bus for one document session.
    #[must_use]
    pub fn new(document_id: Uuid) -> Self {
        Self {
            document_id,
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// The document this bus serves.
    #[must_use]
    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    /// Registers a handler for every published session event.
    pub fn subscribe(
        &self,
        handler: impl FnMut(&SessionEvent) + Send + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock_subscribers().push(Subscriber {
            id,
            handler: Arc::new(Mutex::new(handler)),
        });
        id
    }

    /// Removes a previously registered handler.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.lock_subscribers().retain(|s| s.id != id);
    }

    /// Synchronously delivers `event` to every current subscriber. The
    /// subscriber list is snapshotted first, so re-entrant subscription
    /// changes take effect on the next publish.
    pub fn publish(&self, event: &SessionEvent) {
        let handlers: Vec<Handler> = self
            .lock_subscribers()
            .iter()
            .map(|s| Arc::clone(&s.handler))
            .collect();
        for handler in handlers {
            let mut f = handler.lock().unwrap_or_else(PoisonError::into_inner);
            f(event);
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn sample_event() -> SessionEvent {
        SessionEvent::SaveStatus {
            state: SaveState::default(),
        }
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let bus = StateEventBus::new(Uuid::new_v4());
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            bus.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        bus.publish(&sample_event());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = StateEventBus::new(Uuid::new_v4());
        let hits = Arc::new(AtomicUsize::new(0));
        let id = {
            let hits = Arc::clone(&hits);
            bus.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        bus.publish(&sample_event());
        bus.unsubscribe(id);
        bus.publish(&sample_event());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribing_during_fanout_is_safe_and_deferred() {
        let bus = Arc::new(StateEventBus::new(Uuid::new_v4()));
        let late_hits = Arc::new(AtomicUsize::new(0));

        let bus_inner = Arc::clone(&bus);
        let late_inner = Arc::clone(&late_hits);
        bus.subscribe(move |_| {
            let late = Arc::clone(&late_inner);
            bus_inner.subscribe(move |_| {
                late.fetch_add(1, Ordering::SeqCst);
            });
        });

        // The handler registered mid-dispatch must not see this publish.
        bus.publish(&sample_event());
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);

        bus.publish(&sample_event());
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
    }
}
