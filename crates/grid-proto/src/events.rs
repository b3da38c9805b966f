//! Grid lifecycle events and the broadcast bus that carries them.
//!
//! Components that must react to capacity or ownership changes (directory
//! eviction, queue servicing) subscribe here instead of registering
//! listeners on each other. Every consumer owns its receiver; the bus
//! itself holds no listener state.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{NodeStatus, SessionId};

/// Default buffered capacity of the event bus.
const DEFAULT_BUS_CAPACITY: usize = 256;

/// A grid lifecycle notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GridEvent {
    /// A session was stopped or otherwise ended.
    SessionClosed {
        /// The ended session's id.
        id: SessionId,
    },
    /// A node joined the fleet.
    NodeAdded {
        /// Snapshot of the node at registration time.
        status: NodeStatus,
    },
    /// A node was deregistered or failed health checks.
    NodeRemoved {
        /// Last known snapshot of the node, including its sessions.
        status: NodeStatus,
    },
    /// A node restarted in place: same address, all in-memory sessions lost.
    NodeRestarted {
        /// Snapshot of the node after restart.
        status: NodeStatus,
    },
}

/// Clonable publish/subscribe channel for [`GridEvent`]s.
///
/// Backed by a tokio broadcast channel. A lagged subscriber observes
/// `RecvError::Lagged` and simply continues; all cleanup driven by these
/// events is idempotent, so dropped notifications degrade to a later
/// explicit removal rather than an inconsistency.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GridEvent>,
}

impl EventBus {
    /// Create a bus with the default buffer capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Create a bus with an explicit buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers that will observe the event; zero
    /// subscribers is not an error.
    pub fn publish(&self, event: GridEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Open a new subscription.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GridEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeId, SessionId};

    fn make_status() -> NodeStatus {
        NodeStatus {
            node_id: NodeId::new(),
            uri: "http://worker-1:5555".to_string(),
            slots: vec![],
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new();
        let delivered = bus.publish(GridEvent::SessionClosed { id: SessionId::new() });
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let id = SessionId::new();
        bus.publish(GridEvent::SessionClosed { id });

        let event = rx.recv().await.unwrap();
        assert_eq!(event, GridEvent::SessionClosed { id });
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(GridEvent::NodeAdded { status: make_status() });

        assert!(matches!(rx1.recv().await.unwrap(), GridEvent::NodeAdded { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), GridEvent::NodeAdded { .. }));
    }

    #[tokio::test]
    async fn test_subscription_opened_after_publish_misses_event() {
        let bus = EventBus::new();
        bus.publish(GridEvent::SessionClosed { id: SessionId::new() });

        let mut rx = bus.subscribe();
        bus.publish(GridEvent::NodeRemoved { status: make_status() });

        // Only the event published after subscribing is seen.
        assert!(matches!(rx.recv().await.unwrap(), GridEvent::NodeRemoved { .. }));
    }

    #[test]
    fn test_event_serde_roundtrip() {
        let event = GridEvent::NodeRestarted { status: make_status() };
        let json = serde_json::to_string(&event).unwrap();
        let back: GridEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn test_event_tagged_serialization() {
        let json =
            serde_json::to_value(GridEvent::SessionClosed { id: SessionId::new() }).unwrap();
        assert_eq!(json["kind"], "session_closed");
    }
}
