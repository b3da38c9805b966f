//! Event-driven directory eviction.
//!
//! Owns its subscription to the grid event bus and reacts to the three
//! ownership-ending event kinds. All reactions are removes, which are
//! idempotent, so handling order never matters and a raced explicit
//! removal is harmless.

use std::sync::Arc;

use grid_proto::{EventBus, GridEvent, NodeStatus};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::map::SessionMap;

/// Background task keeping a session map consistent with grid events.
#[derive(Debug)]
pub struct SessionCleanup {
    handle: JoinHandle<()>,
}

impl SessionCleanup {
    /// Subscribe to `bus` and start evicting entries from `map`.
    ///
    /// The task ends when the bus is dropped.
    #[must_use]
    pub fn spawn(bus: &EventBus, map: Arc<dyn SessionMap>) -> Self {
        let mut rx = bus.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handle_event(map.as_ref(), event).await,
                    Err(RecvError::Lagged(missed)) => {
                        // Remove is idempotent; anything missed here will be
                        // caught by a later explicit removal.
                        warn!(missed, "session cleanup lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("session cleanup task stopped");
        });
        Self { handle }
    }

    /// Whether the task has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task without waiting for the bus to close.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

async fn handle_event(map: &dyn SessionMap, event: GridEvent) {
    match event {
        GridEvent::SessionClosed { id } => {
            if let Err(e) = map.remove(id).await {
                warn!(session_id = %id, error = %e, "failed to evict closed session");
            }
        }
        GridEvent::NodeRemoved { status } => evict_owned(map, &status).await,
        GridEvent::NodeRestarted { status } => evict_by_uri(map, &status).await,
        GridEvent::NodeAdded { .. } => {}
    }
}

/// A removed node takes every session on its slots with it.
async fn evict_owned(map: &dyn SessionMap, status: &NodeStatus) {
    for id in status.session_ids() {
        debug!(session_id = %id, node_id = %status.node_id, "evicting session of removed node");
        if let Err(e) = map.remove(id).await {
            warn!(session_id = %id, error = %e, "failed to evict session of removed node");
        }
    }
}

/// A restarted node kept its address but lost every in-memory session, so
/// eviction goes by uri rather than by the (empty) slot snapshot.
async fn evict_by_uri(map: &dyn SessionMap, status: &NodeStatus) {
    let sessions = match map.all().await {
        Ok(sessions) => sessions,
        Err(e) => {
            warn!(error = %e, "failed to list sessions for restart eviction");
            return;
        }
    };
    for session in sessions.iter().filter(|s| s.uri == status.uri) {
        debug!(session_id = %session.id, uri = %status.uri, "evicting session of restarted node");
        if let Err(e) = map.remove(session.id).await {
            warn!(session_id = %session.id, error = %e, "failed to evict session of restarted node");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionMapError;
    use crate::memory::InMemorySessionMap;
    use grid_proto::{Capabilities, NodeId, Session, SessionId, SlotId, SlotStatus};
    use std::time::Duration;

    // ==================== Helper Functions ====================

    fn firefox() -> Capabilities {
        Capabilities::new().with("browserName", "firefox")
    }

    fn make_session(uri: &str) -> Session {
        Session::new(uri, firefox(), firefox())
    }

    fn status_with_sessions(uri: &str, sessions: Vec<Session>) -> NodeStatus {
        NodeStatus {
            node_id: NodeId::new(),
            uri: uri.to_string(),
            slots: sessions
                .into_iter()
                .map(|session| SlotStatus {
                    slot_id: SlotId::new(),
                    stereotype: firefox(),
                    session: Some(session),
                })
                .collect(),
        }
    }

    /// Wait (bounded) until the map no longer has the entry.
    async fn wait_for_eviction(map: &InMemorySessionMap, id: SessionId) {
        for _ in 0..100 {
            if matches!(map.get(id).await, Err(SessionMapError::NotFound(_))) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session {id} was not evicted within the window");
    }

    // ==================== Event Reaction Tests ====================

    #[tokio::test]
    async fn test_session_closed_evicts_entry() {
        let bus = EventBus::new();
        let map = Arc::new(InMemorySessionMap::new());
        let _cleanup = SessionCleanup::spawn(&bus, map.clone());

        let session = make_session("http://worker-1:5555");
        map.add(session.clone()).await.unwrap();

        bus.publish(GridEvent::SessionClosed { id: session.id });

        wait_for_eviction(&map, session.id).await;
    }

    #[tokio::test]
    async fn test_node_removed_evicts_its_sessions_only() {
        let bus = EventBus::new();
        let map = Arc::new(InMemorySessionMap::new());
        let _cleanup = SessionCleanup::spawn(&bus, map.clone());

        let doomed = make_session("http://worker-1:5555");
        let survivor = make_session("http://worker-2:5555");
        map.add(doomed.clone()).await.unwrap();
        map.add(survivor.clone()).await.unwrap();

        let status = status_with_sessions("http://worker-1:5555", vec![doomed.clone()]);
        bus.publish(GridEvent::NodeRemoved { status });

        wait_for_eviction(&map, doomed.id).await;
        assert!(map.get(survivor.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_node_restarted_evicts_by_uri() {
        let bus = EventBus::new();
        let map = Arc::new(InMemorySessionMap::new());
        let _cleanup = SessionCleanup::spawn(&bus, map.clone());

        let lost_a = make_session("http://worker-1:5555");
        let lost_b = make_session("http://worker-1:5555");
        let survivor = make_session("http://worker-2:5555");
        map.add(lost_a.clone()).await.unwrap();
        map.add(lost_b.clone()).await.unwrap();
        map.add(survivor.clone()).await.unwrap();

        // A restarted node reports empty slots; eviction must go by uri.
        let status = status_with_sessions("http://worker-1:5555", vec![]);
        bus.publish(GridEvent::NodeRestarted { status });

        wait_for_eviction(&map, lost_a.id).await;
        wait_for_eviction(&map, lost_b.id).await;
        assert!(map.get(survivor.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_node_added_is_ignored() {
        let bus = EventBus::new();
        let map = Arc::new(InMemorySessionMap::new());
        let _cleanup = SessionCleanup::spawn(&bus, map.clone());

        let session = make_session("http://worker-1:5555");
        map.add(session.clone()).await.unwrap();

        bus.publish(GridEvent::NodeAdded {
            status: status_with_sessions("http://worker-1:5555", vec![]),
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(map.get(session.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_task_stops_when_bus_dropped() {
        let map = Arc::new(InMemorySessionMap::new());
        let cleanup = {
            let bus = EventBus::new();
            SessionCleanup::spawn(&bus, map.clone())
            // The bus (and its only sender) drops here.
        };

        for _ in 0..100 {
            if cleanup.is_finished() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("cleanup task did not stop after the bus closed");
    }
}
