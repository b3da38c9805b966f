//! Core identifiers and records for the gridhub protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::capabilities::Capabilities;
use crate::error::ProtoError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an id from a string.
            ///
            /// # Errors
            ///
            /// Returns an error if the string is not a valid UUID.
            pub fn parse(s: &str) -> Result<Self, ProtoError> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ProtoError::Validation(format!(concat!("invalid ", $label, ": {}"), e)))
            }

            /// Get the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an active session reservation.
    SessionId,
    "session ID"
);

uuid_id!(
    /// Unique identifier for a worker node.
    NodeId,
    "node ID"
);

uuid_id!(
    /// Unique identifier for one reservable slot on a node.
    SlotId,
    "slot ID"
);

uuid_id!(
    /// Unique identifier for a queued new-session request.
    RequestId,
    "request ID"
);

/// An active reservation binding a client to a specific node slot.
///
/// Created only by a successful distributor match and immutable afterwards;
/// the id is minted at reservation time and never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session id.
    pub id: SessionId,
    /// Address of the owning node.
    pub uri: String,
    /// Capabilities actually granted (the matched slot's stereotype).
    pub capabilities: Capabilities,
    /// Capabilities the client originally requested.
    pub requested_capabilities: Capabilities,
    /// When the reservation was created.
    pub start_time: DateTime<Utc>,
}

impl Session {
    /// Create a session record with a fresh id and the current time.
    #[must_use]
    pub fn new(uri: impl Into<String>, granted: Capabilities, requested: Capabilities) -> Self {
        Self {
            id: SessionId::new(),
            uri: uri.into(),
            capabilities: granted,
            requested_capabilities: requested,
            start_time: Utc::now(),
        }
    }
}

/// Frozen view of one slot inside a [`NodeStatus`] snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotStatus {
    /// The slot's id.
    pub slot_id: SlotId,
    /// The capability template the slot advertises.
    pub stereotype: Capabilities,
    /// The session occupying the slot, if any.
    pub session: Option<Session>,
}

impl SlotStatus {
    /// Whether the slot was free when the snapshot was taken.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.session.is_none()
    }
}

/// Immutable snapshot of a node's slots.
///
/// Deep-owned: later mutation of the node's live slots never changes a
/// previously returned snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// The node's id.
    pub node_id: NodeId,
    /// The node's externally reachable address.
    pub uri: String,
    /// One entry per slot, in the node's declaration order.
    pub slots: Vec<SlotStatus>,
}

impl NodeStatus {
    /// Ids of the sessions occupying slots at snapshot time.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.slots
            .iter()
            .filter_map(|slot| slot.session.as_ref().map(|s| s.id))
            .collect()
    }

    /// Whether any free slot's stereotype satisfies `requested` under
    /// the given matcher.
    #[must_use]
    pub fn has_free_slot_matching(
        &self,
        matcher: &dyn crate::CapabilityMatcher,
        requested: &Capabilities,
    ) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.is_free() && matcher.matches(&slot.stereotype, requested))
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_free()).count()
    }

    /// Occupied-to-total ratio, 0.0 for a node with no slots.
    #[must_use]
    pub fn load_ratio(&self) -> f64 {
        if self.slots.is_empty() {
            return 0.0;
        }
        self.occupied_count() as f64 / self.slots.len() as f64
    }
}

/// One stereotype with a concurrent slot count, as announced at
/// registration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Capability template offered.
    pub stereotype: Capabilities,
    /// Number of concurrently runnable sessions for this stereotype.
    pub count: u32,
}

/// A worker's self-announcement to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRegistration {
    /// Externally reachable address of the worker.
    pub uri: String,
    /// Advertised stereotypes with slot counts.
    pub slots: Vec<SlotConfig>,
}

impl NodeRegistration {
    /// Create a registration announcement.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            slots: Vec::new(),
        }
    }

    /// Add a stereotype with a slot count.
    #[must_use]
    pub fn with_slots(mut self, stereotype: Capabilities, count: u32) -> Self {
        self.slots.push(SlotConfig { stereotype, count });
        self
    }

    /// Total slot count across all stereotypes.
    #[must_use]
    pub fn total_slots(&self) -> u32 {
        self.slots.iter().map(|s| s.count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Helper Functions ====================

    fn firefox() -> Capabilities {
        Capabilities::new().with("browserName", "firefox")
    }

    fn make_session() -> Session {
        Session::new("http://worker-1:5555", firefox(), firefox())
    }

    fn make_slot_status(session: Option<Session>) -> SlotStatus {
        SlotStatus {
            slot_id: SlotId::new(),
            stereotype: firefox(),
            session,
        }
    }

    // ==================== Id Tests ====================

    #[test]
    fn test_session_id_roundtrip() {
        let id = SessionId::new();
        let parsed = SessionId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_session_id_parse_invalid() {
        let result = SessionId::parse("not-a-uuid");
        assert!(matches!(result, Err(ProtoError::Validation(_))));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
        assert_ne!(NodeId::new(), NodeId::new());
    }

    #[test]
    fn test_id_serde_transparent() {
        let id = NodeId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    // ==================== Session Tests ====================

    #[test]
    fn test_session_new_mints_fresh_id() {
        let a = make_session();
        let b = make_session();
        assert_ne!(a.id, b.id);
        assert_eq!(a.uri, "http://worker-1:5555");
    }

    #[test]
    fn test_session_serde_roundtrip() {
        let session = make_session();
        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(session, back);
    }

    // ==================== NodeStatus Tests ====================

    #[test]
    fn test_status_session_ids_skips_free_slots() {
        let occupied = make_session();
        let status = NodeStatus {
            node_id: NodeId::new(),
            uri: "http://worker-1:5555".to_string(),
            slots: vec![
                make_slot_status(Some(occupied.clone())),
                make_slot_status(None),
            ],
        };

        assert_eq!(status.session_ids(), vec![occupied.id]);
        assert_eq!(status.occupied_count(), 1);
    }

    #[test]
    fn test_status_load_ratio() {
        let status = NodeStatus {
            node_id: NodeId::new(),
            uri: "http://worker-1:5555".to_string(),
            slots: vec![
                make_slot_status(Some(make_session())),
                make_slot_status(None),
                make_slot_status(None),
                make_slot_status(None),
            ],
        };
        assert!((status.load_ratio() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_status_free_slot_matching() {
        let status = NodeStatus {
            node_id: NodeId::new(),
            uri: "http://worker-1:5555".to_string(),
            slots: vec![
                make_slot_status(Some(make_session())),
                make_slot_status(None),
            ],
        };
        let matcher = crate::ExactMatcher;

        assert!(status.has_free_slot_matching(&matcher, &firefox()));
        let chrome = Capabilities::new().with("browserName", "chrome");
        assert!(!status.has_free_slot_matching(&matcher, &chrome));
    }

    #[test]
    fn test_status_load_ratio_no_slots() {
        let status = NodeStatus {
            node_id: NodeId::new(),
            uri: "http://worker-1:5555".to_string(),
            slots: vec![],
        };
        assert!((status.load_ratio() - 0.0).abs() < f64::EPSILON);
    }

    // ==================== Registration Tests ====================

    #[test]
    fn test_registration_total_slots() {
        let reg = NodeRegistration::new("http://worker-1:5555")
            .with_slots(firefox(), 4)
            .with_slots(Capabilities::new().with("browserName", "chrome"), 2);

        assert_eq!(reg.total_slots(), 6);
        assert_eq!(reg.slots.len(), 2);
    }

    #[test]
    fn test_registration_serde_roundtrip() {
        let reg = NodeRegistration::new("http://worker-1:5555").with_slots(firefox(), 1);
        let json = serde_json::to_string(&reg).unwrap();
        let back: NodeRegistration = serde_json::from_str(&json).unwrap();
        assert_eq!(reg, back);
    }
}
