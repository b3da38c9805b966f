//! Shared protocol types for the gridhub session scheduler.
//!
//! Everything that crosses a component or process boundary lives here:
//! capability property bags and the matching policy, id newtypes, session
//! and node-status records, worker registration shapes, and the grid
//! event bus.

pub mod capabilities;
pub mod error;
pub mod events;
pub mod types;

pub use capabilities::{
    matcher_from_name, Capabilities, CapabilityMatcher, CapabilityValue, ExactMatcher,
};
pub use error::ProtoError;
pub use events::{EventBus, GridEvent};
pub use types::{
    NodeId, NodeRegistration, NodeStatus, RequestId, Session, SessionId, SlotConfig, SlotId,
    SlotStatus,
};
