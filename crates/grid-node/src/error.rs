//! Error types for node operations.

use grid_proto::SessionId;
use thiserror::Error;

/// Errors that can occur during node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// No free slot on this node matches the requested capabilities.
    #[error("no free slot matches the requested capabilities")]
    NoCapacity,

    /// The session is not (or no longer) owned by this node.
    #[error("session {0} not found on this node")]
    NotFound(SessionId),

    /// A remote node could not be reached.
    #[error("node unreachable: {0}")]
    Unreachable(String),

    /// The remote node answered with something the protocol does not allow.
    #[error("protocol error: {0}")]
    Protocol(String),
}
