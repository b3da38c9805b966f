//! Scheduling error types.

use grid_proto::{NodeId, SessionId};
use grid_sessions::SessionMapError;
use thiserror::Error;

/// Why a scheduling operation failed.
#[derive(Debug, Error)]
pub enum SchedulingError {
    /// No registered node advertises capacity matching the request.
    #[error("no node supports the requested capabilities")]
    NoCapacity,

    /// The request waited for capacity longer than the configured timeout.
    #[error("timed out waiting for matching capacity")]
    Timeout,

    /// No node owns the session.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The node is not registered.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// A node could not be contacted.
    #[error("node unreachable: {0}")]
    NodeUnreachable(String),

    /// The session directory rejected or failed an operation.
    #[error("session directory error: {0}")]
    Directory(String),

    /// Invalid configuration, detected at startup.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<SessionMapError> for SchedulingError {
    fn from(err: SessionMapError) -> Self {
        match err {
            SessionMapError::NotFound(id) => Self::NotFound(id),
            SessionMapError::Store(msg) => Self::Directory(msg),
            SessionMapError::Configuration(msg) => Self::Configuration(msg),
        }
    }
}
