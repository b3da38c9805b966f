//! Error types for the session directory.

use grid_proto::SessionId;
use thiserror::Error;

/// Errors that can occur during directory operations.
///
/// `NotFound` is a normal lookup outcome, never a fault; removal
/// operations swallow it entirely.
#[derive(Debug, Error)]
pub enum SessionMapError {
    /// No entry exists for the session id.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The backing store failed.
    #[error("session store error: {0}")]
    Store(String),

    /// The directory was configured with an invalid backend selection.
    /// Fatal at startup, before any requests are accepted.
    #[error("session map configuration error: {0}")]
    Configuration(String),
}
