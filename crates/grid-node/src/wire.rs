//! JSON shapes of the node HTTP protocol.

use grid_proto::Capabilities;
use serde::{Deserialize, Serialize};

/// Body of `POST /session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSessionRequest {
    /// The capabilities the client requests.
    pub capabilities: Capabilities,
}

/// Body of `GET /session/{id}/owner`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OwnerResponse {
    /// Whether the answering node owns the session.
    pub owner: bool,
}
