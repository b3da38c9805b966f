//! The node contract implemented by local and remote workers.

use async_trait::async_trait;
use grid_proto::{Capabilities, NodeId, NodeStatus, Session, SessionId};
use http::{HeaderMap, Method, StatusCode};

use crate::error::NodeError;

/// An arbitrary wire-level command addressed to an owned session.
///
/// Carried verbatim: the scheduler never interprets the payload, it only
/// routes it to the owning node.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// The session the command targets.
    pub session_id: SessionId,
    /// HTTP method of the original request.
    pub method: Method,
    /// Full request path, including the session prefix.
    pub path: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Raw request body.
    pub body: Vec<u8>,
}

impl CommandRequest {
    /// Create a command request with no headers or body.
    #[must_use]
    pub fn new(session_id: SessionId, method: Method, path: impl Into<String>) -> Self {
        Self {
            session_id,
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Attach a request body.
    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }
}

/// The verbatim response to a [`CommandRequest`].
#[derive(Debug, Clone)]
pub struct CommandResponse {
    /// HTTP status of the worker's answer.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl CommandResponse {
    /// An empty 200 response.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }
}

/// A worker exposing a fixed set of capability-tagged slots.
///
/// Local and remote variants implement the same contract; callers select
/// an implementation at construction time and never downcast.
#[async_trait]
pub trait Node: Send + Sync + std::fmt::Debug {
    /// The node's unique id.
    fn id(&self) -> NodeId;

    /// The externally reachable address sessions are created against.
    fn external_uri(&self) -> &str;

    /// Whether any stereotype on this node is compatible with `requested`,
    /// regardless of current occupancy.
    async fn is_supporting(&self, requested: &Capabilities) -> bool;

    /// Reserve one free matching slot and create a session on it.
    ///
    /// Safe under concurrent callers: two simultaneous calls never both
    /// succeed against the same slot.
    ///
    /// # Errors
    ///
    /// `NoCapacity` if no free slot matches; `Unreachable` if a remote
    /// worker cannot be contacted.
    async fn new_session(&self, requested: Capabilities) -> Result<Session, NodeError>;

    /// Describe an owned session.
    ///
    /// # Errors
    ///
    /// `NotFound` if the session is not owned by this node.
    async fn get_session(&self, id: SessionId) -> Result<Session, NodeError>;

    /// Whether this node currently owns the session. Answers from the
    /// node's own state, without consulting the directory.
    async fn is_session_owner(&self, id: SessionId) -> bool;

    /// Stop an owned session, releasing its slot.
    ///
    /// # Errors
    ///
    /// A second stop of the same id reports `NotFound`.
    async fn stop_session(&self, id: SessionId) -> Result<(), NodeError>;

    /// Immutable snapshot of the node's slots. Later mutation of the live
    /// slots never changes a previously returned snapshot.
    ///
    /// # Errors
    ///
    /// `Unreachable` if a remote worker cannot be contacted.
    async fn status(&self) -> Result<NodeStatus, NodeError>;

    /// Forward an arbitrary automation-protocol command to an owned
    /// session, copying status, headers and body verbatim.
    ///
    /// # Errors
    ///
    /// `NotFound` for unowned sessions, `Unreachable` on connection
    /// failure to a remote worker.
    async fn execute_command(&self, request: CommandRequest) -> Result<CommandResponse, NodeError>;

    /// Liveness probe.
    async fn is_ready(&self) -> bool;
}
