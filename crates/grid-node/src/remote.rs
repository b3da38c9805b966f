//! HTTP client implementation of the node contract.

use std::sync::Arc;

use async_trait::async_trait;
use grid_proto::{
    Capabilities, CapabilityMatcher, ExactMatcher, NodeId, NodeStatus, Session, SessionId,
};
use http::StatusCode;
use tracing::{debug, warn};

use crate::error::NodeError;
use crate::node::{CommandRequest, CommandResponse, Node};
use crate::wire::{NewSessionRequest, OwnerResponse};

/// Request headers the proxy must not forward to the worker.
const HOP_BY_HOP: &[&str] = &["host", "content-length", "transfer-encoding", "connection"];

/// A node living in another process, driven over the node HTTP protocol.
///
/// Every contract method is an HTTP round trip against the worker's
/// external address; connection failures surface as
/// [`NodeError::Unreachable`] so the distributor can treat the node as
/// removed.
#[derive(Debug)]
pub struct RemoteNode {
    id: NodeId,
    external_uri: String,
    client: reqwest::Client,
    matcher: Arc<dyn CapabilityMatcher>,
}

impl RemoteNode {
    /// Wrap a worker whose id is already known.
    #[must_use]
    pub fn new(id: NodeId, external_uri: impl Into<String>) -> Self {
        let mut uri = external_uri.into();
        while uri.ends_with('/') {
            uri.pop();
        }
        Self {
            id,
            external_uri: uri,
            client: reqwest::Client::new(),
            matcher: Arc::new(ExactMatcher),
        }
    }

    /// Contact a worker and learn its id from its status report.
    ///
    /// # Errors
    ///
    /// `Unreachable` if the worker cannot be contacted, `Protocol` if the
    /// status report does not parse.
    pub async fn connect(external_uri: impl Into<String>) -> Result<Self, NodeError> {
        let mut node = Self::new(NodeId::new(), external_uri);
        let status = node.status().await?;
        node.id = status.node_id;
        Ok(node)
    }

    /// Replace the capability matching policy used for `is_supporting`.
    #[must_use]
    pub fn with_matcher(mut self, matcher: Arc<dyn CapabilityMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.external_uri)
    }

    fn transport_error(&self, err: &reqwest::Error) -> NodeError {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            warn!(node_id = %self.id, uri = %self.external_uri, error = %err, "node unreachable");
            NodeError::Unreachable(err.to_string())
        } else {
            NodeError::Protocol(err.to_string())
        }
    }
}

#[async_trait]
impl Node for RemoteNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn external_uri(&self) -> &str {
        &self.external_uri
    }

    async fn is_supporting(&self, requested: &Capabilities) -> bool {
        match self.status().await {
            Ok(status) => status
                .slots
                .iter()
                .any(|slot| self.matcher.matches(&slot.stereotype, requested)),
            Err(_) => false,
        }
    }

    async fn new_session(&self, requested: Capabilities) -> Result<Session, NodeError> {
        let response = self
            .client
            .post(self.url("/session"))
            .json(&NewSessionRequest { capabilities: requested })
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => response
                .json::<Session>()
                .await
                .map_err(|e| NodeError::Protocol(e.to_string())),
            StatusCode::SERVICE_UNAVAILABLE => Err(NodeError::NoCapacity),
            other => Err(NodeError::Protocol(format!(
                "unexpected status {other} creating session"
            ))),
        }
    }

    async fn get_session(&self, id: SessionId) -> Result<Session, NodeError> {
        let response = self
            .client
            .get(self.url(&format!("/session/{id}")))
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        match response.status() {
            StatusCode::OK => response
                .json::<Session>()
                .await
                .map_err(|e| NodeError::Protocol(e.to_string())),
            StatusCode::NOT_FOUND => Err(NodeError::NotFound(id)),
            other => Err(NodeError::Protocol(format!(
                "unexpected status {other} fetching session"
            ))),
        }
    }

    async fn is_session_owner(&self, id: SessionId) -> bool {
        let response = self
            .client
            .get(self.url(&format!("/session/{id}/owner")))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status() == StatusCode::OK => resp
                .json::<OwnerResponse>()
                .await
                .map(|o| o.owner)
                .unwrap_or(false),
            _ => false,
        }
    }

    async fn stop_session(&self, id: SessionId) -> Result<(), NodeError> {
        let response = self
            .client
            .delete(self.url(&format!("/session/{id}")))
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => Err(NodeError::NotFound(id)),
            other => Err(NodeError::Protocol(format!(
                "unexpected status {other} stopping session"
            ))),
        }
    }

    async fn status(&self) -> Result<NodeStatus, NodeError> {
        let response = self
            .client
            .get(self.url("/status"))
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        if response.status() != StatusCode::OK {
            return Err(NodeError::Protocol(format!(
                "unexpected status {} fetching node status",
                response.status()
            )));
        }
        response
            .json::<NodeStatus>()
            .await
            .map_err(|e| NodeError::Protocol(e.to_string()))
    }

    async fn execute_command(&self, request: CommandRequest) -> Result<CommandResponse, NodeError> {
        debug!(node_id = %self.id, session_id = %request.session_id, path = %request.path, "forwarding command");

        let mut headers = request.headers.clone();
        for name in HOP_BY_HOP {
            headers.remove(*name);
        }

        let response = self
            .client
            .request(request.method.clone(), self.url(&request.path))
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| NodeError::Protocol(e.to_string()))?
            .to_vec();

        Ok(CommandResponse { status, headers, body })
    }

    async fn is_ready(&self) -> bool {
        matches!(
            self.client.get(self.url("/readyz")).send().await,
            Ok(resp) if resp.status().is_success() || resp.status() == StatusCode::NO_CONTENT
        )
    }
}
