//! In-process node implementation.

use std::sync::Arc;

use async_trait::async_trait;
use grid_proto::{
    Capabilities, CapabilityMatcher, ExactMatcher, NodeId, NodeRegistration, NodeStatus, Session,
    SessionId,
};
use tracing::{debug, info};

use crate::error::NodeError;
use crate::node::{CommandRequest, CommandResponse, Node};
use crate::slot::Slot;

/// Executes wire-level commands for sessions running in-process.
///
/// Embedders plug in a real automation backend here; the default
/// [`OkHandler`] acknowledges every command, which is all testing needs.
#[async_trait]
pub trait CommandHandler: Send + Sync + std::fmt::Debug {
    /// Execute one command against an owned session.
    async fn handle(&self, session: &Session, request: &CommandRequest) -> CommandResponse;
}

/// Default handler: acknowledges every command with an empty 200.
#[derive(Debug, Clone, Copy, Default)]
pub struct OkHandler;

#[async_trait]
impl CommandHandler for OkHandler {
    async fn handle(&self, _session: &Session, _request: &CommandRequest) -> CommandResponse {
        CommandResponse::ok()
    }
}

/// A node running sessions in the hub's own process.
///
/// The slot set is fixed at construction; reservation contention is pushed
/// down to the individual slots.
#[derive(Debug)]
pub struct LocalNode {
    id: NodeId,
    external_uri: String,
    slots: Vec<Slot>,
    matcher: Arc<dyn CapabilityMatcher>,
    handler: Arc<dyn CommandHandler>,
}

/// Builder for [`LocalNode`].
#[derive(Debug)]
pub struct LocalNodeBuilder {
    external_uri: String,
    slots: Vec<Slot>,
    matcher: Arc<dyn CapabilityMatcher>,
    handler: Arc<dyn CommandHandler>,
}

impl LocalNodeBuilder {
    fn new(external_uri: impl Into<String>) -> Self {
        Self {
            external_uri: external_uri.into(),
            slots: Vec::new(),
            matcher: Arc::new(ExactMatcher),
            handler: Arc::new(OkHandler),
        }
    }

    /// Add `count` slots advertising `stereotype`.
    #[must_use]
    pub fn add_stereotype(mut self, stereotype: Capabilities, count: u32) -> Self {
        for _ in 0..count {
            self.slots.push(Slot::new(stereotype.clone()));
        }
        self
    }

    /// Replace the capability matching policy.
    #[must_use]
    pub fn matcher(mut self, matcher: Arc<dyn CapabilityMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Replace the in-process command handler.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn CommandHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Finish construction.
    #[must_use]
    pub fn build(self) -> LocalNode {
        let node = LocalNode {
            id: NodeId::new(),
            external_uri: self.external_uri,
            slots: self.slots,
            matcher: self.matcher,
            handler: self.handler,
        };
        info!(node_id = %node.id, uri = %node.external_uri, slots = node.slots.len(), "local node created");
        node
    }
}

impl LocalNode {
    /// Start building a local node reachable at `external_uri`.
    #[must_use]
    pub fn builder(external_uri: impl Into<String>) -> LocalNodeBuilder {
        LocalNodeBuilder::new(external_uri)
    }

    /// Build a local node from a worker registration announcement.
    #[must_use]
    pub fn from_registration(registration: &NodeRegistration) -> Self {
        let mut builder = Self::builder(registration.uri.clone());
        for slot in &registration.slots {
            builder = builder.add_stereotype(slot.stereotype.clone(), slot.count);
        }
        builder.build()
    }

    /// Number of slots, fixed for the node's lifetime.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn find_owned(&self, id: SessionId) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.session_id() == Some(id))
    }
}

#[async_trait]
impl Node for LocalNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn external_uri(&self) -> &str {
        &self.external_uri
    }

    async fn is_supporting(&self, requested: &Capabilities) -> bool {
        self.slots
            .iter()
            .any(|slot| self.matcher.matches(slot.stereotype(), requested))
    }

    async fn new_session(&self, requested: Capabilities) -> Result<Session, NodeError> {
        for slot in &self.slots {
            if !self.matcher.matches(slot.stereotype(), &requested) {
                continue;
            }
            // The session is built inside the slot's critical section, so
            // an id is only ever minted for a won reservation.
            let reserved = slot.try_reserve_with(|| {
                Session::new(
                    self.external_uri.clone(),
                    slot.stereotype().clone(),
                    requested.clone(),
                )
            });
            if let Some(session) = reserved {
                debug!(node_id = %self.id, session_id = %session.id, slot_id = %slot.id(), "session created");
                return Ok(session);
            }
        }
        Err(NodeError::NoCapacity)
    }

    async fn get_session(&self, id: SessionId) -> Result<Session, NodeError> {
        self.find_owned(id)
            .and_then(Slot::current_session)
            .ok_or(NodeError::NotFound(id))
    }

    async fn is_session_owner(&self, id: SessionId) -> bool {
        self.find_owned(id).is_some()
    }

    async fn stop_session(&self, id: SessionId) -> Result<(), NodeError> {
        match self.find_owned(id).and_then(Slot::release) {
            Some(session) => {
                debug!(node_id = %self.id, session_id = %session.id, "session stopped");
                Ok(())
            }
            None => Err(NodeError::NotFound(id)),
        }
    }

    async fn status(&self) -> Result<NodeStatus, NodeError> {
        Ok(NodeStatus {
            node_id: self.id,
            uri: self.external_uri.clone(),
            slots: self.slots.iter().map(Slot::status).collect(),
        })
    }

    async fn execute_command(&self, request: CommandRequest) -> Result<CommandResponse, NodeError> {
        let session = self.get_session(request.session_id).await?;
        Ok(self.handler.handle(&session, &request).await)
    }

    async fn is_ready(&self) -> bool {
        true
    }
}
