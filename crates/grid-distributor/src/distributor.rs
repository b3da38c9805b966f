//! The matching engine pairing new-session requests with node capacity.

use std::sync::Arc;

use grid_node::{Node, NodeError};
use grid_proto::{
    Capabilities, CapabilityMatcher, EventBus, ExactMatcher, GridEvent, NodeId, NodeStatus,
    Session, SessionId,
};
use grid_queue::{NewSessionQueue, QueueError};
use grid_sessions::SessionMap;
use parking_lot::RwLock;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::config::DistributorConfig;
use crate::error::SchedulingError;
use crate::prioritizer::{prioritizer_from_name, NodePrioritizer};

/// Central scheduler: owns the node list and drives the request queue.
///
/// A request that cannot be satisfied immediately is parked in the queue;
/// the distributor re-polls it whenever capacity can have changed (a node
/// joined, a session ended). Everything a caller observes flows through
/// [`Distributor::new_session`] and [`Distributor::stop_session`].
#[derive(Debug)]
pub struct Distributor {
    nodes: RwLock<Vec<Arc<dyn Node>>>,
    session_map: Arc<dyn SessionMap>,
    queue: Arc<NewSessionQueue>,
    bus: EventBus,
    node_prioritizer: Arc<dyn NodePrioritizer>,
    capability_matcher: Arc<dyn CapabilityMatcher>,
    config: DistributorConfig,
}

/// Staged construction of a [`Distributor`].
#[derive(Debug)]
pub struct DistributorBuilder {
    session_map: Arc<dyn SessionMap>,
    queue: Arc<NewSessionQueue>,
    bus: EventBus,
    config: DistributorConfig,
    capability_matcher: Arc<dyn CapabilityMatcher>,
}

impl DistributorBuilder {
    /// Replace the default configuration.
    #[must_use]
    pub fn config(mut self, config: DistributorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default exact capability matcher.
    #[must_use]
    pub fn matcher(mut self, matcher: Arc<dyn CapabilityMatcher>) -> Self {
        self.capability_matcher = matcher;
        self
    }

    /// Build the distributor and start its queue servicing task.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// `Configuration` if the configured node prioritizer is unknown.
    pub fn build(self) -> Result<Arc<Distributor>, SchedulingError> {
        let node_prioritizer = prioritizer_from_name(&self.config.node_prioritizer)?;
        let distributor = Arc::new(Distributor {
            nodes: RwLock::new(Vec::new()),
            session_map: self.session_map,
            queue: self.queue,
            bus: self.bus,
            node_prioritizer,
            capability_matcher: self.capability_matcher,
            config: self.config,
        });
        Distributor::spawn_service_task(&distributor);
        Ok(distributor)
    }
}

impl Distributor {
    /// Start building a distributor over the given collaborators.
    #[must_use]
    pub fn builder(
        session_map: Arc<dyn SessionMap>,
        queue: Arc<NewSessionQueue>,
        bus: EventBus,
    ) -> DistributorBuilder {
        DistributorBuilder {
            session_map,
            queue,
            bus,
            config: DistributorConfig::default(),
            capability_matcher: Arc::new(ExactMatcher),
        }
    }

    /// The event bus this distributor publishes to.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Register a node. Registration order is retained and is the default
    /// attempt order.
    ///
    /// # Errors
    ///
    /// `NodeUnreachable` if the node cannot answer a status probe.
    pub async fn add_node(&self, node: Arc<dyn Node>) -> Result<(), SchedulingError> {
        let status = node
            .status()
            .await
            .map_err(|e| SchedulingError::NodeUnreachable(e.to_string()))?;

        info!(node_id = %status.node_id, uri = %status.uri, slots = status.slots.len(), "node registered");
        self.nodes.write().push(node);
        self.bus.publish(GridEvent::NodeAdded { status });
        self.service_queue().await;
        Ok(())
    }

    /// Deregister a node, returning its last known snapshot.
    ///
    /// Directory entries of its sessions are evicted by the cleanup
    /// listener reacting to the published removal event.
    ///
    /// # Errors
    ///
    /// `NodeNotFound` if no node with this id is registered.
    pub async fn remove_node(&self, id: NodeId) -> Result<NodeStatus, SchedulingError> {
        let node = {
            let mut nodes = self.nodes.write();
            let index = nodes
                .iter()
                .position(|n| n.id() == id)
                .ok_or(SchedulingError::NodeNotFound(id))?;
            nodes.remove(index)
        };

        let status = match node.status().await {
            Ok(status) => status,
            // Unreachable on the way out: publish an address-only snapshot.
            Err(e) => {
                warn!(node_id = %id, error = %e, "removed node did not answer a final status probe");
                NodeStatus {
                    node_id: id,
                    uri: node.external_uri().to_string(),
                    slots: Vec::new(),
                }
            }
        };

        info!(node_id = %id, "node deregistered");
        self.bus.publish(GridEvent::NodeRemoved {
            status: status.clone(),
        });
        Ok(status)
    }

    /// Create a session for `requested` capabilities.
    ///
    /// Tries all supporting nodes immediately; with none free, the request
    /// waits in the queue until capacity appears or the configured timeout
    /// elapses.
    ///
    /// # Errors
    ///
    /// `NoCapacity` when no registered node supports the capabilities at
    /// all; `Timeout` when supporting nodes exist but none freed up in
    /// time.
    pub async fn new_session(&self, requested: Capabilities) -> Result<Session, SchedulingError> {
        let (reserved, supported) = self.try_reserve(&requested).await;
        if let Some(session) = reserved {
            if let Err(e) = self.session_map.add(session.clone()).await {
                warn!(session_id = %session.id, error = %e, "directory rejected the new session; releasing its slot");
                self.release_reservation(&session).await;
                return Err(e.into());
            }
            info!(session_id = %session.id, uri = %session.uri, "session created");
            return Ok(session);
        }
        if !supported {
            debug!("no node supports the requested capabilities");
            return Err(SchedulingError::NoCapacity);
        }

        let (request_id, rx) = self.queue.enqueue(requested);
        info!(request_id = %request_id, "request queued awaiting capacity");
        // Capacity may have freed up between the scan and the enqueue.
        self.service_queue().await;

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(Ok(session))) => Ok(session),
            Ok(Ok(Err(QueueError::Timeout))) => Err(SchedulingError::Timeout),
            Ok(Ok(Err(QueueError::Cancelled)) | Err(_)) => Err(SchedulingError::NoCapacity),
            Err(_elapsed) => {
                self.queue.remove(request_id);
                Err(SchedulingError::Timeout)
            }
        }
    }

    /// Stop a session wherever it lives, evict its directory entry and
    /// announce the freed capacity.
    ///
    /// # Errors
    ///
    /// `NotFound` if no registered node owns the session; a second stop of
    /// the same id reports the same.
    pub async fn stop_session(&self, id: SessionId) -> Result<(), SchedulingError> {
        let nodes: Vec<Arc<dyn Node>> = self.nodes.read().clone();
        for node in nodes {
            if !node.is_session_owner(id).await {
                continue;
            }
            match node.stop_session(id).await {
                Ok(()) => {}
                Err(NodeError::NotFound(_)) => return Err(SchedulingError::NotFound(id)),
                Err(e) => return Err(SchedulingError::NodeUnreachable(e.to_string())),
            }
            self.session_map.remove(id).await?;
            self.bus.publish(GridEvent::SessionClosed { id });
            info!(session_id = %id, "session stopped");
            self.service_queue().await;
            return Ok(());
        }
        Err(SchedulingError::NotFound(id))
    }

    /// Whether the grid can take traffic: enough ready nodes and a live
    /// session directory.
    pub async fn is_ready(&self) -> bool {
        let nodes: Vec<Arc<dyn Node>> = self.nodes.read().clone();
        let mut ready = 0;
        for node in nodes {
            if node.is_ready().await {
                ready += 1;
            }
        }
        ready >= self.config.min_ready_nodes && self.session_map.is_ready().await
    }

    /// Match pending queue entries against current free capacity.
    ///
    /// Called on every capacity-changing event; safe to call redundantly.
    pub async fn service_queue(&self) {
        let expired = self.queue.expire_overdue();
        if expired > 0 {
            debug!(expired, "expired overdue queued requests");
        }

        loop {
            let statuses = self.capacity_snapshot().await;
            let has_free_match = |caps: &Capabilities| {
                statuses
                    .iter()
                    .any(|status| status.has_free_slot_matching(&*self.capability_matcher, caps))
            };

            let Some(entry) = self.queue.poll(&has_free_match) else {
                break;
            };
            let (reserved, _) = self.try_reserve(&entry.capabilities).await;
            match reserved {
                Some(session) => {
                    if let Err(e) = self.session_map.add(session.clone()).await {
                        // Never hand out a session the directory cannot
                        // route; the entry goes back and waits for the
                        // next attempt or its deadline.
                        warn!(request_id = %entry.id, session_id = %session.id, error = %e, "directory rejected a queued session; releasing its slot");
                        self.release_reservation(&session).await;
                        self.queue.requeue_front(entry);
                        break;
                    }
                    debug!(request_id = %entry.id, session_id = %session.id, "queued request satisfied");
                    if let Err(orphan) = entry.complete(session) {
                        self.release_orphan(orphan).await;
                    }
                }
                None => {
                    // Lost the reservation race since the snapshot; put the
                    // entry back at the head and try again on the next event.
                    self.queue.requeue_front(entry);
                    break;
                }
            }
        }
    }

    /// Scan nodes in priority order and reserve a slot if any is free.
    ///
    /// The second element reports whether any node supported the request at
    /// all, which separates "never possible" from "busy right now".
    async fn try_reserve(&self, requested: &Capabilities) -> (Option<Session>, bool) {
        let nodes: Vec<Arc<dyn Node>> = self.nodes.read().clone();
        let mut candidates = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node.status().await {
                Ok(status) => candidates.push((node, status)),
                Err(NodeError::Unreachable(msg)) => self.evict_unreachable(&node, &msg),
                Err(e) => {
                    warn!(node_id = %node.id(), error = %e, "skipping node with failing status");
                }
            }
        }
        candidates.sort_by(|(_, a), (_, b)| self.node_prioritizer.compare(a, b));

        let mut supported = false;
        for (node, _) in candidates {
            if !node.is_supporting(requested).await {
                continue;
            }
            supported = true;
            match node.new_session(requested.clone()).await {
                Ok(session) => return (Some(session), true),
                Err(NodeError::NoCapacity) => {}
                Err(NodeError::Unreachable(msg)) => self.evict_unreachable(&node, &msg),
                Err(e) => {
                    warn!(node_id = %node.id(), error = %e, "node failed a reservation attempt");
                }
            }
        }
        (None, supported)
    }

    async fn capacity_snapshot(&self) -> Vec<NodeStatus> {
        let nodes: Vec<Arc<dyn Node>> = self.nodes.read().clone();
        let mut statuses = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node.status().await {
                Ok(status) => statuses.push(status),
                Err(NodeError::Unreachable(msg)) => self.evict_unreachable(&node, &msg),
                Err(e) => {
                    warn!(node_id = %node.id(), error = %e, "skipping node with failing status");
                }
            }
        }
        statuses
    }

    /// Drop a node that stopped answering, announcing the removal so the
    /// cleanup listener can evict whatever it owned.
    fn evict_unreachable(&self, node: &Arc<dyn Node>, reason: &str) {
        let id = node.id();
        let removed = {
            let mut nodes = self.nodes.write();
            match nodes.iter().position(|n| n.id() == id) {
                Some(index) => {
                    nodes.remove(index);
                    true
                }
                None => false,
            }
        };
        if removed {
            warn!(node_id = %id, reason, "removing unreachable node");
            self.bus.publish(GridEvent::NodeRemoved {
                status: NodeStatus {
                    node_id: id,
                    uri: node.external_uri().to_string(),
                    slots: Vec::new(),
                },
            });
        }
    }

    /// A queued caller gave up between the match and the delivery: the
    /// reservation it would have received must be unwound.
    async fn release_orphan(&self, session: Session) {
        warn!(session_id = %session.id, "queued caller went away; releasing its session");
        self.release_reservation(&session).await;
    }

    /// Unwind a slot reservation whose session cannot be used: stop it on
    /// the owning node, evict any directory entry and announce the freed
    /// capacity.
    async fn release_reservation(&self, session: &Session) {
        let nodes: Vec<Arc<dyn Node>> = self.nodes.read().clone();
        for node in nodes {
            if node.is_session_owner(session.id).await {
                if let Err(e) = node.stop_session(session.id).await {
                    warn!(session_id = %session.id, error = %e, "failed to release reserved slot");
                }
                break;
            }
        }
        if let Err(e) = self.session_map.remove(session.id).await {
            warn!(session_id = %session.id, error = %e, "failed to evict released session");
        }
        self.bus.publish(GridEvent::SessionClosed { id: session.id });
    }

    /// Re-poll the queue whenever an observed event can have changed free
    /// capacity. The task holds only a weak handle, so dropping the
    /// distributor (or closing the bus) ends it.
    fn spawn_service_task(distributor: &Arc<Self>) {
        let weak = Arc::downgrade(distributor);
        let mut rx = distributor.bus.subscribe();
        tokio::spawn(async move {
            loop {
                let capacity_changed = match rx.recv().await {
                    Ok(GridEvent::NodeAdded { .. } | GridEvent::SessionClosed { .. }) => true,
                    Ok(_) => false,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "queue servicing lagged behind the event bus");
                        true
                    }
                    Err(RecvError::Closed) => break,
                };
                if capacity_changed {
                    let Some(distributor) = weak.upgrade() else {
                        break;
                    };
                    distributor.service_queue().await;
                }
            }
            debug!("queue servicing task stopped");
        });
    }
}
