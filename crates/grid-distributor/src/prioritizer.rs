//! Node ordering policies for the matching scan.

use std::cmp::Ordering;
use std::sync::Arc;

use grid_proto::NodeStatus;

use crate::error::SchedulingError;

/// Pluggable ordering of candidate nodes.
///
/// Applied with a stable sort over `(node, status)` snapshots, so a policy
/// that reports `Equal` preserves registration order.
pub trait NodePrioritizer: Send + Sync + std::fmt::Debug {
    /// Compare two candidate nodes; `Less` is attempted first.
    fn compare(&self, a: &NodeStatus, b: &NodeStatus) -> Ordering;
}

/// Default policy: nodes are attempted in registration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrationOrder;

impl NodePrioritizer for RegistrationOrder {
    fn compare(&self, _a: &NodeStatus, _b: &NodeStatus) -> Ordering {
        Ordering::Equal
    }
}

/// Prefer the node with the lowest occupied-slot ratio, spreading sessions
/// across the fleet. Ties fall back to registration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastLoaded;

impl NodePrioritizer for LeastLoaded {
    fn compare(&self, a: &NodeStatus, b: &NodeStatus) -> Ordering {
        a.load_ratio()
            .partial_cmp(&b.load_ratio())
            .unwrap_or(Ordering::Equal)
    }
}

/// Resolve a node prioritizer by configured name.
///
/// # Errors
///
/// `Configuration` if the name does not correspond to a known policy.
pub fn prioritizer_from_name(name: &str) -> Result<Arc<dyn NodePrioritizer>, SchedulingError> {
    match name {
        "registration" => Ok(Arc::new(RegistrationOrder)),
        "least-loaded" => Ok(Arc::new(LeastLoaded)),
        other => Err(SchedulingError::Configuration(format!(
            "unknown node prioritizer '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_proto::{Capabilities, NodeId, Session, SlotId, SlotStatus};

    // ==================== Helper Functions ====================

    fn firefox() -> Capabilities {
        Capabilities::new().with("browserName", "firefox")
    }

    fn make_status(occupied: usize, total: usize) -> NodeStatus {
        let slots = (0..total)
            .map(|i| SlotStatus {
                slot_id: SlotId::new(),
                stereotype: firefox(),
                session: (i < occupied)
                    .then(|| Session::new("http://worker-1:5555", firefox(), firefox())),
            })
            .collect();
        NodeStatus {
            node_id: NodeId::new(),
            uri: "http://worker-1:5555".to_string(),
            slots,
        }
    }

    // ==================== Policy Tests ====================

    #[test]
    fn test_registration_order_never_reorders() {
        let a = make_status(4, 4);
        let b = make_status(0, 4);
        assert_eq!(RegistrationOrder.compare(&a, &b), Ordering::Equal);
    }

    #[test]
    fn test_least_loaded_prefers_emptier_node() {
        let busy = make_status(3, 4);
        let idle = make_status(1, 4);
        assert_eq!(LeastLoaded.compare(&idle, &busy), Ordering::Less);
        assert_eq!(LeastLoaded.compare(&busy, &idle), Ordering::Greater);
    }

    #[test]
    fn test_least_loaded_stable_sort_keeps_tied_order() {
        let first = make_status(1, 2);
        let second = make_status(2, 4);

        let mut candidates = vec![first.clone(), second.clone()];
        candidates.sort_by(|a, b| LeastLoaded.compare(a, b));

        // Equal ratios: the stable sort leaves registration order alone.
        assert_eq!(candidates[0].node_id, first.node_id);
        assert_eq!(candidates[1].node_id, second.node_id);
    }

    #[test]
    fn test_prioritizer_from_name() {
        assert!(prioritizer_from_name("registration").is_ok());
        assert!(prioritizer_from_name("least-loaded").is_ok());
        assert!(matches!(
            prioritizer_from_name("round-robin"),
            Err(SchedulingError::Configuration(_))
        ));
    }
}
