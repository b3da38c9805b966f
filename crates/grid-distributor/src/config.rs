//! Distributor tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default window a queued request may wait for capacity.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a [`crate::Distributor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributorConfig {
    /// How long a request without immediate capacity may wait in the queue.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    /// Minimum number of ready nodes for the distributor to report ready.
    pub min_ready_nodes: usize,
    /// Node ordering policy: `registration` or `least-loaded`.
    pub node_prioritizer: String,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            min_ready_nodes: 1,
            node_prioritizer: "registration".to_string(),
        }
    }
}

mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
