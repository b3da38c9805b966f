//! Matching engine for gridhub.
//!
//! The [`Distributor`] pairs capability-tagged new-session requests with
//! free node slots, parks unsatisfiable requests in the new-session queue,
//! and re-polls them as capacity events arrive on the grid bus.
//! [`proxy_router`] is the client-facing HTTP surface: session creation
//! and teardown plus verbatim command forwarding to the owning node.

pub mod config;
pub mod distributor;
pub mod error;
pub mod prioritizer;
pub mod proxy;

pub use config::DistributorConfig;
pub use distributor::{Distributor, DistributorBuilder};
pub use error::SchedulingError;
pub use prioritizer::{prioritizer_from_name, LeastLoaded, NodePrioritizer, RegistrationOrder};
pub use proxy::proxy_router;
