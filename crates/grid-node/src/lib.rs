//! Worker node abstraction for gridhub.
//!
//! A node owns a fixed set of [`Slot`]s, each tagged with a capability
//! stereotype. [`LocalNode`] runs sessions in-process (embedding and
//! testing); [`RemoteNode`] proxies the same contract over HTTP to an
//! out-of-process worker. [`node_router`] serves a node over the node HTTP
//! protocol so the two interoperate.

pub mod error;
pub mod local;
pub mod node;
pub mod remote;
pub mod server;
pub mod slot;
pub mod wire;

pub use error::NodeError;
pub use local::{CommandHandler, LocalNode, LocalNodeBuilder, OkHandler};
pub use node::{CommandRequest, CommandResponse, Node};
pub use remote::RemoteNode;
pub use server::node_router;
pub use slot::Slot;
