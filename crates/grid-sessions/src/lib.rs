//! Session directory for gridhub.
//!
//! A durable session-id → owner mapping, queryable independently of any
//! node or distributor instance so a stateless proxy tier can route
//! follow-up commands. Three interchangeable backends implement the same
//! [`SessionMap`] contract: a process-local map, a shared JSON snapshot
//! file, and an HTTP client of the directory protocol served by
//! [`sessionmap_router`]. All three are protocol-interoperable.

pub mod cleanup;
pub mod config;
pub mod error;
pub mod file;
pub mod map;
pub mod memory;
pub mod remote;
pub mod server;

pub use cleanup::SessionCleanup;
pub use config::SessionMapConfig;
pub use error::SessionMapError;
pub use file::FileSessionMap;
pub use map::SessionMap;
pub use memory::InMemorySessionMap;
pub use remote::RemoteSessionMap;
pub use server::sessionmap_router;
