//! The session directory contract.

use async_trait::async_trait;
use grid_proto::{Session, SessionId};

use crate::error::SessionMapError;

/// A durable session-id → session mapping shared across the grid.
///
/// At most one entry exists per id; a given id is only ever written once
/// by design, so concurrent writers of the same id are last-write-wins.
/// Absence of an entry is the well-defined "no such session" state.
#[async_trait]
pub trait SessionMap: Send + Sync + std::fmt::Debug {
    /// Insert a session, overwriting any previous entry for the same id.
    ///
    /// # Errors
    ///
    /// `Store` if the backing store rejected the write.
    async fn add(&self, session: Session) -> Result<(), SessionMapError>;

    /// Fetch a session by id.
    ///
    /// # Errors
    ///
    /// `NotFound` if no entry exists.
    async fn get(&self, id: SessionId) -> Result<Session, SessionMapError>;

    /// Fetch only the owning node's address. The hot routing path needs
    /// nothing else.
    ///
    /// # Errors
    ///
    /// `NotFound` if no entry exists.
    async fn uri_of(&self, id: SessionId) -> Result<String, SessionMapError>;

    /// Delete an entry. Removing a nonexistent id is not an error;
    /// multiple subsystems may race to clean up the same session.
    ///
    /// # Errors
    ///
    /// `Store` if the backing store failed.
    async fn remove(&self, id: SessionId) -> Result<(), SessionMapError>;

    /// All current entries. Used by event-driven cleanup and diagnostics,
    /// never on the routing hot path.
    ///
    /// # Errors
    ///
    /// `Store` if the backing store failed.
    async fn all(&self) -> Result<Vec<Session>, SessionMapError>;

    /// Liveness probe of the backing store.
    async fn is_ready(&self) -> bool;
}
