//! Process-local session directory.

use std::collections::HashMap;

use async_trait::async_trait;
use grid_proto::{Session, SessionId};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::SessionMapError;
use crate::map::SessionMap;

/// Session directory backed by an in-process concurrent map.
///
/// The default for single-hub deployments and for tests.
#[derive(Debug, Default)]
pub struct InMemorySessionMap {
    entries: RwLock<HashMap<SessionId, Session>>,
}

impl InMemorySessionMap {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl SessionMap for InMemorySessionMap {
    async fn add(&self, session: Session) -> Result<(), SessionMapError> {
        debug!(session_id = %session.id, uri = %session.uri, "session added to directory");
        self.entries.write().insert(session.id, session);
        Ok(())
    }

    async fn get(&self, id: SessionId) -> Result<Session, SessionMapError> {
        self.entries
            .read()
            .get(&id)
            .cloned()
            .ok_or(SessionMapError::NotFound(id))
    }

    async fn uri_of(&self, id: SessionId) -> Result<String, SessionMapError> {
        self.entries
            .read()
            .get(&id)
            .map(|s| s.uri.clone())
            .ok_or(SessionMapError::NotFound(id))
    }

    async fn remove(&self, id: SessionId) -> Result<(), SessionMapError> {
        if self.entries.write().remove(&id).is_some() {
            debug!(session_id = %id, "session removed from directory");
        }
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Session>, SessionMapError> {
        Ok(self.entries.read().values().cloned().collect())
    }

    async fn is_ready(&self) -> bool {
        true
    }
}
