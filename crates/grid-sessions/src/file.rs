//! Session directory backed by a JSON snapshot file.
//!
//! For deployments where several hub processes share a volume. Every read
//! goes back to the file, so a process never sees a stale alias after its
//! own write or a peer's; every write rewrites the snapshot atomically via
//! a temp file and rename.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use grid_proto::{Session, SessionId};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::SessionMapError;
use crate::map::SessionMap;

/// Session directory persisted as one JSON file.
#[derive(Debug)]
pub struct FileSessionMap {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process; cross-process
    // consistency rides on the atomic rename.
    write_lock: Mutex<()>,
}

impl FileSessionMap {
    /// Open (or create on first write) the snapshot at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The snapshot file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<SessionId, Session>, SessionMapError> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| SessionMapError::Store(format!("corrupt session snapshot: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(SessionMapError::Store(e.to_string())),
        }
    }

    fn snapshot(&self, entries: &HashMap<SessionId, Session>) -> Result<(), SessionMapError> {
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| SessionMapError::Store(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|e| SessionMapError::Store(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| SessionMapError::Store(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SessionMap for FileSessionMap {
    async fn add(&self, session: Session) -> Result<(), SessionMapError> {
        let _guard = self.write_lock.lock();
        let mut entries = self.load()?;
        debug!(session_id = %session.id, path = %self.path.display(), "session added to file directory");
        entries.insert(session.id, session);
        self.snapshot(&entries)
    }

    async fn get(&self, id: SessionId) -> Result<Session, SessionMapError> {
        self.load()?
            .remove(&id)
            .ok_or(SessionMapError::NotFound(id))
    }

    async fn uri_of(&self, id: SessionId) -> Result<String, SessionMapError> {
        self.get(id).await.map(|s| s.uri)
    }

    async fn remove(&self, id: SessionId) -> Result<(), SessionMapError> {
        let _guard = self.write_lock.lock();
        let mut entries = self.load()?;
        if entries.remove(&id).is_some() {
            debug!(session_id = %id, "session removed from file directory");
            self.snapshot(&entries)?;
        }
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Session>, SessionMapError> {
        Ok(self.load()?.into_values().collect())
    }

    async fn is_ready(&self) -> bool {
        // Ready when the snapshot's directory exists and any existing
        // snapshot parses.
        let parent_ok = self
            .path
            .parent()
            .is_none_or(|dir| dir.as_os_str().is_empty() || dir.exists());
        if !parent_ok {
            warn!(path = %self.path.display(), "session snapshot directory missing");
            return false;
        }
        self.load().is_ok()
    }
}
