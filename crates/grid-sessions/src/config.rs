//! Backend selection for the session directory.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SessionMapError;
use crate::file::FileSessionMap;
use crate::map::SessionMap;
use crate::memory::InMemorySessionMap;
use crate::remote::RemoteSessionMap;

/// Declarative choice of session directory backend, resolved at startup.
///
/// An invalid selection fails fast with a configuration error before the
/// hub accepts any requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMapConfig {
    /// Backend name: `memory`, `file` or `remote`.
    pub backend: String,
    /// Snapshot path, required by the `file` backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Directory service base URL, required by the `remote` backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Default for SessionMapConfig {
    fn default() -> Self {
        Self::memory()
    }
}

impl SessionMapConfig {
    /// Process-local map.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            backend: "memory".to_string(),
            path: None,
            url: None,
        }
    }

    /// Shared JSON snapshot file.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: "file".to_string(),
            path: Some(path.into()),
            url: None,
        }
    }

    /// Remote directory service.
    #[must_use]
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            backend: "remote".to_string(),
            path: None,
            url: Some(url.into()),
        }
    }

    /// Construct the configured backend.
    ///
    /// # Errors
    ///
    /// `Configuration` if the backend name is unknown or a required
    /// parameter is missing.
    pub fn build(&self) -> Result<Arc<dyn SessionMap>, SessionMapError> {
        let map: Arc<dyn SessionMap> = match self.backend.as_str() {
            "memory" => Arc::new(InMemorySessionMap::new()),
            "file" => {
                let path = self.path.as_ref().ok_or_else(|| {
                    SessionMapError::Configuration(
                        "file backend requires a snapshot path".to_string(),
                    )
                })?;
                Arc::new(FileSessionMap::new(path))
            }
            "remote" => {
                let url = self.url.as_ref().ok_or_else(|| {
                    SessionMapError::Configuration(
                        "remote backend requires a directory URL".to_string(),
                    )
                })?;
                Arc::new(RemoteSessionMap::new(url.clone()))
            }
            other => {
                return Err(SessionMapError::Configuration(format!(
                    "unknown session map backend '{other}'"
                )));
            }
        };
        info!(backend = %self.backend, "session directory configured");
        Ok(map)
    }
}
