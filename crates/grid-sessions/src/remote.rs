//! HTTP client implementation of the session directory contract.
//!
//! Forwards every call to a remote instance of the directory protocol
//! (see [`crate::server`]), letting the directory run as an independent
//! network service. Works unmodified against any server-side backend.

use async_trait::async_trait;
use grid_proto::{Session, SessionId};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SessionMapError;
use crate::map::SessionMap;

/// Body of `GET /se/grid/session/{id}/uri`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UriResponse {
    /// The owning node's address.
    pub uri: String,
}

/// Session directory client speaking the directory HTTP protocol.
#[derive(Debug)]
pub struct RemoteSessionMap {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteSessionMap {
    /// Point a client at a served directory.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn store_error(err: &reqwest::Error) -> SessionMapError {
        SessionMapError::Store(err.to_string())
    }
}

#[async_trait]
impl SessionMap for RemoteSessionMap {
    async fn add(&self, session: Session) -> Result<(), SessionMapError> {
        let response = self
            .client
            .post(self.url("/se/grid/session"))
            .json(&session)
            .send()
            .await
            .map_err(|e| Self::store_error(&e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SessionMapError::Store(format!(
                "unexpected status {} adding session",
                response.status()
            )))
        }
    }

    async fn get(&self, id: SessionId) -> Result<Session, SessionMapError> {
        let response = self
            .client
            .get(self.url(&format!("/se/grid/session/{id}")))
            .send()
            .await
            .map_err(|e| Self::store_error(&e))?;

        match response.status() {
            StatusCode::OK => response
                .json::<Session>()
                .await
                .map_err(|e| Self::store_error(&e)),
            StatusCode::NOT_FOUND => Err(SessionMapError::NotFound(id)),
            other => Err(SessionMapError::Store(format!(
                "unexpected status {other} fetching session"
            ))),
        }
    }

    async fn uri_of(&self, id: SessionId) -> Result<String, SessionMapError> {
        let response = self
            .client
            .get(self.url(&format!("/se/grid/session/{id}/uri")))
            .send()
            .await
            .map_err(|e| Self::store_error(&e))?;

        match response.status() {
            StatusCode::OK => response
                .json::<UriResponse>()
                .await
                .map(|u| u.uri)
                .map_err(|e| Self::store_error(&e)),
            StatusCode::NOT_FOUND => Err(SessionMapError::NotFound(id)),
            other => Err(SessionMapError::Store(format!(
                "unexpected status {other} fetching session uri"
            ))),
        }
    }

    async fn remove(&self, id: SessionId) -> Result<(), SessionMapError> {
        let response = self
            .client
            .delete(self.url(&format!("/se/grid/session/{id}")))
            .send()
            .await
            .map_err(|e| Self::store_error(&e))?;

        // The server answers 204 regardless of prior existence.
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SessionMapError::Store(format!(
                "unexpected status {} removing session",
                response.status()
            )))
        }
    }

    async fn all(&self) -> Result<Vec<Session>, SessionMapError> {
        let response = self
            .client
            .get(self.url("/se/grid/sessions"))
            .send()
            .await
            .map_err(|e| Self::store_error(&e))?;

        if response.status() == StatusCode::OK {
            response
                .json::<Vec<Session>>()
                .await
                .map_err(|e| Self::store_error(&e))
        } else {
            Err(SessionMapError::Store(format!(
                "unexpected status {} listing sessions",
                response.status()
            )))
        }
    }

    async fn is_ready(&self) -> bool {
        match self.client.get(self.url("/readyz")).send().await {
            Ok(resp) => resp.status().is_success() || resp.status() == StatusCode::NO_CONTENT,
            Err(e) => {
                warn!(url = %self.base_url, error = %e, "session directory unreachable");
                false
            }
        }
    }
}
