//! Client-facing HTTP surface of the grid.
//!
//! Serves session creation and teardown, and forwards every other
//! session-scoped command verbatim to the owning node, resolved through
//! the session directory. The proxy itself holds no session state, so any
//! number of instances can front the same grid.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use grid_node::wire::NewSessionRequest;
use grid_proto::{Session, SessionId};
use grid_sessions::SessionMap;

use crate::distributor::Distributor;
use crate::error::SchedulingError;

/// Request headers that must not travel through the proxy.
const HOP_BY_HOP: &[&str] = &["host", "content-length", "transfer-encoding", "connection"];

/// Shared state of the proxy handlers.
#[derive(Debug, Clone)]
struct ProxyState {
    distributor: Arc<Distributor>,
    session_map: Arc<dyn SessionMap>,
    client: reqwest::Client,
}

/// Errors surfaced by the proxy handlers.
#[derive(Debug)]
enum ApiError {
    /// A path parameter was not a valid session id.
    InvalidId(String),
    /// Scheduling itself failed.
    Scheduling(SchedulingError),
    /// The owning node could not be reached while forwarding.
    Upstream(String),
    /// The proxy failed to assemble a response.
    Internal(String),
}

impl From<SchedulingError> for ApiError {
    fn from(err: SchedulingError) -> Self {
        Self::Scheduling(err)
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::InvalidId(id) => (
                StatusCode::BAD_REQUEST,
                "invalid_id",
                format!("invalid session ID: {id}"),
            ),
            Self::Scheduling(err) => {
                let (status, kind) = match &err {
                    SchedulingError::NoCapacity => (StatusCode::SERVICE_UNAVAILABLE, "no_capacity"),
                    SchedulingError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                    SchedulingError::NotFound(_) | SchedulingError::NodeNotFound(_) => {
                        (StatusCode::NOT_FOUND, "not_found")
                    }
                    SchedulingError::NodeUnreachable(_) => {
                        (StatusCode::BAD_GATEWAY, "node_unreachable")
                    }
                    SchedulingError::Directory(_) | SchedulingError::Configuration(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
                    }
                };
                (status, kind, err.to_string())
            }
            Self::Upstream(msg) => (
                StatusCode::BAD_GATEWAY,
                "node_unreachable",
                format!("owning node unreachable: {msg}"),
            ),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };
        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"error":"internal_error","message":"failed to serialize error"}"#.to_string()
        });

        (status, [("content-type", "application/json")], json).into_response()
    }
}

fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    SessionId::parse(raw).map_err(|_| ApiError::InvalidId(raw.to_string()))
}

/// Handle `POST /se/grid/session` - create a session.
async fn create_session(
    State(state): State<ProxyState>,
    Json(request): Json<NewSessionRequest>,
) -> Result<Json<Session>, ApiError> {
    let session = state.distributor.new_session(request.capabilities).await?;
    Ok(Json(session))
}

/// Handle `DELETE /se/grid/session/{id}` - stop a session.
async fn remove_session(
    State(state): State<ProxyState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_session_id(&id)?;
    state.distributor.stop_session(id).await?;
    Ok(StatusCode::OK)
}

/// Handle `GET /readyz` - grid readiness.
async fn readyz(State(state): State<ProxyState>) -> StatusCode {
    if state.distributor.is_ready().await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Forward an arbitrary session command to the owning node, verbatim.
async fn forward_command(
    State(state): State<ProxyState>,
    Path((id, rest)): Path<(String, String)>,
    request: Request,
) -> Result<Response, ApiError> {
    let session_id = parse_session_id(&id)?;
    let uri = state
        .session_map
        .uri_of(session_id)
        .await
        .map_err(|e| ApiError::Scheduling(e.into()))?;

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to read request body: {e}")))?;

    let mut target = format!("{uri}/session/{session_id}/{rest}");
    if let Some(query) = parts.uri.query() {
        target.push('?');
        target.push_str(query);
    }
    debug!(session_id = %session_id, target = %target, "forwarding session command");

    let mut headers = parts.headers;
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }

    let upstream = state
        .client
        .request(parts.method, &target)
        .headers(headers)
        .body(body.to_vec())
        .send()
        .await
        .map_err(|e| {
            warn!(session_id = %session_id, error = %e, "owning node did not answer");
            ApiError::Upstream(e.to_string())
        })?;

    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    let mut builder = Response::builder().status(status);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in &upstream_headers {
            if !HOP_BY_HOP.contains(&name.as_str()) {
                headers.insert(name, value.clone());
            }
        }
    }
    builder
        .body(Body::from(bytes))
        .map_err(|e| ApiError::Internal(format!("failed to assemble response: {e}")))
}

/// Create the client-facing router.
#[must_use]
pub fn proxy_router(distributor: Arc<Distributor>, session_map: Arc<dyn SessionMap>) -> Router {
    let state = ProxyState {
        distributor,
        session_map,
        client: reqwest::Client::new(),
    };
    Router::new()
        .route("/se/grid/session", post(create_session))
        .route("/se/grid/session/{id}", delete(remove_session))
        .route("/readyz", get(readyz))
        .route("/session/{id}/{*rest}", any(forward_command))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
