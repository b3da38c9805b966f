//! HTTP server exposing a node over the node protocol.
//!
//! Serves any [`Node`] implementation; in practice this wraps a
//! [`crate::LocalNode`] so out-of-process hubs can drive it through
//! [`crate::RemoteNode`].

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::debug;

use grid_proto::{NodeStatus, Session, SessionId};

use crate::error::NodeError;
use crate::node::{CommandRequest, Node};
use crate::wire::{NewSessionRequest, OwnerResponse};

type NodeState = Arc<dyn Node>;

/// Errors surfaced by the node HTTP handlers.
#[derive(Debug)]
enum ApiError {
    /// A path parameter was not a valid session id.
    InvalidId(String),
    /// The node operation itself failed.
    Node(NodeError),
}

impl From<NodeError> for ApiError {
    fn from(err: NodeError) -> Self {
        Self::Node(err)
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
            Self::Node(err) => {
                let (status, kind) = match &err {
                    NodeError::NoCapacity => (StatusCode::SERVICE_UNAVAILABLE, "no_capacity"),
                    NodeError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                    NodeError::Unreachable(_) => (StatusCode::BAD_GATEWAY, "node_unreachable"),
                    NodeError::Protocol(_) => (StatusCode::INTERNAL_SERVER_ERROR, "protocol_error"),
                };
                (status, kind, err.to_string())
            }
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

/// Handle `POST /session` - create a session.
async fn create_session(
    State(node): State<NodeState>,
    Json(request): Json<NewSessionRequest>,
) -> Result<Json<Session>, ApiError> {
    let session = node.new_session(request.capabilities).await?;
    Ok(Json(session))
}

/// Handle `GET /session/{id}` - describe a session.
async fn describe_session(
    State(node): State<NodeState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let id = parse_session_id(&id)?;
    let session = node.get_session(id).await?;
    Ok(Json(session))
}

/// Handle `GET /session/{id}/owner` - ownership check.
async fn session_owner(
    State(node): State<NodeState>,
    Path(id): Path<String>,
) -> Result<Json<OwnerResponse>, ApiError> {
    let id = parse_session_id(&id)?;
    let owner = node.is_session_owner(id).await;
    Ok(Json(OwnerResponse { owner }))
}

/// Handle `DELETE /session/{id}` - stop a session.
async fn stop_session(
    State(node): State<NodeState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_session_id(&id)?;
    node.stop_session(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handle `GET /status` - frozen node snapshot.
async fn node_status(State(node): State<NodeState>) -> Result<Json<NodeStatus>, ApiError> {
    let status = node.status().await?;
    Ok(Json(status))
}

/// Handle `GET /readyz` - liveness probe.
async fn readyz(State(node): State<NodeState>) -> StatusCode {
    if node.is_ready().await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Handle any method under `/session/{id}/...` - automation pass-through.
async fn pass_through(
    State(node): State<NodeState>,
    Path((id, _rest)): Path<(String, String)>,
    request: Request,
) -> Result<Response, ApiError> {
    let session_id = parse_session_id(&id)?;

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let headers = request.headers().clone();
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|e| ApiError::Node(NodeError::Protocol(e.to_string())))?
        .to_vec();

    debug!(session_id = %session_id, %method, path = %path, "pass-through command");

    let command = CommandRequest {
        session_id,
        method,
        path,
        headers,
        body,
    };
    let response = node.execute_command(command).await?;

    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(response.body))
        .map_err(|e| ApiError::Node(NodeError::Protocol(e.to_string())))
}

/// Create the node protocol router for a node.
pub fn node_router(node: Arc<dyn Node>) -> Router {
    Router::new()
        .route("/session", post(create_session))
        .route("/session/{id}", get(describe_session))
        .route("/session/{id}", delete(stop_session))
        .route("/session/{id}/owner", get(session_owner))
        .route("/session/{id}/{*rest}", any(pass_through))
        .route("/status", get(node_status))
        .route("/readyz", get(readyz))
        .with_state(node)
        .layer(TraceLayer::new_for_http())
}
