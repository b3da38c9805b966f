//! HTTP server exposing a session directory over the directory protocol.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use grid_proto::{Session, SessionId};

use crate::error::SessionMapError;
use crate::map::SessionMap;
use crate::remote::UriResponse;

type MapState = Arc<dyn SessionMap>;

/// Errors surfaced by the directory HTTP handlers.
#[derive(Debug)]
enum ApiError {
    /// A path parameter was not a valid session id.
    InvalidId(String),
    /// The directory operation itself failed.
    Map(SessionMapError),
}

impl From<SessionMapError> for ApiError {
    fn from(err: SessionMapError) -> Self {
        Self::Map(err)
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
            Self::Map(err) => {
                let (status, kind) = match &err {
                    SessionMapError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                    SessionMapError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
                    SessionMapError::Configuration(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
                    }
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

/// Handle `POST /se/grid/session` - add an entry.
async fn add_session(
    State(map): State<MapState>,
    Json(session): Json<Session>,
) -> Result<StatusCode, ApiError> {
    map.add(session).await?;
    Ok(StatusCode::OK)
}

/// Handle `GET /se/grid/session/{id}` - fetch an entry.
async fn get_session(
    State(map): State<MapState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let id = parse_session_id(&id)?;
    let session = map.get(id).await?;
    Ok(Json(session))
}

/// Handle `GET /se/grid/session/{id}/uri` - owning address only.
async fn get_session_uri(
    State(map): State<MapState>,
    Path(id): Path<String>,
) -> Result<Json<UriResponse>, ApiError> {
    let id = parse_session_id(&id)?;
    let uri = map.uri_of(id).await?;
    Ok(Json(UriResponse { uri }))
}

/// Handle `DELETE /se/grid/session/{id}` - 204 regardless of existence.
async fn remove_session(
    State(map): State<MapState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_session_id(&id)?;
    map.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handle `GET /se/grid/sessions` - list all entries.
async fn list_sessions(State(map): State<MapState>) -> Result<Json<Vec<Session>>, ApiError> {
    let sessions = map.all().await?;
    Ok(Json(sessions))
}

/// Handle `GET /readyz` - backing-store liveness.
async fn readyz(State(map): State<MapState>) -> StatusCode {
    if map.is_ready().await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Create the directory protocol router for any backing store.
pub fn sessionmap_router(map: Arc<dyn SessionMap>) -> Router {
    Router::new()
        .route("/se/grid/session", axum::routing::post(add_session))
        .route(
            "/se/grid/session/{id}",
            get(get_session).delete(remove_session),
        )
        .route("/se/grid/session/{id}/uri", get(get_session_uri))
        .route("/se/grid/sessions", get(list_sessions))
        .route("/readyz", get(readyz))
        .with_state(map)
        .layer(TraceLayer::new_for_http())
}
