//! Note, search, graph, and event-stream handlers

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;

use super::AppState;
use crate::service::ServiceError;

/// Service errors rendered as HTTP responses. Client-facing bodies carry a
/// short generic message; details go to the log only.
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            ServiceError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ServiceError::AlreadyExists => (StatusCode::CONFLICT, "already exists".to_string()),
            ServiceError::Conflict => (StatusCode::CONFLICT, "checksum mismatch".to_string()),
            ServiceError::Invalid(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServiceError::PermissionDenied => {
                (StatusCode::BAD_REQUEST, "invalid path".to_string())
            }
            ServiceError::Transient(e) => {
                tracing::warn!(error = %e, "transient failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "temporarily unavailable".to_string(),
                )
            }
            ServiceError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default)]
    limit: i64,
    #[serde(default)]
    offset: i64,
    tag: Option<String>,
    #[serde(default)]
    sort: String,
}

pub async fn list_notes(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (notes, total) = state
        .service
        .list_notes(
            params.limit,
            params.offset,
            params.tag.as_deref(),
            &params.sort,
        )
        .await?;
    Ok(Json(serde_json::json!({ "notes": notes, "total": total })))
}

pub async fn get_note(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let note = state.service.get_note(&path).await?;
    Ok(Json(note))
}

#[derive(Deserialize)]
pub struct CreateNoteRequest {
    #[serde(default)]
    path: String,
    #[serde(default)]
    content: String,
}

pub async fn create_note(
    State(state): State<AppState>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.path.is_empty() || req.content.is_empty() {
        return Err(ServiceError::Invalid("path and content are required".into()).into());
    }
    let note = state
        .service
        .create_note(&req.path, req.content.as_bytes())
        .await?;
    // Broker events for this write arrive via the watcher, which observes
    // the rename like any external edit.
    Ok((StatusCode::CREATED, Json(note)))
}

#[derive(Deserialize)]
pub struct UpdateNoteRequest {
    #[serde(default)]
    content: String,
}

pub async fn update_note(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateNoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.content.is_empty() {
        return Err(ServiceError::Invalid("content is required".into()).into());
    }
    // Standard ETag form is quoted; accept both.
    let if_match = headers
        .get(header::IF_MATCH)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim_matches('"'));

    let note = state
        .service
        .update_note(&path, req.content.as_bytes(), if_match)
        .await?;
    Ok(Json(note))
}

pub async fn delete_note(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.delete_note(&path).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(default)]
    limit: i64,
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    if params.q.is_empty() {
        return Err(ServiceError::Invalid("query parameter 'q' is required".into()).into());
    }
    let results = state.service.search(&params.q, params.limit).await?;
    Ok(Json(serde_json::json!({ "results": results })))
}

pub async fn graph(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let (nodes, links) = state.service.graph().await?;
    Ok(Json(serde_json::json!({ "nodes": nodes, "links": links })))
}

/// SSE stream of note and graph events. Frames arrive from the broker
/// already encoded; this handler only sets the stream headers and forwards
/// bytes until the client disconnects (dropping the subscription).
pub async fn events(State(state): State<AppState>) -> Response {
    let subscription = state.broker.subscribe().await;
    let stream = subscription.map(Ok::<_, std::convert::Infallible>);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
