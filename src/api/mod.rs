//! HTTP transport: REST routes, SSE event stream, attachment handling
//!
//! The router is a thin layer over [`NoteService`] and [`Broker`]; it maps
//! the service error taxonomy onto HTTP statuses and never leaks internal
//! diagnostics to clients.

mod attachments;
mod handlers;

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use subtle::ConstantTimeEq;
use tower_http::cors::{Any, CorsLayer};

use crate::broker::Broker;
use crate::config::AuthConfig;
use crate::service::NoteService;

/// JSON body cap for note writes.
const MAX_NOTE_BODY: usize = 10 * 1024 * 1024;
/// Multipart cap for attachment uploads.
const MAX_UPLOAD_BODY: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NoteService>,
    pub broker: Broker,
    pub auth: Arc<AuthConfig>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route(
            "/notes",
            get(handlers::list_notes).post(handlers::create_note),
        )
        .route(
            "/notes/{*path}",
            get(handlers::get_note)
                .put(handlers::update_note)
                .delete(handlers::delete_note),
        )
        .route("/search", get(handlers::search))
        .route("/graph", get(handlers::graph))
        .route("/events", get(handlers::events))
        .route(
            "/attachments",
            axum::routing::post(attachments::upload)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY)),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth));

    Router::new()
        .route("/health/live", get(health))
        .route("/health/ready", get(health))
        .route("/attachments/{filename}", get(attachments::serve))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(MAX_NOTE_BODY))
        .layer(cors)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Bearer-token middleware. Disabled mode passes everything through; token
/// mode requires `Authorization: Bearer <token>` with a constant-time match.
async fn auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.auth.enabled() {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .unwrap_or("");

    let expected = state.auth.token.as_bytes();
    let valid = provided.len() == expected.len()
        && bool::from(provided.as_bytes().ct_eq(expected));

    if valid {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "unauthorized" })),
        )
            .into_response()
    }
}
