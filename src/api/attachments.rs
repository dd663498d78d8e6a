//! Attachment upload and serving
//!
//! Attachments live in the vault's `attachments/` directory, flat. Upload
//! filenames must be plain names; anything with separators or traversal is
//! rejected before it reaches the vault layer (which would also refuse it).

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::handlers::ApiError;
use super::AppState;
use crate::service::ServiceError;
use crate::vault::ATTACHMENTS_DIR;

/// Validate a plain filename: no separators, no traversal, not hidden.
fn safe_name(name: &str) -> Result<&str, ServiceError> {
    if name.is_empty() {
        return Err(ServiceError::Invalid("filename is required".into()));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") || name.starts_with('.') {
        return Err(ServiceError::Invalid(format!("invalid filename: {name}")));
    }
    Ok(name)
}

fn content_type(name: &str) -> &'static str {
    match name.rsplit('.').next().unwrap_or("") {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// POST /api/attachments — multipart form with a `file` field.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::Invalid(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_owned)
            .ok_or_else(|| ServiceError::Invalid("filename is required".into()))?;
        safe_name(&filename)?;

        let data = field
            .bytes()
            .await
            .map_err(|e| ServiceError::Invalid(format!("failed to read upload: {e}")))?;

        let rel = format!("{ATTACHMENTS_DIR}/{filename}");
        state.service.vault().write(&rel, &data).map_err(ServiceError::from)?;

        return Ok((
            StatusCode::CREATED,
            Json(serde_json::json!({
                "filename": filename,
                "size": data.len(),
                "url": format!("/attachments/{filename}"),
            })),
        ));
    }

    Err(ServiceError::Invalid("missing 'file' field in multipart form".into()).into())
}

/// GET /attachments/{filename}
pub async fn serve(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    safe_name(&filename)?;
    let rel = format!("{ATTACHMENTS_DIR}/{filename}");
    let data = state.service.vault().read(&rel).map_err(ServiceError::from)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type(&filename))],
        data,
    )
        .into_response())
}
