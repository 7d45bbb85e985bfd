use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::api::response::ApiError;
use crate::auth::AuthSession;
use crate::codes;
use crate::AppState;

/// Serve a committed asset file.
/// Route: GET /project/:company_id/:project_id/:iteration_id/*path
///
/// The caller's view permission on the project is validated against the
/// permission authority before any byte leaves disk.
pub async fn get_project_file(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Path((company_id, project_id, iteration_id, path)): Path<(String, String, String, String)>,
) -> Result<Response, ApiError> {
    let project_id = Uuid::parse_str(&project_id)
        .map_err(|_| ApiError::bad_request(codes::PROJECT_NOT_FOUND, "invalid project id"))?;

    state
        .remote
        .validate_permission(project_id, &session.tokens)
        .await
        .map_err(|e| ApiError::bad_request(e.code(), e.to_string()))?;

    let file_path = state
        .layout
        .resolve_file(&company_id, project_id, &iteration_id, &path)
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    let file = match tokio::fs::File::open(&file_path).await {
        Ok(file) => file,
        Err(_) => return Err(ApiError::not_found("File not found")),
    };
    let metadata = file
        .metadata()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    if metadata.is_dir() {
        return Err(ApiError::not_found("File not found"));
    }

    let mime_type = mime_guess::from_path(&file_path).first_or_octet_stream();

    let mut response =
        (StatusCode::OK, Body::from_stream(ReaderStream::new(file))).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        mime_type
            .as_ref()
            .parse()
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        header::HeaderValue::from(metadata.len()),
    );

    let filename = path.rsplit('/').next().unwrap_or(&path);
    if let Ok(value) = format!("inline; filename=\"{filename}\"").parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}
