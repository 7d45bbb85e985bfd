use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::pipeline_error;
use crate::api::response::{ApiError, AppJson, Envelope};
use crate::auth::AuthSession;
use crate::codes;
use crate::layout::AssetKind;
use crate::pipeline::{AssetUpload, CreateUpload, EditUpload, PerAsset, UploadIntent};
use crate::remote::IterationResponse;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RemoveIterationRequest {
    pub id: Uuid,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /project/upload-iteration
///
/// Multipart fields: `project_id` (required), `revision`, and up to one
/// archive per asset kind (`geojson`, `tile_3d`, `ortho_photo`).
pub async fn upload_iteration(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Envelope<IterationResponse>>), ApiError> {
    let mut project_id: Option<String> = None;
    let mut revision: Option<String> = None;
    let mut assets: PerAsset<Option<AssetUpload>> = PerAsset::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::bad_request(codes::INVALID_REQUEST, format!("Invalid multipart data: {e}"))
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "project_id" => {
                project_id = Some(read_text(field, "project_id").await?);
            }
            "revision" => {
                revision = Some(read_text(field, "revision").await?);
            }
            _ => {
                if let Some(kind) = AssetKind::from_form_field(&field_name) {
                    *assets.get_mut(kind) = Some(read_archive(field, kind).await?);
                }
                // Unknown fields are ignored
            }
        }
    }

    let project_id = project_id.ok_or_else(|| {
        ApiError::bad_request(codes::INVALID_REQUEST, "project_id field is required")
    })?;
    let project_id = Uuid::parse_str(&project_id)
        .map_err(|_| ApiError::bad_request(codes::PROJECT_NOT_FOUND, "invalid project id"))?;

    let iteration = state
        .pipeline
        .create(
            &session,
            CreateUpload {
                project_id,
                revision,
                assets,
            },
        )
        .await
        .map_err(pipeline_error)?;

    Ok(Envelope::created(iteration))
}

/// POST /project/edit-iteration
///
/// Multipart fields: `id` (required), `revision`, a `remove*` flag and an
/// optional replacement archive per asset kind. A "true" remove flag wins
/// over an uploaded file; neither means the asset is kept as is.
pub async fn edit_iteration(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Envelope<IterationResponse>>), ApiError> {
    let mut id: Option<String> = None;
    let mut revision: Option<String> = None;
    let mut remove_flags: PerAsset<bool> = PerAsset::default();
    let mut files: PerAsset<Option<AssetUpload>> = PerAsset::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::bad_request(codes::INVALID_REQUEST, format!("Invalid multipart data: {e}"))
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "id" => {
                id = Some(read_text(field, "id").await?);
            }
            "revision" => {
                revision = Some(read_text(field, "revision").await?);
            }
            "removeGeoJson" => {
                remove_flags.geojson = read_text(field, "removeGeoJson").await? == "true";
            }
            "removeTile3D" => {
                remove_flags.tile_3d = read_text(field, "removeTile3D").await? == "true";
            }
            "removeOrthoPhoto" => {
                remove_flags.ortho_photo = read_text(field, "removeOrthoPhoto").await? == "true";
            }
            _ => {
                if let Some(kind) = AssetKind::from_form_field(&field_name) {
                    *files.get_mut(kind) = Some(read_archive(field, kind).await?);
                }
            }
        }
    }

    let id = id
        .ok_or_else(|| ApiError::bad_request(codes::INVALID_REQUEST, "id field is required"))?;
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::bad_request(codes::INVALID_REQUEST, "invalid iteration id"))?;

    let mut intents: PerAsset<UploadIntent> = PerAsset::default();
    for kind in AssetKind::ALL {
        let remove = match kind {
            AssetKind::GeoJson => remove_flags.geojson,
            AssetKind::Tile3d => remove_flags.tile_3d,
            AssetKind::OrthoPhoto => remove_flags.ortho_photo,
        };
        *intents.get_mut(kind) = if remove {
            UploadIntent::Remove
        } else if let Some(file) = files.get_mut(kind).take() {
            UploadIntent::Upload(file)
        } else {
            UploadIntent::Keep
        };
    }

    let iteration = state
        .pipeline
        .update(
            &session,
            EditUpload {
                id,
                revision,
                intents,
            },
        )
        .await
        .map_err(pipeline_error)?;

    Ok(Envelope::created(iteration))
}

/// POST /project/remove-iteration
pub async fn remove_iteration(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    AppJson(request): AppJson<RemoveIterationRequest>,
) -> Result<(StatusCode, Json<Envelope<&'static str>>), ApiError> {
    state
        .pipeline
        .delete(&session, request.id)
        .await
        .map_err(pipeline_error)?;

    Ok(Envelope::ok("Success"))
}

// ============================================================================
// Helpers
// ============================================================================

async fn read_text(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(codes::INVALID_REQUEST, format!("Invalid {name}: {e}")))
}

async fn read_archive(
    field: axum::extract::multipart::Field<'_>,
    kind: AssetKind,
) -> Result<AssetUpload, ApiError> {
    let file_name = field.file_name().unwrap_or("").to_string();
    let data = field.bytes().await.map_err(|e| {
        ApiError::bad_request(
            codes::INVALID_REQUEST,
            format!("Failed to read {} archive: {e}", kind.form_field()),
        )
    })?;
    Ok(AssetUpload { file_name, data })
}
