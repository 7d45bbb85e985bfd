use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::archive::{extract_archive, ExtractError};
use crate::auth::{AuthSession, AuthTokens};
use crate::codes;
use crate::layout::{AssetKind, DirectoryLayout};
use crate::remote::{IterationResponse, RemoteClient, RemoteError, UpdateIterationRequest};

/// Archive extensions the upload endpoints accept. The extractor itself only
/// decodes zip; the other two fail later with a format error.
pub const ALLOWED_ARCHIVE_EXTENSIONS: [&str; 3] = [".zip", ".rar", ".7z"];

// ============================================================================
// Types
// ============================================================================

/// One uploaded archive: the client's original file name plus its bytes.
#[derive(Debug, Clone)]
pub struct AssetUpload {
    pub file_name: String,
    pub data: Bytes,
}

/// What an edit request wants done with one asset kind.
#[derive(Debug, Clone, Default)]
pub enum UploadIntent {
    /// Replace the asset with a freshly uploaded archive.
    Upload(AssetUpload),
    /// Clear the asset's metadata slot and empty its directory.
    Remove,
    /// Leave the asset untouched.
    #[default]
    Keep,
}

/// One value per asset kind.
#[derive(Debug, Clone, Default)]
pub struct PerAsset<T> {
    pub geojson: T,
    pub tile_3d: T,
    pub ortho_photo: T,
}

impl<T> PerAsset<T> {
    pub fn get_mut(&mut self, kind: AssetKind) -> &mut T {
        match kind {
            AssetKind::GeoJson => &mut self.geojson,
            AssetKind::Tile3d => &mut self.tile_3d,
            AssetKind::OrthoPhoto => &mut self.ortho_photo,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetKind, &T)> {
        [
            (AssetKind::GeoJson, &self.geojson),
            (AssetKind::Tile3d, &self.tile_3d),
            (AssetKind::OrthoPhoto, &self.ortho_photo),
        ]
        .into_iter()
    }
}

/// Parsed input of a create (upload-iteration) request.
#[derive(Debug)]
pub struct CreateUpload {
    pub project_id: Uuid,
    pub revision: Option<String>,
    pub assets: PerAsset<Option<AssetUpload>>,
}

/// Parsed input of an edit (edit-iteration) request.
#[derive(Debug)]
pub struct EditUpload {
    pub id: Uuid,
    pub revision: Option<String>,
    pub intents: PerAsset<UploadIntent>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Refused before any side effect: bad input, missing privilege, or a
    /// sibling service declining a pre-flight call.
    #[error("{message}")]
    Rejected { code: i32, message: String },
    /// The pipeline started mutating state and could not finish cleanly.
    #[error("{message}")]
    Failed { code: i32, message: String },
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("extraction task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    fn rejected(code: i32, message: impl Into<String>) -> Self {
        PipelineError::Rejected {
            code,
            message: message.into(),
        }
    }

    fn failed(code: i32, message: impl Into<String>) -> Self {
        PipelineError::Failed {
            code,
            message: message.into(),
        }
    }
}

/// A remote failure during pre-flight lookups rejects the request.
fn reject(e: RemoteError) -> PipelineError {
    PipelineError::rejected(e.code(), e.to_string())
}

/// A remote failure after local state changed is a pipeline failure.
fn commit_failed(e: RemoteError) -> PipelineError {
    PipelineError::failed(e.code(), e.to_string())
}

// ============================================================================
// Pipeline
// ============================================================================

/// Drives the upload/extract/commit-or-rollback flow for project iterations.
///
/// Every flow sequences its remote metadata mutation against the extraction
/// fan-out so committed metadata never points at files that were not staged,
/// and rolls both back together when either side fails.
#[derive(Debug, Clone)]
pub struct UploadPipeline {
    remote: RemoteClient,
    layout: DirectoryLayout,
}

impl UploadPipeline {
    pub fn new(remote: RemoteClient, layout: DirectoryLayout) -> Self {
        Self { remote, layout }
    }

    /// Create a new iteration: remote record first, then concurrent staging
    /// of each supplied archive straight into its final directory, then the
    /// metadata commit. Any failure deletes the staged tree and the record.
    pub async fn create(
        &self,
        session: &AuthSession,
        upload: CreateUpload,
    ) -> Result<IterationResponse, PipelineError> {
        if !session.claims.is_root {
            return Err(PipelineError::rejected(
                codes::ITERATION_UPLOAD_NOT_ALLOWED,
                "no permission to upload",
            ));
        }
        check_file_types(
            upload
                .assets
                .iter()
                .filter_map(|(_, asset)| asset.as_ref().map(|a| a.file_name.as_str())),
        )?;

        let tokens = &session.tokens;
        let company_id = self
            .remote
            .company_id_for_project(upload.project_id, tokens)
            .await
            .map_err(reject)?;

        // The remote record is created before any file is written so a
        // failed upload has something concrete to roll back against.
        let revision = upload.revision.clone().unwrap_or_default();
        let iteration = self
            .remote
            .create_iteration(upload.project_id, revision.clone(), tokens)
            .await
            .map_err(reject)?;

        tracing::debug!(
            iteration_id = %iteration.id,
            project_id = %upload.project_id,
            "staging iteration assets"
        );

        let mut tasks = Vec::new();
        for (kind, asset) in upload.assets.iter() {
            if let Some(asset) = asset {
                let dir =
                    self.layout
                        .asset_dir(&company_id, upload.project_id, iteration.id, kind, false);
                tasks.push(spawn_extract(kind, asset.data.clone(), dir));
            }
        }

        let iteration_dir =
            self.layout
                .iteration_dir(&company_id, upload.project_id, iteration.id);
        if let Err(failure) = join_extractions(tasks).await {
            self.rollback_create(&iteration_dir, iteration.id, tokens)
                .await?;
            return Err(failure);
        }

        let mut request = UpdateIterationRequest::from(&iteration);
        request.revision = Some(revision);
        for (kind, asset) in upload.assets.iter() {
            if let Some(asset) = asset {
                let url =
                    DirectoryLayout::asset_url(&company_id, upload.project_id, iteration.id, kind);
                request.set_asset(kind, Some((url, asset.file_name.clone())));
            }
        }

        match self.remote.update_iteration(&request, tokens).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                self.rollback_create(&iteration_dir, iteration.id, tokens)
                    .await?;
                Err(commit_failed(e))
            }
        }
    }

    /// Edit an existing iteration. New archives are staged into `*_temp`
    /// siblings so a failure never corrupts the committed directories; the
    /// temp directory is promoted per asset kind once both the metadata
    /// update and every extraction have succeeded.
    pub async fn update(
        &self,
        session: &AuthSession,
        upload: EditUpload,
    ) -> Result<IterationResponse, PipelineError> {
        if !session.claims.is_root {
            return Err(PipelineError::rejected(
                codes::ITERATION_UPLOAD_NOT_ALLOWED,
                "no permission to upload",
            ));
        }
        check_file_types(upload.intents.iter().filter_map(|(_, intent)| match intent {
            UploadIntent::Upload(asset) => Some(asset.file_name.as_str()),
            _ => None,
        }))?;

        let tokens = &session.tokens;
        let current = self
            .remote
            .get_iteration(upload.id, tokens)
            .await
            .map_err(reject)?;
        let company_id = self
            .remote
            .company_id_for_project(current.project_id, tokens)
            .await
            .map_err(reject)?;

        let mut request = UpdateIterationRequest::from(&current);
        if let Some(revision) = upload.revision.clone() {
            request.revision = Some(revision);
        }

        let mut tasks = Vec::new();
        for (kind, intent) in upload.intents.iter() {
            match intent {
                UploadIntent::Upload(asset) => {
                    let staging = self.staging_dir(&company_id, &current, kind);
                    tasks.push(spawn_extract(kind, asset.data.clone(), staging));
                    let url = DirectoryLayout::asset_url(
                        &company_id,
                        current.project_id,
                        current.id,
                        kind,
                    );
                    request.set_asset(kind, Some((url, asset.file_name.clone())));
                }
                UploadIntent::Remove => request.set_asset(kind, None),
                UploadIntent::Keep => {}
            }
        }

        // The metadata update goes out before the extractions are awaited;
        // a late extraction failure is reconciled by restoring the prior
        // record below.
        let update_result = self.remote.update_iteration(&request, tokens).await;
        let extract_result = join_extractions(tasks).await;

        // The metadata error outranks an extraction error when both failed.
        let mut failure = update_result.as_ref().err().map(commit_failed_ref);
        if failure.is_none() {
            failure = extract_result.err();
        }

        if let Some(failure) = failure {
            for (kind, intent) in upload.intents.iter() {
                if matches!(intent, UploadIntent::Upload(_)) {
                    let staging = self.staging_dir(&company_id, &current, kind);
                    if let Err(e) = remove_dir_idempotent(&staging).await {
                        tracing::warn!(
                            path = %staging.display(),
                            error = %e,
                            "failed to remove staging directory"
                        );
                    }
                }
            }

            // Restore the record to its previous field values.
            let restore = UpdateIterationRequest::from(&current);
            self.remote
                .update_iteration(&restore, tokens)
                .await
                .map_err(commit_failed)?;

            return Err(failure);
        }

        let updated = update_result.map_err(commit_failed)?;
        self.promote(&company_id, &current, &upload.intents).await?;
        Ok(updated)
    }

    /// Delete an iteration's remote record and its entire directory tree.
    /// A directory that is already gone counts as success.
    pub async fn delete(
        &self,
        session: &AuthSession,
        iteration_id: Uuid,
    ) -> Result<(), PipelineError> {
        if !session.claims.is_root {
            return Err(PipelineError::rejected(
                codes::ITERATION_DELETE_NOT_ALLOWED,
                "no permission to delete",
            ));
        }

        let tokens = &session.tokens;
        let iteration = self
            .remote
            .get_iteration(iteration_id, tokens)
            .await
            .map_err(reject)?;
        let company_id = self
            .remote
            .company_id_for_project(iteration.project_id, tokens)
            .await
            .map_err(reject)?;

        self.remote
            .delete_iteration(iteration_id, tokens)
            .await
            .map_err(commit_failed)?;

        let dir = self
            .layout
            .iteration_dir(&company_id, iteration.project_id, iteration_id);
        remove_dir_idempotent(&dir).await?;

        tracing::debug!(iteration_id = %iteration_id, "deleted iteration");
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn staging_dir(
        &self,
        company_id: &str,
        iteration: &IterationResponse,
        kind: AssetKind,
    ) -> PathBuf {
        self.layout
            .asset_dir(company_id, iteration.project_id, iteration.id, kind, true)
    }

    /// Delete everything staged for a failed create, then the remote record.
    /// A failed record deletion is reported with its own error code.
    async fn rollback_create(
        &self,
        iteration_dir: &Path,
        iteration_id: Uuid,
        tokens: &AuthTokens,
    ) -> Result<(), PipelineError> {
        if let Err(e) = remove_dir_idempotent(iteration_dir).await {
            tracing::warn!(
                path = %iteration_dir.display(),
                error = %e,
                "failed to remove staged directories"
            );
        }
        self.remote
            .delete_iteration(iteration_id, tokens)
            .await
            .map_err(commit_failed)
    }

    /// Apply each intent's directory transition now that metadata and
    /// extraction both succeeded. Promotion is per asset kind.
    async fn promote(
        &self,
        company_id: &str,
        iteration: &IterationResponse,
        intents: &PerAsset<UploadIntent>,
    ) -> Result<(), PipelineError> {
        for (kind, intent) in intents.iter() {
            let final_dir =
                self.layout
                    .asset_dir(company_id, iteration.project_id, iteration.id, kind, false);
            match intent {
                UploadIntent::Remove => {
                    remove_dir_idempotent(&final_dir).await?;
                    tokio::fs::create_dir_all(&final_dir).await?;
                }
                UploadIntent::Upload(_) => {
                    let staging = self.staging_dir(company_id, iteration, kind);
                    remove_dir_idempotent(&final_dir).await?;
                    tokio::fs::rename(&staging, &final_dir).await?;
                }
                UploadIntent::Keep => {}
            }
        }
        Ok(())
    }
}

fn commit_failed_ref(e: &RemoteError) -> PipelineError {
    PipelineError::failed(e.code(), e.to_string())
}

// ============================================================================
// Extraction fan-out
// ============================================================================

fn spawn_extract(
    kind: AssetKind,
    data: Bytes,
    dir: PathBuf,
) -> (AssetKind, JoinHandle<Result<(), ExtractError>>) {
    let handle = tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&dir)?;
        extract_archive(&data, &dir)
    });
    (kind, handle)
}

/// Await every spawned extraction task -- success or failure -- and report
/// the first failure. Each handle is always joined, so no task is left
/// running or unobserved after this returns.
async fn join_extractions(
    tasks: Vec<(AssetKind, JoinHandle<Result<(), ExtractError>>)>,
) -> Result<(), PipelineError> {
    let mut first_failure: Option<PipelineError> = None;
    for (kind, handle) in tasks {
        let failure = match handle.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                tracing::warn!(kind = kind.dir_name(), error = %e, "asset extraction failed");
                Some(PipelineError::Extract(e))
            }
            Err(e) => {
                tracing::error!(kind = kind.dir_name(), error = %e, "extraction task aborted");
                Some(PipelineError::Join(e))
            }
        };
        if first_failure.is_none() {
            first_failure = failure;
        }
    }
    match first_failure {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}

async fn remove_dir_idempotent(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Reject any upload whose extension is not on the allow-list. Mirrors the
/// sibling services' message format, listing each offending extension once.
fn check_file_types<'a>(names: impl Iterator<Item = &'a str>) -> Result<(), PipelineError> {
    let mut not_allowed: Vec<String> = Vec::new();
    for name in names {
        let extension = Path::new(name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        if !ALLOWED_ARCHIVE_EXTENSIONS.contains(&extension.as_str())
            && !not_allowed.contains(&extension)
        {
            not_allowed.push(extension);
        }
    }

    if not_allowed.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::rejected(
            codes::FILE_TYPE_NOT_ALLOWED,
            format!("File extensions: {} not allowed.", not_allowed.join(", ")),
        ))
    }
}
