//! asset-manager - file storage microservice for project-iteration assets
//!
//! This crate ingests zipped geospatial assets (GeoJSON, 3D tiles,
//! ortho-photos) uploaded for a project iteration, with:
//! - Zip extraction hardened against path traversal
//! - Staging directories promoted only when the whole upload commits
//! - Iteration metadata kept consistent with the sibling Project service
//! - REST API with multipart upload support

pub mod api;
pub mod archive;
pub mod auth;
pub mod codes;
pub mod config;
pub mod layout;
pub mod pipeline;
pub mod remote;

use config::Config;
use layout::DirectoryLayout;
use pipeline::UploadPipeline;
use remote::RemoteClient;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub layout: DirectoryLayout,
    pub remote: RemoteClient,
    pub pipeline: UploadPipeline,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let layout = DirectoryLayout::new(config.storage.upload_root.clone());
        let remote = RemoteClient::new(config.services.clone());
        let pipeline = UploadPipeline::new(remote.clone(), layout.clone());

        Self {
            config,
            layout,
            remote,
            pipeline,
        }
    }
}
