//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::Path;

use asset_manager::auth::{AuthSession, AuthTokens, Claims};
use asset_manager::config::ServicesConfig;
use asset_manager::layout::DirectoryLayout;
use asset_manager::pipeline::UploadPipeline;
use asset_manager::remote::RemoteClient;
use serde_json::json;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Build an in-memory zip archive from (entry name, contents) pairs.
pub fn zip_with_entries(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn remote_client(base_url: &str) -> RemoteClient {
    RemoteClient::new(ServicesConfig {
        project_base_url: base_url.to_string(),
        user_base_url: base_url.to_string(),
    })
}

pub fn pipeline(upload_root: &Path, base_url: &str) -> UploadPipeline {
    UploadPipeline::new(
        remote_client(base_url),
        DirectoryLayout::new(upload_root.to_path_buf()),
    )
}

pub fn session(is_root: bool) -> AuthSession {
    AuthSession {
        claims: Claims {
            is_root,
            exp: 4_102_444_800, // 2100-01-01
        },
        tokens: AuthTokens {
            token: "test-token".to_string(),
            refresh_token: "test-refresh".to_string(),
        },
    }
}

pub fn root_session() -> AuthSession {
    session(true)
}

/// Wrap a payload in the platform's `{Data, Meta}` success envelope.
pub fn envelope(data: serde_json::Value) -> serde_json::Value {
    json!({ "Data": data, "Meta": { "Status": 200 } })
}

/// A bare iteration record as the Project service would return it.
pub fn iteration_json(id: Uuid, project_id: Uuid) -> serde_json::Value {
    json!({
        "id": id,
        "project_id": project_id,
        "revision": null,
        "geojson_url": null,
        "geojson_file_name": null,
        "tile_3d_url": null,
        "tile_3d_file_name": null,
        "ortho_photo_url": null,
        "ortho_photo_file_name": null,
    })
}
