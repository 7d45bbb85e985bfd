mod common;

use std::path::{Path, PathBuf};

use asset_manager::codes;
use asset_manager::pipeline::{
    AssetUpload, CreateUpload, EditUpload, PerAsset, PipelineError, UploadIntent,
};
use bytes::Bytes;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMPANY_ID: &str = "company-1";

// ============================================================================
// Mock helpers
// ============================================================================

async fn mount_company_lookup(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/project/get-company-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::envelope(json!(COMPANY_ID))))
        .mount(server)
        .await;
}

async fn mount_create_iteration(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/project/create-iteration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::envelope(body)))
        .mount(server)
        .await;
}

async fn mount_get_iteration(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/project/get-iteration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::envelope(body)))
        .mount(server)
        .await;
}

async fn mount_update_iteration(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/project/update-iteration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::envelope(body)))
        .mount(server)
        .await;
}

async fn mount_delete_iteration(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/project/delete-iteration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::envelope(json!("Success"))))
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, endpoint: &str) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path().ends_with(endpoint))
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

fn iteration_dir(root: &Path, project_id: Uuid, iteration_id: Uuid) -> PathBuf {
    root.join(COMPANY_ID)
        .join(project_id.to_string())
        .join(iteration_id.to_string())
}

fn upload(file_name: &str, data: Vec<u8>) -> AssetUpload {
    AssetUpload {
        file_name: file_name.to_string(),
        data: Bytes::from(data),
    }
}

fn assert_no_staging_dirs(dir: &Path) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let name = entry.unwrap().file_name();
        assert!(
            !name.to_string_lossy().ends_with("_temp"),
            "staging directory left behind: {name:?}"
        );
    }
}

/// Existing iteration with committed GeoJSON and 3D-tile assets.
fn existing_iteration(iteration_id: Uuid, project_id: Uuid) -> serde_json::Value {
    let mut body = common::iteration_json(iteration_id, project_id);
    body["geojson_url"] = json!(format!("/{COMPANY_ID}/{project_id}/{iteration_id}/geojson"));
    body["geojson_file_name"] = json!("geo.zip");
    body["tile_3d_url"] = json!(format!("/{COMPANY_ID}/{project_id}/{iteration_id}/tile_3d"));
    body["tile_3d_file_name"] = json!("tiles.zip");
    body
}

// ============================================================================
// Create flow
// ============================================================================

#[tokio::test]
async fn create_stages_exactly_the_supplied_assets() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let project_id = Uuid::new_v4();
    let iteration_id = Uuid::new_v4();

    mount_company_lookup(&server).await;
    mount_create_iteration(&server, common::iteration_json(iteration_id, project_id)).await;
    mount_update_iteration(&server, existing_iteration(iteration_id, project_id)).await;

    let pipeline = common::pipeline(root.path(), &server.uri());
    let result = pipeline
        .create(
            &common::root_session(),
            CreateUpload {
                project_id,
                revision: Some("rev-1".to_string()),
                assets: PerAsset {
                    geojson: Some(upload(
                        "geo.zip",
                        common::zip_with_entries(&[("data/x.txt", b"hello geo")]),
                    )),
                    tile_3d: Some(upload(
                        "tiles.zip",
                        common::zip_with_entries(&[("tileset.json", b"{}")]),
                    )),
                    ortho_photo: None,
                },
            },
        )
        .await
        .unwrap();

    assert!(result.geojson_url.is_some());

    let dir = iteration_dir(root.path(), project_id, iteration_id);
    assert_eq!(
        std::fs::read(dir.join("geojson/data/x.txt")).unwrap(),
        b"hello geo"
    );
    assert!(dir.join("tile_3d/tileset.json").is_file());
    assert!(!dir.join("ortho_photo").exists());
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 2);
    assert_no_staging_dirs(&dir);

    // Commit carried the URL and original file name for both supplied kinds.
    let updates = requests_to(&server, "/update-iteration").await;
    assert_eq!(updates.len(), 1);
    assert_eq!(
        updates[0]["geojson_url"],
        json!(format!("/{COMPANY_ID}/{project_id}/{iteration_id}/geojson"))
    );
    assert_eq!(updates[0]["geojson_file_name"], json!("geo.zip"));
    assert_eq!(updates[0]["tile_3d_file_name"], json!("tiles.zip"));
    assert!(updates[0]["ortho_photo_url"].is_null());
}

#[tokio::test]
async fn create_rolls_back_when_one_extraction_fails() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let project_id = Uuid::new_v4();
    let iteration_id = Uuid::new_v4();

    mount_company_lookup(&server).await;
    mount_create_iteration(&server, common::iteration_json(iteration_id, project_id)).await;
    mount_delete_iteration(&server).await;

    let pipeline = common::pipeline(root.path(), &server.uri());
    let err = pipeline
        .create(
            &common::root_session(),
            CreateUpload {
                project_id,
                revision: None,
                assets: PerAsset {
                    geojson: Some(upload(
                        "geo.zip",
                        common::zip_with_entries(&[("ok.txt", b"fine")]),
                    )),
                    tile_3d: Some(upload("tiles.zip", b"not a zip archive".to_vec())),
                    ortho_photo: None,
                },
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Extract(_)));

    // Both the staged directories and the freshly created record are gone.
    assert!(!iteration_dir(root.path(), project_id, iteration_id).exists());
    assert_eq!(requests_to(&server, "/delete-iteration").await.len(), 1);
    assert_eq!(requests_to(&server, "/update-iteration").await.len(), 0);
}

#[tokio::test]
async fn create_rolls_back_when_commit_fails() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let project_id = Uuid::new_v4();
    let iteration_id = Uuid::new_v4();

    mount_company_lookup(&server).await;
    mount_create_iteration(&server, common::iteration_json(iteration_id, project_id)).await;
    mount_delete_iteration(&server).await;
    Mock::given(method("POST"))
        .and(path("/project/update-iteration"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "ErrorCode": 4999,
            "Error": "update failed",
        })))
        .mount(&server)
        .await;

    let pipeline = common::pipeline(root.path(), &server.uri());
    let err = pipeline
        .create(
            &common::root_session(),
            CreateUpload {
                project_id,
                revision: None,
                assets: PerAsset {
                    geojson: Some(upload(
                        "geo.zip",
                        common::zip_with_entries(&[("ok.txt", b"fine")]),
                    )),
                    tile_3d: None,
                    ortho_photo: None,
                },
            },
        )
        .await
        .unwrap_err();

    match err {
        PipelineError::Failed { code, .. } => assert_eq!(code, 4999),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!iteration_dir(root.path(), project_id, iteration_id).exists());
    assert_eq!(requests_to(&server, "/delete-iteration").await.len(), 1);
}

#[tokio::test]
async fn create_requires_root_before_any_side_effect() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();

    let pipeline = common::pipeline(root.path(), &server.uri());
    let err = pipeline
        .create(
            &common::session(false),
            CreateUpload {
                project_id: Uuid::new_v4(),
                revision: None,
                assets: PerAsset::default(),
            },
        )
        .await
        .unwrap_err();

    match err {
        PipelineError::Rejected { code, .. } => {
            assert_eq!(code, codes::ITERATION_UPLOAD_NOT_ALLOWED)
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn create_rejects_disallowed_extension_before_any_call() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();

    let pipeline = common::pipeline(root.path(), &server.uri());
    let err = pipeline
        .create(
            &common::root_session(),
            CreateUpload {
                project_id: Uuid::new_v4(),
                revision: None,
                assets: PerAsset {
                    geojson: Some(upload("geo.exe", common::zip_with_entries(&[]))),
                    tile_3d: None,
                    ortho_photo: None,
                },
            },
        )
        .await
        .unwrap_err();

    match err {
        PipelineError::Rejected { code, message } => {
            assert_eq!(code, codes::FILE_TYPE_NOT_ALLOWED);
            assert!(message.contains(".exe"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

// ============================================================================
// Update flow
// ============================================================================

#[tokio::test]
async fn update_remove_clears_slot_and_empties_directory() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let project_id = Uuid::new_v4();
    let iteration_id = Uuid::new_v4();
    let existing = existing_iteration(iteration_id, project_id);

    mount_get_iteration(&server, existing.clone()).await;
    mount_company_lookup(&server).await;
    let mut updated = existing.clone();
    updated["geojson_url"] = json!(null);
    updated["geojson_file_name"] = json!(null);
    mount_update_iteration(&server, updated).await;

    let dir = iteration_dir(root.path(), project_id, iteration_id);
    std::fs::create_dir_all(dir.join("geojson")).unwrap();
    std::fs::write(dir.join("geojson/a.geojson"), b"{}").unwrap();
    std::fs::create_dir_all(dir.join("tile_3d")).unwrap();
    std::fs::write(dir.join("tile_3d/tileset.json"), b"{}").unwrap();

    let pipeline = common::pipeline(root.path(), &server.uri());
    let result = pipeline
        .update(
            &common::root_session(),
            EditUpload {
                id: iteration_id,
                revision: None,
                intents: PerAsset {
                    geojson: UploadIntent::Remove,
                    tile_3d: UploadIntent::Keep,
                    ortho_photo: UploadIntent::Keep,
                },
            },
        )
        .await
        .unwrap();

    assert!(result.geojson_url.is_none());

    // GeoJSON directory recreated empty; the other asset is untouched.
    assert!(dir.join("geojson").is_dir());
    assert_eq!(std::fs::read_dir(dir.join("geojson")).unwrap().count(), 0);
    assert!(dir.join("tile_3d/tileset.json").is_file());
    assert_no_staging_dirs(&dir);

    let updates = requests_to(&server, "/update-iteration").await;
    assert_eq!(updates.len(), 1);
    assert!(updates[0]["geojson_url"].is_null());
    assert!(updates[0]["geojson_file_name"].is_null());
    assert_eq!(updates[0]["tile_3d_url"], existing["tile_3d_url"]);
}

#[tokio::test]
async fn update_upload_promotes_staging_directory() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let project_id = Uuid::new_v4();
    let iteration_id = Uuid::new_v4();
    let existing = existing_iteration(iteration_id, project_id);

    mount_get_iteration(&server, existing.clone()).await;
    mount_company_lookup(&server).await;
    mount_update_iteration(&server, existing).await;

    let dir = iteration_dir(root.path(), project_id, iteration_id);
    std::fs::create_dir_all(dir.join("geojson")).unwrap();
    std::fs::write(dir.join("geojson/old.txt"), b"stale").unwrap();

    let pipeline = common::pipeline(root.path(), &server.uri());
    pipeline
        .update(
            &common::root_session(),
            EditUpload {
                id: iteration_id,
                revision: Some("rev-2".to_string()),
                intents: PerAsset {
                    geojson: UploadIntent::Upload(upload(
                        "geo2.zip",
                        common::zip_with_entries(&[("new.txt", b"fresh")]),
                    )),
                    tile_3d: UploadIntent::Keep,
                    ortho_photo: UploadIntent::Keep,
                },
            },
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read(dir.join("geojson/new.txt")).unwrap(), b"fresh");
    assert!(!dir.join("geojson/old.txt").exists());
    assert_no_staging_dirs(&dir);

    let updates = requests_to(&server, "/update-iteration").await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["geojson_file_name"], json!("geo2.zip"));
    assert_eq!(updates[0]["revision"], json!("rev-2"));
}

#[tokio::test]
async fn update_restores_metadata_when_extraction_fails() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let project_id = Uuid::new_v4();
    let iteration_id = Uuid::new_v4();
    let existing = existing_iteration(iteration_id, project_id);

    mount_get_iteration(&server, existing.clone()).await;
    mount_company_lookup(&server).await;
    mount_update_iteration(&server, existing.clone()).await;

    let dir = iteration_dir(root.path(), project_id, iteration_id);
    std::fs::create_dir_all(dir.join("geojson")).unwrap();
    std::fs::write(dir.join("geojson/old.txt"), b"committed").unwrap();

    let pipeline = common::pipeline(root.path(), &server.uri());
    let err = pipeline
        .update(
            &common::root_session(),
            EditUpload {
                id: iteration_id,
                revision: None,
                intents: PerAsset {
                    geojson: UploadIntent::Upload(upload("geo-broken.zip", b"not a zip".to_vec())),
                    tile_3d: UploadIntent::Keep,
                    ortho_photo: UploadIntent::Keep,
                },
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Extract(_)));

    // The committed directory survived and the staging dir is gone.
    assert_eq!(
        std::fs::read(dir.join("geojson/old.txt")).unwrap(),
        b"committed"
    );
    assert_no_staging_dirs(&dir);

    // First update carried the new slot, the second restored the old one.
    let updates = requests_to(&server, "/update-iteration").await;
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0]["geojson_file_name"], json!("geo-broken.zip"));
    assert_eq!(updates[1]["geojson_url"], existing["geojson_url"]);
    assert_eq!(updates[1]["geojson_file_name"], json!("geo.zip"));
}

#[tokio::test]
async fn update_metadata_failure_rolls_back_staging() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let project_id = Uuid::new_v4();
    let iteration_id = Uuid::new_v4();
    let existing = existing_iteration(iteration_id, project_id);

    mount_get_iteration(&server, existing.clone()).await;
    mount_company_lookup(&server).await;
    // First update call fails; the restoring update succeeds.
    Mock::given(method("POST"))
        .and(path("/project/update-iteration"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "ErrorCode": 4999,
            "Error": "update failed",
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_update_iteration(&server, existing.clone()).await;

    let dir = iteration_dir(root.path(), project_id, iteration_id);
    std::fs::create_dir_all(dir.join("geojson")).unwrap();
    std::fs::write(dir.join("geojson/old.txt"), b"committed").unwrap();

    let pipeline = common::pipeline(root.path(), &server.uri());
    let err = pipeline
        .update(
            &common::root_session(),
            EditUpload {
                id: iteration_id,
                revision: None,
                intents: PerAsset {
                    geojson: UploadIntent::Upload(upload(
                        "geo.zip",
                        common::zip_with_entries(&[("new.txt", b"fresh")]),
                    )),
                    tile_3d: UploadIntent::Keep,
                    ortho_photo: UploadIntent::Keep,
                },
            },
        )
        .await
        .unwrap_err();

    match err {
        PipelineError::Failed { code, .. } => assert_eq!(code, 4999),
        other => panic!("unexpected error: {other:?}"),
    }

    // No promotion happened and staging is cleaned up.
    assert!(dir.join("geojson/old.txt").is_file());
    assert!(!dir.join("geojson/new.txt").exists());
    assert_no_staging_dirs(&dir);
    assert_eq!(requests_to(&server, "/update-iteration").await.len(), 2);
}

// ============================================================================
// Delete flow
// ============================================================================

#[tokio::test]
async fn delete_removes_record_and_directory_idempotently() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let project_id = Uuid::new_v4();
    let iteration_id = Uuid::new_v4();

    mount_get_iteration(&server, existing_iteration(iteration_id, project_id)).await;
    mount_company_lookup(&server).await;
    mount_delete_iteration(&server).await;

    let dir = iteration_dir(root.path(), project_id, iteration_id);
    std::fs::create_dir_all(dir.join("geojson")).unwrap();
    std::fs::write(dir.join("geojson/a.geojson"), b"{}").unwrap();

    let pipeline = common::pipeline(root.path(), &server.uri());
    let session = common::root_session();

    pipeline.delete(&session, iteration_id).await.unwrap();
    assert!(!dir.exists());

    // Deleting again, with the directory already gone, still succeeds and
    // still removes the remote record.
    pipeline.delete(&session, iteration_id).await.unwrap();
    assert_eq!(requests_to(&server, "/delete-iteration").await.len(), 2);
}

#[tokio::test]
async fn delete_requires_root() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();

    let pipeline = common::pipeline(root.path(), &server.uri());
    let err = pipeline
        .delete(&common::session(false), Uuid::new_v4())
        .await
        .unwrap_err();

    match err {
        PipelineError::Rejected { code, .. } => {
            assert_eq!(code, codes::ITERATION_DELETE_NOT_ALLOWED)
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}
