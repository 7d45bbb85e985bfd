use chrono::{DateTime, Utc};
use reqwest::header::COOKIE;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::AuthTokens;
use crate::codes;
use crate::config::ServicesConfig;
use crate::layout::AssetKind;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum RemoteError {
    /// A sibling service answered with its error envelope.
    #[error("{message}")]
    Service { code: i32, message: String },
    #[error("request to sibling service failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl RemoteError {
    /// Error code to surface in this service's own error envelope.
    pub fn code(&self) -> i32 {
        match self {
            RemoteError::Service { code, .. } => *code,
            RemoteError::Transport(_) => codes::INTERNAL_ERROR,
        }
    }
}

// ============================================================================
// Wire models
// ============================================================================

/// An iteration record as the Project service returns it. Each asset slot is
/// a URL/file-name pair that is either fully present or fully absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub geojson_url: Option<String>,
    #[serde(default)]
    pub geojson_file_name: Option<String>,
    #[serde(default)]
    pub tile_3d_url: Option<String>,
    #[serde(default)]
    pub tile_3d_file_name: Option<String>,
    #[serde(default)]
    pub ortho_photo_url: Option<String>,
    #[serde(default)]
    pub ortho_photo_file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateIterationRequest {
    pub id: Uuid,
    pub revision: Option<String>,
    pub geojson_url: Option<String>,
    pub geojson_file_name: Option<String>,
    pub tile_3d_url: Option<String>,
    pub tile_3d_file_name: Option<String>,
    pub ortho_photo_url: Option<String>,
    pub ortho_photo_file_name: Option<String>,
}

impl UpdateIterationRequest {
    /// Set or clear one asset slot. Taking URL and file name together keeps
    /// a slot from ever holding one without the other.
    pub fn set_asset(&mut self, kind: AssetKind, slot: Option<(String, String)>) {
        let (url, file_name) = match slot {
            Some((url, file_name)) => (Some(url), Some(file_name)),
            None => (None, None),
        };
        match kind {
            AssetKind::GeoJson => {
                self.geojson_url = url;
                self.geojson_file_name = file_name;
            }
            AssetKind::Tile3d => {
                self.tile_3d_url = url;
                self.tile_3d_file_name = file_name;
            }
            AssetKind::OrthoPhoto => {
                self.ortho_photo_url = url;
                self.ortho_photo_file_name = file_name;
            }
        }
    }
}

impl From<&IterationResponse> for UpdateIterationRequest {
    fn from(iteration: &IterationResponse) -> Self {
        Self {
            id: iteration.id,
            revision: iteration.revision.clone(),
            geojson_url: iteration.geojson_url.clone(),
            geojson_file_name: iteration.geojson_file_name.clone(),
            tile_3d_url: iteration.tile_3d_url.clone(),
            tile_3d_file_name: iteration.tile_3d_file_name.clone(),
            ortho_photo_url: iteration.ortho_photo_url.clone(),
            ortho_photo_file_name: iteration.ortho_photo_file_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GetByIdRequest {
    id: String,
}

#[derive(Debug, Serialize)]
struct DeleteByIdRequest {
    id: Uuid,
}

#[derive(Debug, Serialize)]
struct CreateIterationRequest {
    project_id: Uuid,
    revision: Option<String>,
}

#[derive(Debug, Serialize)]
struct ValidatePermissionRequest {
    project_id: Uuid,
    permission_type: &'static str,
    permission_level: &'static str,
}

/// Success envelope every sibling service wraps its payload in.
#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    #[serde(rename = "Data")]
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(rename = "ErrorCode", default)]
    error_code: i32,
    #[serde(rename = "Error", default)]
    error: String,
}

// ============================================================================
// Client
// ============================================================================

/// Client for the sibling Project and User services. Endpoints come from an
/// explicit [`ServicesConfig`] so tests can point it at a mock server.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: Client,
    services: ServicesConfig,
}

impl RemoteClient {
    pub fn new(services: ServicesConfig) -> Self {
        Self {
            http: Client::new(),
            services,
        }
    }

    /// POST `body`, forward the auth cookie pair, and unwrap the response
    /// envelope: `{Data, Meta}` on success, `{ErrorCode, Error}` otherwise.
    async fn post<Req, Res>(
        &self,
        url: String,
        body: &Req,
        tokens: &AuthTokens,
    ) -> Result<Res, RemoteError>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let response = self
            .http
            .post(url.as_str())
            .header(COOKIE, tokens.cookie_header())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let envelope: ErrorEnvelope =
                serde_json::from_slice(&body).unwrap_or_else(|_| ErrorEnvelope {
                    error_code: status.as_u16() as i32,
                    error: format!("{url} returned {status}"),
                });
            return Err(RemoteError::Service {
                code: envelope.error_code,
                message: envelope.error,
            });
        }

        let envelope: DataEnvelope<Res> = response.json().await?;
        Ok(envelope.data)
    }

    fn project_url(&self, endpoint: &str) -> String {
        format!("{}/project/{endpoint}", self.services.project_base_url)
    }

    // ========================================================================
    // Project service
    // ========================================================================

    pub async fn get_iteration(
        &self,
        iteration_id: Uuid,
        tokens: &AuthTokens,
    ) -> Result<IterationResponse, RemoteError> {
        let request = GetByIdRequest {
            id: iteration_id.to_string(),
        };
        self.post(self.project_url("get-iteration"), &request, tokens)
            .await
    }

    pub async fn create_iteration(
        &self,
        project_id: Uuid,
        revision: String,
        tokens: &AuthTokens,
    ) -> Result<IterationResponse, RemoteError> {
        let request = CreateIterationRequest {
            project_id,
            revision: Some(revision),
        };
        self.post(self.project_url("create-iteration"), &request, tokens)
            .await
    }

    pub async fn update_iteration(
        &self,
        request: &UpdateIterationRequest,
        tokens: &AuthTokens,
    ) -> Result<IterationResponse, RemoteError> {
        self.post(self.project_url("update-iteration"), request, tokens)
            .await
    }

    pub async fn delete_iteration(
        &self,
        iteration_id: Uuid,
        tokens: &AuthTokens,
    ) -> Result<(), RemoteError> {
        let request = DeleteByIdRequest { id: iteration_id };
        let _: String = self
            .post(self.project_url("delete-iteration"), &request, tokens)
            .await?;
        Ok(())
    }

    pub async fn company_id_for_project(
        &self,
        project_id: Uuid,
        tokens: &AuthTokens,
    ) -> Result<String, RemoteError> {
        let request = GetByIdRequest {
            id: project_id.to_string(),
        };
        self.post(self.project_url("get-company-id"), &request, tokens)
            .await
    }

    // ========================================================================
    // User service
    // ========================================================================

    /// Ask the permission authority whether the caller may view the project.
    pub async fn validate_permission(
        &self,
        project_id: Uuid,
        tokens: &AuthTokens,
    ) -> Result<(), RemoteError> {
        let url = format!(
            "{}/permission/validate-permission",
            self.services.user_base_url
        );
        let request = ValidatePermissionRequest {
            project_id,
            permission_type: "project",
            permission_level: "view",
        };
        let verdict: String = self.post(url, &request, tokens).await?;

        if verdict != "Granted" {
            return Err(RemoteError::Service {
                code: codes::PERMISSION_NOT_ALLOWED,
                message: "no permission".to_string(),
            });
        }
        Ok(())
    }

    // ========================================================================
    // Probes
    // ========================================================================

    pub async fn project_service_healthy(&self) -> bool {
        self.service_healthy(&self.services.project_base_url).await
    }

    pub async fn user_service_healthy(&self) -> bool {
        self.service_healthy(&self.services.user_base_url).await
    }

    async fn service_healthy(&self, base_url: &str) -> bool {
        let url = format!("{base_url}/health-check");
        match self.http.get(url.as_str()).send().await {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(_) => false,
        }
    }
}
