use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub services: ServicesConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Maximum accepted request body size in bytes
    pub body_limit: usize,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory all iteration assets live under
    pub upload_root: PathBuf,
}

/// Base URLs of the sibling services this one calls.
#[derive(Debug, Clone)]
pub struct ServicesConfig {
    /// Project service: iteration metadata CRUD and company lookup
    pub project_base_url: String,
    /// User service: permission validation
    pub user_base_url: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret the auth service signs access tokens with
    pub jwt_secret: String,
}

const DEFAULT_BODY_LIMIT_MB: usize = 50;

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_default();
        let development = environment == "development";

        let port = std::env::var("SERVER_IN_PORT").unwrap_or_else(|_| "8080".to_string());
        let bind_address = format!("0.0.0.0:{port}");

        // Development gets a generous limit; production takes REQUEST_LIMIT
        // in megabytes.
        let body_limit = if development {
            1024 * 1024 * 1024
        } else {
            std::env::var("REQUEST_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BODY_LIMIT_MB)
                * 1024
                * 1024
        };

        let allowed_origins_var = if development {
            std::env::var("ALLOWED_DEV_ORIGINS")
        } else {
            std::env::var("ALLOWED_ORIGINS")
        };
        let allowed_origins: Vec<String> = allowed_origins_var
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let upload_root = match std::env::var("UPLOAD_DIRECTORY") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => default_upload_root(),
        };

        let services = ServicesConfig {
            project_base_url: service_base_url("PROJECT_SERVICE_HOST", "PROJECT_SERVICE_PORT"),
            user_base_url: service_base_url("USER_SERVICE_HOST", "USER_SERVICE_PORT"),
        };

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_default();

        let config = Config {
            server: ServerConfig {
                bind_address,
                body_limit,
                allowed_origins,
            },
            storage: StorageConfig { upload_root },
            services,
            auth: AuthConfig { jwt_secret },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "JWT_SECRET must be set".to_string(),
            ));
        }

        if self.services.project_base_url.starts_with(':') {
            return Err(ConfigError::ValidationError(
                "PROJECT_SERVICE_HOST must be set".to_string(),
            ));
        }

        if self.services.user_base_url.starts_with(':') {
            return Err(ConfigError::ValidationError(
                "USER_SERVICE_HOST must be set".to_string(),
            ));
        }

        Ok(())
    }
}

/// `<host>:<port>` for a sibling service; host carries the scheme.
fn service_base_url(host_var: &str, port_var: &str) -> String {
    let host = std::env::var(host_var).unwrap_or_default();
    let port = std::env::var(port_var).unwrap_or_default();
    format!("{host}:{port}")
}

/// `uploads/` next to the running binary when UPLOAD_DIRECTORY is unset.
fn default_upload_root() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("uploads")))
        .unwrap_or_else(|| PathBuf::from("./uploads"))
}
