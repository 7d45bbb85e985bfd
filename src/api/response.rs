use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::codes;

// ============================================================================
// Success envelope
// ============================================================================

/// The `{Data, Meta}` wrapper every service on this platform responds with.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "Data")]
    pub data: T,
    #[serde(rename = "Meta")]
    pub meta: Meta,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Meta {
    #[serde(rename = "Status")]
    pub status: u16,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> (StatusCode, Json<Envelope<T>>) {
        (StatusCode::OK, Json(Self::wrap(data)))
    }

    pub fn created(data: T) -> (StatusCode, Json<Envelope<T>>) {
        (StatusCode::CREATED, Json(Self::wrap(data)))
    }

    fn wrap(data: T) -> Envelope<T> {
        Envelope {
            data,
            meta: Meta { status: 200 },
        }
    }
}

// ============================================================================
// Error envelope
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "ErrorCode")]
    pub error_code: i32,
    #[serde(rename = "Error")]
    pub error: String,
}

/// Unified handler error: an HTTP status plus the platform error envelope.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(code: i32, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: codes::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: codes::FILE_NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::internal_with_code(codes::INTERNAL_ERROR, message)
    }

    pub fn internal_with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code,
            message: message.into(),
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(ErrorBody {
                error_code: self.code,
                error: self.message,
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Custom extractors (reject with envelope-formatted ApiError)
// ============================================================================

/// Drop-in replacement for `axum::Json` that rejects with the platform's
/// error envelope instead of axum's plain-text rejection.
pub struct AppJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => {
                let message = match rejection {
                    JsonRejection::JsonDataError(err) => {
                        format!("Invalid request body: {}", err.body_text())
                    }
                    JsonRejection::JsonSyntaxError(_) => "Malformed JSON in request body".into(),
                    JsonRejection::MissingJsonContentType(_) => {
                        "Missing Content-Type: application/json header".into()
                    }
                    _ => "Failed to read request body".into(),
                };
                Err(ApiError::bad_request(codes::INVALID_REQUEST, message))
            }
        }
    }
}
