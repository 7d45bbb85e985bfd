use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::api::response::ApiError;
use crate::AppState;

/// Claims this service reads from an access token. Decoded once here and
/// passed around as a value -- handlers never touch the raw token claims.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub is_root: bool,
    pub exp: usize,
}

/// The cookie pair forwarded verbatim on every sibling-service call.
#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub token: String,
    pub refresh_token: String,
}

impl AuthTokens {
    pub fn cookie_header(&self) -> String {
        format!("token={}; refreshToken={}", self.token, self.refresh_token)
    }
}

/// Verified identity attached to each authenticated request.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub claims: Claims,
    pub tokens: AuthTokens,
}

/// Middleware: verify the `token` cookie and stash an [`AuthSession`] in
/// request extensions for downstream handlers.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let cookies = parse_cookies(request.headers());
    let token = cookies
        .get("token")
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("missing auth token"))?;
    let refresh_token = cookies.get("refreshToken").cloned().unwrap_or_default();

    let key = DecodingKey::from_secret(state.config.auth.jwt_secret.as_bytes());
    let decoded = jsonwebtoken::decode::<Claims>(&token, &key, &Validation::new(Algorithm::HS256))
        .map_err(|e| ApiError::unauthorized(format!("invalid auth token: {e}")))?;

    request.extensions_mut().insert(AuthSession {
        claims: decoded.claims,
        tokens: AuthTokens {
            token,
            refresh_token,
        },
    });

    Ok(next.run(request).await)
}

fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}
