use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ConnectionCheckResponse {
    pub user_service: bool,
    pub project_service: bool,
}

pub async fn health_check() -> &'static str {
    "OK"
}

/// Report whether the sibling services this one depends on are reachable.
pub async fn connection_check(
    State(state): State<Arc<AppState>>,
) -> Json<ConnectionCheckResponse> {
    let (user_service, project_service) = tokio::join!(
        state.remote.user_service_healthy(),
        state.remote.project_service_healthy(),
    );

    Json(ConnectionCheckResponse {
        user_service,
        project_service,
    })
}
