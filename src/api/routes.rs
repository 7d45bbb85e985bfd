use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::auth;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.body_limit;

    let authenticated = Router::new()
        .route(
            "/project/:company_id/:project_id/:iteration_id/*path",
            get(handlers::get_project_file),
        )
        .route(
            "/project/upload-iteration",
            post(handlers::upload_iteration).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/project/edit-iteration",
            post(handlers::edit_iteration).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/project/remove-iteration", post(handlers::remove_iteration))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_auth,
        ));

    Router::new()
        .route("/health-check", get(handlers::health_check))
        .route("/connection-check", get(handlers::connection_check))
        .merge(authenticated)
        .layer(CatchPanicLayer::new())
        .layer(cors_layer(&state.config.server.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}
