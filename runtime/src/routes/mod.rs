use std::sync::Arc;

use axum::{Json, Router, extract::DefaultBodyLimit, middleware, routing::get};
use chrono::Utc;
use tower_http::cors::CorsLayer;

use crate::AppState;

pub mod auth;
pub mod documents;
pub mod types;

pub use documents::document_routes;
use types::HealthResponse;

/// Multipart framing overhead allowed on top of the configured upload limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn app_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.upload.max_bytes + MULTIPART_OVERHEAD;
    let documents = document_routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_api_key,
    ));
    Router::new()
        .route("/health", get(health))
        .merge(documents)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(auth::record_process_time))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
