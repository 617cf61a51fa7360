use std::{sync::Arc, time::Instant};

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::AppState;

pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// Rejects requests whose key header does not match the configured key.
/// Passes everything through when auth is disabled.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let auth = &state.config.auth;
    if !auth.enabled {
        return next.run(request).await;
    }

    let authorized = match (
        request
            .headers()
            .get(auth.header.as_str())
            .and_then(|value| value.to_str().ok()),
        auth.api_key.as_deref(),
    ) {
        (Some(presented), Some(expected)) => presented == expected,
        _ => false,
    };
    if !authorized {
        warn!(path = %request.uri().path(), "rejected request with invalid or missing api key");
        return (StatusCode::UNAUTHORIZED, "Invalid or missing API key").into_response();
    }
    next.run(request).await
}

/// Adds the handling time in seconds as a response header.
pub async fn record_process_time(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = started.elapsed().as_secs_f64();
    if let Ok(value) = HeaderValue::from_str(&elapsed.to_string()) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }
    response
}
