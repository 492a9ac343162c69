//! Prometheus metrics endpoint

use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, response::Response};

/// Render the Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
