use axum::{extract::Extension, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    data_types: Vec<String>,
}

/// Health check endpoint
///
/// Reports the data types runs can be triggered for.
pub async fn health_handler(Extension(state): Extension<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        data_types: state.launcher.data_types(),
    })
}
