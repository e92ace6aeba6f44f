use axum::{extract::Extension, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::kernel::LaunchError;
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct TriggerRunRequest {
    #[serde(rename = "type")]
    pub data_type: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TriggerRunResponse {
    Accepted {
        #[serde(rename = "type")]
        data_type: String,
        run_id: Uuid,
    },
    Rejected {
        #[serde(rename = "type")]
        data_type: String,
        error: String,
    },
}

/// Start a pipeline run for one data type.
///
/// Returns as soon as the run is queued; its outcome shows up in the logs,
/// the data repository and the review surface.
pub async fn trigger_run_handler(
    Extension(state): Extension<AppState>,
    Json(request): Json<TriggerRunRequest>,
) -> (StatusCode, Json<TriggerRunResponse>) {
    match state.launcher.launch(&request.data_type) {
        Ok(run_id) => {
            tracing::info!(
                run_id = %run_id,
                data_type = %request.data_type,
                "Run accepted"
            );
            (
                StatusCode::ACCEPTED,
                Json(TriggerRunResponse::Accepted {
                    data_type: request.data_type,
                    run_id,
                }),
            )
        }
        Err(e @ LaunchError::UnknownDataType(_)) => {
            tracing::warn!(data_type = %request.data_type, "Rejected run for unknown data type");
            (
                StatusCode::BAD_REQUEST,
                Json(TriggerRunResponse::Rejected {
                    data_type: request.data_type,
                    error: e.to_string(),
                }),
            )
        }
    }
}
