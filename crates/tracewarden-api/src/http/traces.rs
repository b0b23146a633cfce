//! Pipeline lifecycle and configuration endpoints.

use std::sync::Arc;

use axum::{Json, body::Bytes, extract::State};
use tracewarden_config::ConfigPatch;
use tracewarden_pipeline::{StartOutcome, StopOutcome};
use tracing::{info, warn};

use crate::http::errors::ApiError;
use crate::models::{CommandResponse, StatusResponse};
use crate::state::ApiState;

pub(crate) async fn start(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<CommandResponse>, ApiError> {
    let outcome = state.controller.start().await.map_err(|err| {
        warn!(error = ?err, "pipeline start failed");
        ApiError::from(err)
    })?;
    let message = match outcome {
        StartOutcome::Started { run_id } => {
            info!(%run_id, "pipeline start requested");
            "Trace collector started successfully"
        }
        StartOutcome::AlreadyRunning { .. } => "Trace collector is already running",
    };
    Ok(Json(CommandResponse {
        message: message.to_string(),
        config: Some(state.controller.config().snapshot()),
    }))
}

pub(crate) async fn stop(State(state): State<Arc<ApiState>>) -> Json<CommandResponse> {
    let message = match state.controller.stop().await {
        StopOutcome::Stopped { .. } => "Trace collector stopped successfully",
        StopOutcome::NotRunning => "Trace collector is not running",
    };
    Json(CommandResponse {
        message: message.to_string(),
        config: None,
    })
}

pub(crate) async fn status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let status = state.controller.status().await;
    Json(StatusResponse {
        status: status.running,
        run_id: status.run_id.map(|id| id.to_string()),
        config: status.config,
    })
}

pub(crate) async fn configure(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<CommandResponse>, ApiError> {
    let patch = ConfigPatch::from_json(&body).map_err(|err| {
        warn!(error = ?err, "rejected configuration body");
        ApiError::from(err)
    })?;
    let merged = state.controller.configure(patch).map_err(|err| {
        warn!(error = ?err, "rejected configuration change");
        ApiError::from(err)
    })?;
    Ok(Json(CommandResponse {
        message: "Configuration updated successfully".to_string(),
        config: Some(merged),
    }))
}
