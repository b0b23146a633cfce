//! Health and metrics endpoints.

use std::sync::Arc;

use axum::{Json, body::Body, extract::State, http::StatusCode, response::Response};
use tracewarden_telemetry::build_sha;
use tracing::error;

use crate::http::errors::ApiError;
use crate::models::HealthResponse;
use crate::state::ApiState;

pub(crate) async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    let degraded = state.controller.context().degraded();
    let snapshot = state.telemetry.snapshot();
    Json(HealthResponse {
        status: if degraded.is_empty() { "ok" } else { "degraded" }.to_string(),
        running: state.controller.is_running().await,
        build: build_sha().to_string(),
        degraded,
        dispatch_queue_depth: snapshot.dispatch_queue_depth,
        flow_files_analyzed_total: snapshot.flow_files_analyzed_total,
        attack_alerts_total: snapshot.attack_alerts_total,
    })
}

pub(crate) async fn metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    match state.telemetry.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )
            .body(Body::from(body))
            .map_err(|err| {
                error!(error = %err, "failed to build metrics response");
                ApiError::internal("failed to build metrics response")
            }),
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            Err(ApiError::internal("failed to render metrics"))
        }
    }
}
