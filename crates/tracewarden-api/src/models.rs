//! Wire types returned by the control surface.

use serde::{Deserialize, Serialize};
use tracewarden_config::PipelineConfig;

/// RFC9457-compatible problem document surfaced on validation/runtime errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    /// URI reference identifying the problem type.
    pub kind: String,
    /// Short, human-readable summary of the issue.
    pub title: String,
    /// HTTP status code associated with the error.
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Detailed diagnostic message when available.
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Parameters that failed validation, if applicable.
    pub invalid_params: Option<Vec<ProblemInvalidParam>>,
}

/// Invalid parameter pointer surfaced alongside a [`ProblemDetails`] payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemInvalidParam {
    /// JSON pointer to the offending field.
    pub pointer: String,
    /// Machine-readable reason.
    pub message: String,
}

/// Acknowledgement of a lifecycle or configuration command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResponse {
    /// Outcome message.
    pub message: String,
    /// Configuration in effect after the command, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<PipelineConfig>,
}

/// Pipeline status view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    /// Whether the pipeline is running.
    pub status: bool,
    /// Identifier of the active run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Current configuration.
    pub config: PipelineConfig,
}

/// Health summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: String,
    /// Whether the pipeline is running.
    pub running: bool,
    /// Build identifier.
    pub build: String,
    /// Components currently degraded.
    pub degraded: Vec<String>,
    /// Captures waiting for a transform worker.
    pub dispatch_queue_depth: i64,
    /// Flow files classified since start-up.
    pub flow_files_analyzed_total: u64,
    /// Attack alerts raised since start-up.
    pub attack_alerts_total: u64,
}
