//! Event payload types carried across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier assigned to each event emitted by the pipeline.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed domain events surfaced by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A pipeline run began.
    PipelineStarted {
        /// Identifier of the run.
        run_id: Uuid,
    },
    /// A pipeline run was cancelled.
    PipelineStopped {
        /// Identifier of the run that ended.
        run_id: Uuid,
    },
    /// Live configuration changed through the control surface.
    SettingsChanged {
        /// Fields whose value changed.
        fields: Vec<String>,
    },
    /// A capture was copied from the remote source into staging.
    CaptureCopied {
        /// Local path of the copied capture.
        path: String,
    },
    /// A capture was queued for transformation.
    CaptureDispatched {
        /// Local path of the queued capture.
        path: String,
    },
    /// A capture produced a flow file.
    TransformCompleted {
        /// Raw capture that was transformed.
        capture: String,
        /// Flow file that resulted.
        flow_file: String,
        /// Whether the flow file is a header-only placeholder.
        placeholder: bool,
    },
    /// A capture could not be transformed.
    TransformFailed {
        /// Raw capture that failed.
        capture: String,
        /// Human-readable failure summary.
        message: String,
    },
    /// A flow file was classified and recorded in the detection log.
    FlowFileAnalyzed {
        /// Basename of the analyzed flow file.
        file: String,
        /// Number of classified flows.
        total_flows: u64,
        /// Number of flows classified as an attack.
        attack_flows: u64,
        /// Share of attack flows, in percent.
        attack_percentage: f64,
    },
    /// A flow file exceeded the attack threshold.
    AttackAlert {
        /// Basename of the analyzed flow file.
        file: String,
        /// Share of attack flows, in percent.
        attack_percentage: f64,
        /// Threshold that was exceeded.
        threshold_pct: f64,
    },
    /// Overall health changed.
    HealthChanged {
        /// Components currently reported as degraded.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator used for logging and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PipelineStarted { .. } => "pipeline_started",
            Self::PipelineStopped { .. } => "pipeline_stopped",
            Self::SettingsChanged { .. } => "settings_changed",
            Self::CaptureCopied { .. } => "capture_copied",
            Self::CaptureDispatched { .. } => "capture_dispatched",
            Self::TransformCompleted { .. } => "transform_completed",
            Self::TransformFailed { .. } => "transform_failed",
            Self::FlowFileAnalyzed { .. } => "flow_file_analyzed",
            Self::AttackAlert { .. } => "attack_alert",
            Self::HealthChanged { .. } => "health_changed",
        }
    }
}

/// Metadata wrapper around events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event.
    pub event: Event,
}
