//! Shared state handed to every handler.

use std::sync::Arc;

use tracewarden_pipeline::PipelineController;
use tracewarden_telemetry::Metrics;

pub(crate) struct ApiState {
    pub(crate) controller: Arc<PipelineController>,
    pub(crate) telemetry: Metrics,
}

impl ApiState {
    pub(crate) fn new(controller: Arc<PipelineController>, telemetry: Metrics) -> Self {
        Self {
            controller,
            telemetry,
        }
    }
}
