//! Async bridge from the pipeline to the flow classifier.
//!
//! # Design
//! - Model and log locations come from the configuration snapshot of each call.
//! - One cache and one log lock are shared by the transform workers and the monitor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracewarden_classifier::{
    AnalysisOutcome, AnalysisSummary, AnalyzedFileCache, DetectionLog, FileTreeSource,
    FlowAnalyzer, TreeSource,
};
use tracewarden_config::PipelineConfig;
use tracewarden_events::Event;
use tracing::warn;

use crate::context::PipelineContext;
use crate::error::{PipelineError, PipelineResult};

const HEALTH_COMPONENT: &str = "classifier";

/// Runs flow analyses on the blocking pool and reports their results.
#[derive(Clone)]
pub struct AnalysisStage {
    ctx: PipelineContext,
    cache: AnalyzedFileCache,
    log: DetectionLog,
    trees: Option<Arc<dyn TreeSource>>,
}

impl AnalysisStage {
    /// Build a stage that loads the model from the configured path.
    #[must_use]
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx,
            cache: AnalyzedFileCache::new(),
            log: DetectionLog::new(PathBuf::new()),
            trees: None,
        }
    }

    /// Use `trees` instead of the configured model file.
    #[must_use]
    pub fn with_tree_source(mut self, trees: Arc<dyn TreeSource>) -> Self {
        self.trees = Some(trees);
        self
    }

    /// Cache of analyzed flow files.
    #[must_use]
    pub const fn cache(&self) -> &AnalyzedFileCache {
        &self.cache
    }

    /// Analyze `path` with the locations from `config`.
    ///
    /// Failures are logged and mark the classifier degraded; they are also returned.
    ///
    /// # Errors
    ///
    /// Returns an error when the analysis fails or the blocking task cannot be joined.
    pub async fn analyze(
        &self,
        config: &PipelineConfig,
        path: &Path,
    ) -> PipelineResult<AnalysisOutcome> {
        let analyzer = self.analyzer_for(config);
        let owned = path.to_path_buf();
        let joined = tokio::task::spawn_blocking(move || analyzer.analyze(&owned)).await;
        let result = match joined {
            Ok(result) => result.map_err(PipelineError::from),
            Err(err) => Err(PipelineError::Task {
                operation: "analyze_flow_file",
                detail: err.to_string(),
            }),
        };

        match &result {
            Ok(AnalysisOutcome::Analyzed(summary)) => {
                self.report(summary, config.alert_threshold_pct);
                self.ctx.mark_recovered(HEALTH_COMPONENT);
            }
            Ok(AnalysisOutcome::AlreadyAnalyzed) => {}
            Err(err) => {
                warn!(path = %path.display(), error = ?err, "flow analysis failed");
                self.ctx.mark_degraded(HEALTH_COMPONENT, &err.to_string());
            }
        }
        result
    }

    fn analyzer_for(&self, config: &PipelineConfig) -> FlowAnalyzer {
        let trees = self.trees.clone().unwrap_or_else(|| {
            Arc::new(FileTreeSource::new(config.resolved_model_path())) as Arc<dyn TreeSource>
        });
        FlowAnalyzer::new(
            trees,
            self.cache.clone(),
            self.log.relocated(config.resolved_detection_log_path()),
            config.alert_threshold_pct,
        )
    }

    fn report(&self, summary: &AnalysisSummary, threshold_pct: f64) {
        self.ctx
            .metrics()
            .observe_analysis(summary.total_flows, summary.attack_flows);
        self.ctx.publish(Event::FlowFileAnalyzed {
            file: summary.file.clone(),
            total_flows: summary.total_flows,
            attack_flows: summary.attack_flows,
            attack_percentage: summary.attack_percentage,
        });
        if summary.alert {
            self.ctx.metrics().inc_attack_alert();
            self.ctx.publish(Event::AttackAlert {
                file: summary.file.clone(),
                attack_percentage: summary.attack_percentage,
                threshold_pct,
            });
        }
    }
}
