//! Flow-output directory monitor.
//!
//! # Design
//! - Runs for the whole process lifetime, independent of pipeline runs.
//! - The directory and interval are re-read from the live configuration before every scan.
//! - Its own seen set is keyed by basename; the shared analyzed cache prevents double counting
//!   with the transform workers.
//! - The seen set is process-local, so a restart re-scans every existing flow file.
//! - A scan waits for every analysis it spawned, so one slow file delays the next scan.
//!   Cancellation is only observed between scans.

use std::collections::HashSet;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::AnalysisStage;
use crate::context::ConfigHandle;
use crate::scan::files_with_suffix_async;

const FLOW_EXTENSION: &str = ".csv";

/// Periodically analyzes flow files the collector never handed over.
pub struct OutputDirectoryMonitor {
    config: ConfigHandle,
    analysis: AnalysisStage,
    seen: HashSet<String>,
}

impl OutputDirectoryMonitor {
    /// Build a monitor that shares `analysis` (and its cache) with the transform stage.
    #[must_use]
    pub fn new(config: ConfigHandle, analysis: AnalysisStage) -> Self {
        Self {
            config,
            analysis,
            seen: HashSet::new(),
        }
    }

    /// Scan until `cancel` fires, waiting the configured monitor interval before each scan.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("output directory monitor started");
        loop {
            let interval = self.config.snapshot().monitor_interval();
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
            let analyzed = self.scan().await;
            if analyzed > 0 {
                debug!(analyzed, "monitor scan handed off new flow files");
            }
        }
        info!("output directory monitor stopped");
    }

    /// Analyze every flow file not seen by an earlier scan; returns how many were handed off.
    pub async fn scan(&mut self) -> usize {
        let config = self.config.snapshot();
        let flows = match files_with_suffix_async(
            "scan_flow_dir",
            &config.flow_output_dir,
            FLOW_EXTENSION,
        )
        .await
        {
            Ok(flows) => flows,
            Err(err) => {
                warn!(path = %config.flow_output_dir.display(), error = ?err, "flow directory scan failed");
                return 0;
            }
        };

        let mut tasks = JoinSet::new();
        for flow in flows {
            let Some(name) = flow.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if !self.seen.insert(name) {
                continue;
            }
            let analysis = self.analysis.clone();
            let config = config.clone();
            tasks.spawn(async move {
                // Failures are logged by the analysis stage.
                let _ = analysis.analyze(&config, &flow).await;
            });
        }

        let handed_off = tasks.len();
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "monitor analysis task failed");
            }
        }
        handed_off
    }

    /// Number of flow files seen so far.
    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PipelineContext;
    use tracewarden_config::{ConfigPatch, PipelineConfig};
    use tracewarden_events::EventBus;
    use tracewarden_telemetry::Metrics;
    use tracewarden_test_support::fixtures::{sample_tree, write_sample_flows, write_tree};
    use tracewarden_test_support::workspace::PipelineWorkspace;

    #[tokio::test]
    async fn scans_new_files_once_and_follows_config() -> anyhow::Result<()> {
        let workspace = PipelineWorkspace::new()?;
        write_tree(&workspace.model_path(), &sample_tree())?;
        let config = ConfigHandle::new(PipelineConfig {
            flow_output_dir: workspace.flow_dir(),
            ..PipelineConfig::default()
        });
        let ctx = PipelineContext::new(EventBus::with_capacity(32), Metrics::new()?);
        let mut monitor = OutputDirectoryMonitor::new(config.clone(), AnalysisStage::new(ctx));

        write_sample_flows(&workspace.flow_dir(), "one_Flow.csv")?;
        std::fs::write(workspace.flow_dir().join("ignored.txt"), b"x")?;
        assert_eq!(monitor.scan().await, 1);
        assert_eq!(monitor.scan().await, 0);
        assert_eq!(workspace.detection_log_lines()?.len(), 1);

        let moved = workspace.root().join("flow_output_2");
        write_sample_flows(&moved, "two_Flow.csv")?;
        config.apply(ConfigPatch {
            flow_output_dir: Some(moved),
            detection_log_path: Some(workspace.detection_log_path()),
            model_path: Some(workspace.model_path()),
            ..ConfigPatch::default()
        })?;
        assert_eq!(monitor.scan().await, 1);
        assert_eq!(monitor.seen_count(), 2);
        assert_eq!(workspace.detection_log_lines()?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn run_exits_on_cancel() -> anyhow::Result<()> {
        let ctx = PipelineContext::new(EventBus::with_capacity(8), Metrics::new()?);
        let monitor = OutputDirectoryMonitor::new(
            ConfigHandle::new(PipelineConfig::default()),
            AnalysisStage::new(ctx),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(monitor.run(cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle).await??;
        Ok(())
    }
}
