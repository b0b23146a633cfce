//! Pipeline lifecycle control.
//!
//! # Design
//! - One async mutex guards the active run, so concurrent start/stop calls serialize.
//! - Each run gets a child of the process shutdown token; stopping cancels only that child.
//! - Stop releases the run lock before the run drains, so status and start never wait on
//!   in-flight transforms. Drained runs are tracked until [`PipelineController::wait_for_drain`].
//! - The analysis stage (and its analyzed-file cache) outlives runs and is shared with the monitor.

use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracewarden_config::{ConfigPatch, PipelineConfig};
use tracewarden_events::Event;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::AnalysisStage;
use crate::collector::{CollectorLoop, ListingPolicy};
use crate::context::{ConfigHandle, PipelineContext};
use crate::dispatch::Dispatcher;
use crate::error::{PipelineError, PipelineResult};
use crate::monitor::OutputDirectoryMonitor;
use crate::source::CaptureSource;
use crate::tools::{ToolRunner, is_explicit_path};
use crate::transform::FileTransformStage;

const TOOLS_COMPONENT: &str = "tools";

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new run was launched.
    Started {
        /// Identifier of the new run.
        run_id: Uuid,
    },
    /// A run was already active; nothing changed.
    AlreadyRunning {
        /// Identifier of the active run.
        run_id: Uuid,
    },
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The active run was cancelled.
    ///
    /// Transforms already in progress finish in the background; queued captures that had
    /// not started are dropped and re-dispatched from staging by the next run.
    Stopped {
        /// Identifier of the run that ended.
        run_id: Uuid,
    },
    /// No run was active.
    NotRunning,
}

/// Point-in-time view of the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    /// Whether a run is active.
    pub running: bool,
    /// Identifier of the active run.
    pub run_id: Option<Uuid>,
    /// Current configuration.
    pub config: PipelineConfig,
}

struct ActiveRun {
    id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the pipeline run state and configuration.
pub struct PipelineController {
    config: ConfigHandle,
    ctx: PipelineContext,
    source: Arc<dyn CaptureSource>,
    runner: Arc<dyn ToolRunner>,
    analysis: AnalysisStage,
    policy: ListingPolicy,
    shutdown: CancellationToken,
    active: Mutex<Option<ActiveRun>>,
    draining: StdMutex<Vec<(Uuid, JoinHandle<()>)>>,
}

impl PipelineController {
    /// Build a stopped controller; runs and the monitor end when `shutdown` fires.
    #[must_use]
    pub fn new(
        config: ConfigHandle,
        ctx: PipelineContext,
        source: Arc<dyn CaptureSource>,
        runner: Arc<dyn ToolRunner>,
        shutdown: CancellationToken,
    ) -> Self {
        let analysis = AnalysisStage::new(ctx.clone());
        Self {
            config,
            ctx,
            source,
            runner,
            analysis,
            policy: ListingPolicy::default(),
            shutdown,
            active: Mutex::new(None),
            draining: StdMutex::new(Vec::new()),
        }
    }

    /// Replace the analysis stage.
    #[must_use]
    pub fn with_analysis(mut self, analysis: AnalysisStage) -> Self {
        self.analysis = analysis;
        self
    }

    /// Replace the remote listing policy used by future runs.
    #[must_use]
    pub const fn with_listing_policy(mut self, policy: ListingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Live configuration handle.
    #[must_use]
    pub const fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Shared pipeline context.
    #[must_use]
    pub const fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Analysis stage shared by runs and the monitor.
    #[must_use]
    pub const fn analysis(&self) -> &AnalysisStage {
        &self.analysis
    }

    /// Start a run unless one is active.
    ///
    /// # Errors
    ///
    /// Returns an error when a working directory cannot be created.
    pub async fn start(&self) -> PipelineResult<StartOutcome> {
        let mut active = self.active.lock().await;
        if let Some(run) = active.as_ref() {
            debug!(run_id = %run.id, "start requested while running");
            return Ok(StartOutcome::AlreadyRunning { run_id: run.id });
        }

        let config = self.config.snapshot();
        for dir in config.working_directories() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| PipelineError::io("create_working_dir", dir, source))?;
        }
        self.preflight(&config);

        let run_id = Uuid::new_v4();
        let cancel = self.shutdown.child_token();
        let stage = FileTransformStage::new(
            self.ctx.clone(),
            Arc::clone(&self.runner),
            self.analysis.clone(),
        );
        let dispatcher = Dispatcher::spawn(
            self.ctx.clone(),
            self.config.clone(),
            stage,
            config.worker_count,
            config.queue_depth,
            cancel.clone(),
        );
        let collector = CollectorLoop::new(
            self.config.clone(),
            self.ctx.clone(),
            Arc::clone(&self.source),
            dispatcher,
            cancel.clone(),
        )
        .with_policy(self.policy);
        let task = tokio::spawn(collector.run(config.poll_interval()));

        *active = Some(ActiveRun {
            id: run_id,
            cancel,
            task,
        });
        drop(active);

        self.ctx.metrics().set_pipeline_running(true);
        self.ctx.publish(Event::PipelineStarted { run_id });
        info!(%run_id, workers = config.worker_count, "pipeline started");
        Ok(StartOutcome::Started { run_id })
    }

    /// Stop the active run.
    ///
    /// Returns once the run is cancelled; its in-flight transforms finish in the background.
    pub async fn stop(&self) -> StopOutcome {
        let Some(run) = self.active.lock().await.take() else {
            debug!("stop requested while stopped");
            return StopOutcome::NotRunning;
        };
        run.cancel.cancel();
        self.track_drain(run.id, run.task);

        self.ctx.metrics().set_pipeline_running(false);
        self.ctx.publish(Event::PipelineStopped { run_id: run.id });
        info!(run_id = %run.id, "pipeline stopped; in-flight transforms draining");
        StopOutcome::Stopped { run_id: run.id }
    }

    /// Wait until every stopped run has finished its in-flight transforms.
    pub async fn wait_for_drain(&self) {
        let runs = std::mem::take(&mut *self.draining.lock().unwrap_or_else(PoisonError::into_inner));
        for (run_id, task) in runs {
            if let Err(err) = task.await {
                warn!(%run_id, error = %err, "collector task ended abnormally");
            }
        }
    }

    /// Number of stopped runs whose transforms are still finishing.
    #[must_use]
    pub fn draining_runs(&self) -> usize {
        self.draining
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .count()
    }

    /// Whether a run is active.
    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Running flag, run id, and configuration snapshot.
    pub async fn status(&self) -> PipelineStatus {
        let run_id = self.active.lock().await.as_ref().map(|run| run.id);
        PipelineStatus {
            running: run_id.is_some(),
            run_id,
            config: self.config.snapshot(),
        }
    }

    /// Merge `patch` into the live configuration.
    ///
    /// Directory changes reach a running collector on its next tick; the poll
    /// interval, worker count, and queue depth apply from the next start.
    ///
    /// # Errors
    ///
    /// Returns an error when the merged configuration is invalid.
    pub fn configure(&self, patch: ConfigPatch) -> PipelineResult<PipelineConfig> {
        let (merged, changed) = self.config.apply(patch)?;
        if changed.is_empty() {
            debug!("configuration patch changed nothing");
        } else {
            info!(fields = ?changed, "configuration updated");
            self.ctx.publish(Event::SettingsChanged {
                fields: changed.iter().map(ToString::to_string).collect(),
            });
        }
        Ok(merged)
    }

    /// Launch the output directory monitor for the rest of the process lifetime.
    #[must_use]
    pub fn spawn_monitor(&self) -> JoinHandle<()> {
        let monitor = OutputDirectoryMonitor::new(self.config.clone(), self.analysis.clone());
        tokio::spawn(monitor.run(self.shutdown.child_token()))
    }

    /// Stop any active run, cancel everything derived from the shutdown token, and wait
    /// for in-flight transforms.
    pub async fn shutdown(&self) {
        let _ = self.stop().await;
        self.shutdown.cancel();
        self.wait_for_drain().await;
    }

    fn track_drain(&self, run_id: Uuid, task: JoinHandle<()>) {
        let mut draining = self.draining.lock().unwrap_or_else(PoisonError::into_inner);
        draining.retain(|(_, task)| !task.is_finished());
        draining.push((run_id, task));
    }

    fn preflight(&self, config: &PipelineConfig) {
        let missing: Vec<&Path> = [
            config.strip_tool_path.as_path(),
            config.flow_tool_path.as_path(),
        ]
        .into_iter()
        .filter(|tool| is_explicit_path(tool) && !tool.exists())
        .collect();

        if missing.is_empty() {
            self.ctx.mark_recovered(TOOLS_COMPONENT);
        } else {
            let detail = missing
                .iter()
                .map(|tool| tool.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            warn!(missing = %detail, "external tools not found; captures will fail until installed");
            self.ctx.mark_degraded(TOOLS_COMPONENT, &detail);
        }
    }
}
