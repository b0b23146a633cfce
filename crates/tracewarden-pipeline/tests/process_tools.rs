use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracewarden_classifier::{ClassifierResult, DecisionTreeNode, FileTreeSource, TreeSource};
use tracewarden_config::PipelineConfig;
use tracewarden_events::EventBus;
use tracewarden_pipeline::{
    AnalysisStage, CaptureSource, ConfigHandle, FileTransformStage, ListingPolicy,
    PipelineContext, PipelineController, PipelineResult, ProcessToolRunner, StopOutcome,
    TransformOutcome,
};
use tracewarden_telemetry::Metrics;
use tracewarden_test_support::fixtures::{SAMPLE_HEADER, sample_tree, write_tree};
use tracewarden_test_support::scripts::{copying_strip_tool, failing_tool, flow_tool_writing};
use tracewarden_test_support::workspace::PipelineWorkspace;

/// Reads the model file and counts how often it was loaded.
struct CountingTrees {
    inner: FileTreeSource,
    loads: AtomicUsize,
}

impl CountingTrees {
    fn new(path: &Path) -> Arc<Self> {
        Arc::new(Self {
            inner: FileTreeSource::new(path),
            loads: AtomicUsize::new(0),
        })
    }

    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl TreeSource for CountingTrees {
    fn load(&self) -> ClassifierResult<DecisionTreeNode> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load()
    }
}

/// Source with nothing to list; only already-staged captures get processed.
struct EmptySource;

#[async_trait]
impl CaptureSource for EmptySource {
    async fn resolve_endpoint(&self, _config: &PipelineConfig) -> PipelineResult<String> {
        Ok("open5gs-upf-0".to_string())
    }

    async fn list_files(
        &self,
        _config: &PipelineConfig,
        _endpoint: &str,
    ) -> PipelineResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn copy_file(
        &self,
        _config: &PipelineConfig,
        _endpoint: &str,
        _name: &str,
        _local: &Path,
    ) -> PipelineResult<()> {
        Ok(())
    }
}

fn sample_flows() -> String {
    format!("{SAMPLE_HEADER}\na,b,1,10\nc,d,2,1")
}

fn config_for(workspace: &PipelineWorkspace, strip: &Path, flow: &Path) -> PipelineConfig {
    PipelineConfig {
        local_staging_dir: workspace.staging_dir(),
        processed_dir: workspace.processed_dir(),
        flow_output_dir: workspace.flow_dir(),
        strip_tool_path: strip.to_path_buf(),
        flow_tool_path: flow.to_path_buf(),
        model_path: Some(workspace.model_path()),
        detection_log_path: Some(workspace.detection_log_path()),
        poll_interval_secs: 1,
        tool_timeout_secs: 10,
        ..PipelineConfig::default()
    }
}

fn context() -> Result<PipelineContext> {
    Ok(PipelineContext::new(
        EventBus::with_capacity(64),
        Metrics::new()?,
    ))
}

#[tokio::test]
async fn external_tools_turn_a_capture_into_a_detection_line() -> Result<()> {
    let workspace = PipelineWorkspace::new()?;
    write_tree(&workspace.model_path(), &sample_tree())?;
    let bin = workspace.root().join("bin");
    let strip = copying_strip_tool(&bin)?;
    let flow = flow_tool_writing(&bin, &sample_flows())?;
    let config = config_for(&workspace, &strip, &flow);
    let capture = workspace.stage_capture("a.pcap", b"raw capture")?;

    let ctx = context()?;
    let trees = CountingTrees::new(&workspace.model_path());
    let analysis = AnalysisStage::new(ctx.clone()).with_tree_source(trees.clone());
    let stage = FileTransformStage::new(ctx, Arc::new(ProcessToolRunner), analysis);

    let outcome = stage.run(&config, &capture).await;
    let expected = workspace.flow_dir().join("gtp_removed_a.pcap_Flow.csv");
    assert_eq!(
        outcome,
        Some(TransformOutcome::Analyzed {
            flow_file: expected.clone()
        })
    );
    assert_eq!(
        std::fs::read(workspace.processed_dir().join("gtp_removed_a.pcap"))?,
        b"raw capture"
    );
    assert!(expected.exists());
    assert_eq!(trees.loads(), 1);

    let lines = workspace.detection_log_lines()?;
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("gtp_removed_a.pcap_Flow.csv,2,1,50.00,"));

    // Both intermediate files exist now, so a rerun skips the tools and the analysis.
    let rerun = stage.run(&config, &capture).await;
    assert_eq!(rerun, Some(TransformOutcome::Analyzed { flow_file: expected }));
    assert_eq!(trees.loads(), 1);
    assert_eq!(workspace.detection_log_lines()?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn failing_flow_tool_leaves_a_header_only_placeholder() -> Result<()> {
    let workspace = PipelineWorkspace::new()?;
    write_tree(&workspace.model_path(), &sample_tree())?;
    let bin = workspace.root().join("bin");
    let strip = copying_strip_tool(&bin)?;
    let flow = failing_tool(&bin, "flow.sh")?;
    let config = config_for(&workspace, &strip, &flow);
    let capture = workspace.stage_capture("b.pcap", b"raw")?;

    let ctx = context()?;
    let trees = CountingTrees::new(&workspace.model_path());
    let analysis = AnalysisStage::new(ctx.clone()).with_tree_source(trees.clone());
    let stage = FileTransformStage::new(ctx, Arc::new(ProcessToolRunner), analysis);

    let placeholder = workspace
        .flow_dir()
        .join("gtp_removed_b.pcap_Flow_default.csv");
    assert_eq!(
        stage.run(&config, &capture).await,
        Some(TransformOutcome::Placeholder {
            path: placeholder.clone()
        })
    );
    assert_eq!(std::fs::read_to_string(&placeholder)?.lines().count(), 1);
    assert_eq!(trees.loads(), 0);
    assert!(workspace.detection_log_lines()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn controller_runs_staged_captures_through_injected_analysis() -> Result<()> {
    let workspace = PipelineWorkspace::new()?;
    write_tree(&workspace.model_path(), &sample_tree())?;
    let bin = workspace.root().join("bin");
    let strip = copying_strip_tool(&bin)?;
    let flow = flow_tool_writing(&bin, &sample_flows())?;
    workspace.stage_capture("c.pcap", b"raw")?;

    let ctx = context()?;
    let trees = CountingTrees::new(&workspace.model_path());
    let controller = PipelineController::new(
        ConfigHandle::new(config_for(&workspace, &strip, &flow)),
        ctx.clone(),
        Arc::new(EmptySource),
        Arc::new(ProcessToolRunner),
        CancellationToken::new(),
    )
    .with_analysis(AnalysisStage::new(ctx).with_tree_source(trees.clone()))
    .with_listing_policy(ListingPolicy::All);

    controller.start().await?;
    let mut analyzed = false;
    for _ in 0..250 {
        if workspace.detection_log_lines()?.len() == 1 {
            analyzed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    if !analyzed {
        bail!("staged capture was never analyzed");
    }
    assert!(matches!(
        controller.stop().await,
        StopOutcome::Stopped { .. }
    ));
    controller.wait_for_drain().await;
    assert_eq!(trees.loads(), 1);
    assert!(
        controller
            .analysis()
            .cache()
            .contains(&workspace.flow_dir().join("gtp_removed_c.pcap_Flow.csv"))
    );
    Ok(())
}
