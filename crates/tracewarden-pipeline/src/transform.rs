//! Per-capture transformation: strip tunnel headers, extract flows, classify.
//!
//! # Design
//! - Each step is skipped when its output already exists, so re-dispatching a capture is cheap.
//! - A strip failure aborts the capture unless the tool still wrote a non-empty file.
//! - An extraction failure degrades to a header-only placeholder when the flow directory has no CSV at all.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracewarden_config::PipelineConfig;
use tracewarden_events::Event;
use tracing::{debug, info, warn};

use crate::analysis::AnalysisStage;
use crate::context::PipelineContext;
use crate::error::{PipelineError, PipelineResult};
use crate::tools::{ToolInvocation, ToolOutput, ToolRunner, resolve_program};

/// Prefix of header-stripped capture names.
pub const STRIPPED_PREFIX: &str = "gtp_removed_";
/// Suffix the flow tool appends to its input name.
pub const FLOW_SUFFIX: &str = "_Flow.csv";
/// Suffix of synthesized placeholder flow files.
pub const PLACEHOLDER_SUFFIX: &str = "_Flow_default.csv";

const STRIP_TOOL: &str = "strip";
const FLOW_TOOL: &str = "flow";

/// Column header written into placeholder flow files.
pub const FLOW_HEADER: &str = "Flow ID,Src IP,Src Port,Dst IP,Dst Port,Protocol,Timestamp,Flow Duration,Tot Fwd Pkts,Tot Bwd Pkts,TotLen Fwd Pkts,TotLen Bwd Pkts,Fwd Pkt Len Max,Fwd Pkt Len Min,Fwd Pkt Len Mean,Fwd Pkt Len Std,Bwd Pkt Len Max,Bwd Pkt Len Min,Bwd Pkt Len Mean,Bwd Pkt Len Std,Flow Byts/s,Flow Pkts/s,Flow IAT Mean,Flow IAT Std,Flow IAT Max,Flow IAT Min,Fwd IAT Tot,Fwd IAT Mean,Fwd IAT Std,Fwd IAT Max,Fwd IAT Min,Bwd IAT Tot,Bwd IAT Mean,Bwd IAT Std,Bwd IAT Max,Bwd IAT Min,Fwd PSH Flags,Bwd PSH Flags,Fwd URG Flags,Bwd URG Flags,Fwd Header Len,Bwd Header Len,Fwd Pkts/s,Bwd Pkts/s,Pkt Len Min,Pkt Len Max,Pkt Len Mean,Pkt Len Std,Pkt Len Var,FIN Flag Cnt,SYN Flag Cnt,RST Flag Cnt,PSH Flag Cnt,ACK Flag Cnt,URG Flag Cnt,CWE Flag Count,ECE Flag Cnt,Down/Up Ratio,Pkt Size Avg,Fwd Seg Size Avg,Bwd Seg Size Avg,Fwd Byts/b Avg,Fwd Pkts/b Avg,Fwd Blk Rate Avg,Bwd Byts/b Avg,Bwd Pkts/b Avg,Bwd Blk Rate Avg,Subflow Fwd Pkts,Subflow Fwd Byts,Subflow Bwd Pkts,Subflow Bwd Byts,Init Fwd Win Byts,Init Bwd Win Byts,Fwd Act Data Pkts,Fwd Seg Size Min,Active Mean,Active Std,Active Max,Active Min,Idle Mean,Idle Std,Idle Max,Idle Min";

/// How a capture left the transform stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    /// The expected flow file exists and was handed to the classifier.
    Analyzed {
        /// Flow file that was analyzed.
        flow_file: PathBuf,
    },
    /// Extraction produced nothing and a header-only placeholder was written.
    Placeholder {
        /// Placeholder that was written.
        path: PathBuf,
    },
    /// Extraction produced no expected file, but other CSV files exist.
    FlowFileMissing {
        /// Flow file that was expected.
        expected: PathBuf,
    },
}

/// Strip → extract → analyze for one capture.
#[derive(Clone)]
pub struct FileTransformStage {
    ctx: PipelineContext,
    runner: Arc<dyn ToolRunner>,
    analysis: AnalysisStage,
}

impl FileTransformStage {
    /// Build the stage.
    #[must_use]
    pub fn new(ctx: PipelineContext, runner: Arc<dyn ToolRunner>, analysis: AnalysisStage) -> Self {
        Self {
            ctx,
            runner,
            analysis,
        }
    }

    /// Transform `capture`, logging and publishing the result instead of returning errors.
    pub async fn run(&self, config: &PipelineConfig, capture: &Path) -> Option<TransformOutcome> {
        let capture_display = capture.display().to_string();
        match self.transform(config, capture).await {
            Ok(outcome) => {
                match &outcome {
                    TransformOutcome::Analyzed { flow_file } => {
                        info!(capture = %capture_display, flow_file = %flow_file.display(), "capture transformed");
                        self.ctx.publish(Event::TransformCompleted {
                            capture: capture_display,
                            flow_file: flow_file.display().to_string(),
                            placeholder: false,
                        });
                    }
                    TransformOutcome::Placeholder { path } => {
                        warn!(capture = %capture_display, placeholder = %path.display(), "flow extraction produced no output; wrote placeholder");
                        self.ctx.publish(Event::TransformCompleted {
                            capture: capture_display,
                            flow_file: path.display().to_string(),
                            placeholder: true,
                        });
                    }
                    TransformOutcome::FlowFileMissing { expected } => {
                        warn!(capture = %capture_display, expected = %expected.display(), "expected flow file not produced");
                        self.ctx.publish(Event::TransformFailed {
                            capture: capture_display,
                            message: "expected flow file not produced".to_string(),
                        });
                    }
                }
                Some(outcome)
            }
            Err(err) => {
                warn!(capture = %capture_display, error = ?err, "capture transform aborted");
                self.ctx.publish(Event::TransformFailed {
                    capture: capture_display,
                    message: err.to_string(),
                });
                None
            }
        }
    }

    /// Transform `capture` and return the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error when the strip step fails without output or a
    /// required directory cannot be prepared.
    pub async fn transform(
        &self,
        config: &PipelineConfig,
        capture: &Path,
    ) -> PipelineResult<TransformOutcome> {
        let stripped = self.strip(config, capture).await?;
        self.extract_and_analyze(config, &stripped).await
    }

    async fn strip(&self, config: &PipelineConfig, capture: &Path) -> PipelineResult<PathBuf> {
        let name = file_name(capture)?;
        let stripped = config
            .processed_dir
            .join(format!("{STRIPPED_PREFIX}{name}"));
        if exists(&stripped).await {
            debug!(path = %stripped.display(), "stripped capture exists; skipping strip");
            return Ok(stripped);
        }

        fs::create_dir_all(&config.processed_dir)
            .await
            .map_err(|source| PipelineError::io("create_processed_dir", &config.processed_dir, source))?;
        fs::File::create(&stripped)
            .await
            .map_err(|source| PipelineError::io("create_stripped_placeholder", &stripped, source))?;

        let mut invocation = ToolInvocation::new(
            STRIP_TOOL,
            resolve_program(&config.strip_tool_path)?,
            config.tool_timeout(),
        )
        .arg("-r")
        .arg(absolute(capture)?)
        .arg("-w")
        .arg(absolute(&stripped)?);
        if let Some(dir) = tool_dir(&config.strip_tool_path)? {
            invocation = invocation.current_dir(dir);
        }

        let result = self.invoke(&invocation).await;
        if let Err(err) = result {
            let written = fs::metadata(&stripped).await.map_or(0, |meta| meta.len());
            if written > 0 {
                warn!(capture = %capture.display(), bytes = written, error = ?err, "strip tool failed but produced output; continuing");
            } else {
                if let Err(remove) = fs::remove_file(&stripped).await {
                    debug!(path = %stripped.display(), error = %remove, "failed to remove empty stripped placeholder");
                }
                return Err(err);
            }
        }
        Ok(stripped)
    }

    async fn extract_and_analyze(
        &self,
        config: &PipelineConfig,
        stripped: &Path,
    ) -> PipelineResult<TransformOutcome> {
        let stripped_name = file_name(stripped)?;
        let flow_dir = &config.flow_output_dir;
        let expected = flow_dir.join(format!("{stripped_name}{FLOW_SUFFIX}"));
        if exists(&expected).await {
            debug!(path = %expected.display(), "flow file exists; skipping extraction");
            self.analyze(config, &expected).await;
            return Ok(TransformOutcome::Analyzed {
                flow_file: expected,
            });
        }

        fs::create_dir_all(flow_dir)
            .await
            .map_err(|source| PipelineError::io("create_flow_dir", flow_dir, source))?;
        let invocation = ToolInvocation::new(
            FLOW_TOOL,
            resolve_program(&config.flow_tool_path)?,
            config.tool_timeout(),
        )
            .arg(absolute(stripped)?)
            .arg(absolute(flow_dir)?);
        if let Err(err) = self.invoke(&invocation).await {
            warn!(input = %stripped.display(), error = ?err, "flow extraction failed");
        }

        if !exists(&expected).await {
            if contains_csv(flow_dir).await? {
                return Ok(TransformOutcome::FlowFileMissing { expected });
            }
            let placeholder = flow_dir.join(format!("{stripped_name}{PLACEHOLDER_SUFFIX}"));
            fs::write(&placeholder, format!("{FLOW_HEADER}\n"))
                .await
                .map_err(|source| PipelineError::io("write_placeholder", &placeholder, source))?;
            return Ok(TransformOutcome::Placeholder { path: placeholder });
        }

        self.analyze(config, &expected).await;
        Ok(TransformOutcome::Analyzed {
            flow_file: expected,
        })
    }

    async fn analyze(&self, config: &PipelineConfig, flow_file: &Path) {
        // Failures are already logged and reflected in health by the analysis stage.
        let _ = self.analysis.analyze(config, flow_file).await;
    }

    async fn invoke(&self, invocation: &ToolInvocation) -> PipelineResult<ToolOutput> {
        let result = self
            .runner
            .run(invocation)
            .await
            .and_then(|output| output.into_success(invocation.tool));
        let status = match &result {
            Ok(_) => "success",
            Err(PipelineError::ToolTimeout { .. }) => "timeout",
            Err(PipelineError::ToolSpawn { .. }) => "spawn_error",
            Err(_) => "failure",
        };
        self.ctx.metrics().inc_tool_invocation(invocation.tool, status);
        result
    }
}

fn file_name(path: &Path) -> PipelineResult<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            PipelineError::io(
                "file_name",
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })
}

fn absolute(path: &Path) -> PipelineResult<PathBuf> {
    std::path::absolute(path).map_err(|source| PipelineError::io("absolute_path", path, source))
}

/// Directory a tool should run from; bare program names are resolved through `PATH` instead.
fn tool_dir(tool: &Path) -> PipelineResult<Option<PathBuf>> {
    match tool.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => absolute(parent).map(Some),
        _ => Ok(None),
    }
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

async fn contains_csv(dir: &Path) -> PipelineResult<bool> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|source| PipelineError::io("scan_flow_dir", dir, source))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| PipelineError::io("scan_flow_dir", dir, source))?
    {
        if entry.path().extension().is_some_and(|ext| ext == "csv") {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tracewarden_events::EventBus;
    use tracewarden_telemetry::Metrics;
    use tracewarden_test_support::fixtures::{SAMPLE_HEADER, sample_tree, write_tree};
    use tracewarden_test_support::workspace::PipelineWorkspace;

    /// Fake tools: strip copies its input, flow writes a two-row CSV, each unless disabled.
    struct FakeTools {
        strip_ok: bool,
        strip_writes: bool,
        flow_writes: bool,
        calls: Mutex<Vec<ToolInvocation>>,
    }

    impl FakeTools {
        fn new(strip_ok: bool, strip_writes: bool, flow_writes: bool) -> Arc<Self> {
            Arc::new(Self {
                strip_ok,
                strip_writes,
                flow_writes,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn invocations(&self) -> Vec<ToolInvocation> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        fn calls(&self) -> Vec<&'static str> {
            self.invocations().iter().map(|call| call.tool).collect()
        }
    }

    #[async_trait]
    impl ToolRunner for FakeTools {
        async fn run(&self, invocation: &ToolInvocation) -> PipelineResult<ToolOutput> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(invocation.clone());
            }
            let success = match invocation.tool {
                STRIP_TOOL => {
                    if self.strip_writes {
                        std::fs::copy(&invocation.args[1], &invocation.args[3])
                            .map_err(|source| PipelineError::io("fake_strip", "", source))?;
                    }
                    self.strip_ok
                }
                _ => {
                    if self.flow_writes {
                        let input = PathBuf::from(&invocation.args[0]);
                        let name = input.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                        let out = PathBuf::from(&invocation.args[1]).join(format!("{name}{FLOW_SUFFIX}"));
                        std::fs::write(out, format!("{SAMPLE_HEADER}\na,b,1,10\na,b,1,1\n"))
                            .map_err(|source| PipelineError::io("fake_flow", "", source))?;
                    }
                    true
                }
            };
            Ok(ToolOutput {
                status: Some(i32::from(!success)),
                success,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    struct Harness {
        workspace: PipelineWorkspace,
        config: PipelineConfig,
        ctx: PipelineContext,
    }

    fn harness() -> anyhow::Result<Harness> {
        let workspace = PipelineWorkspace::new()?;
        write_tree(&workspace.model_path(), &sample_tree())?;
        let config = PipelineConfig {
            local_staging_dir: workspace.staging_dir(),
            processed_dir: workspace.processed_dir(),
            flow_output_dir: workspace.flow_dir(),
            strip_tool_path: PathBuf::from("stripe"),
            flow_tool_path: PathBuf::from("flow.sh"),
            ..PipelineConfig::default()
        };
        let ctx = PipelineContext::new(EventBus::with_capacity(64), Metrics::new()?);
        Ok(Harness {
            workspace,
            config,
            ctx,
        })
    }

    fn stage(h: &Harness, tools: Arc<FakeTools>) -> FileTransformStage {
        FileTransformStage::new(h.ctx.clone(), tools, AnalysisStage::new(h.ctx.clone()))
    }

    #[tokio::test]
    async fn full_chain_analyzes_expected_flow_file() -> anyhow::Result<()> {
        let h = harness()?;
        let capture = h.workspace.stage_capture("cap1.pcap", b"raw")?;
        let tools = FakeTools::new(true, true, true);
        let outcome = stage(&h, tools.clone()).transform(&h.config, &capture).await?;

        let expected = h.workspace.flow_dir().join("gtp_removed_cap1.pcap_Flow.csv");
        assert_eq!(outcome, TransformOutcome::Analyzed { flow_file: expected });
        assert_eq!(tools.calls(), vec![STRIP_TOOL, FLOW_TOOL]);
        assert!(h.workspace.processed_dir().join("gtp_removed_cap1.pcap").exists());
        assert_eq!(h.workspace.detection_log_lines()?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn existing_outputs_skip_both_tools() -> anyhow::Result<()> {
        let h = harness()?;
        let capture = h.workspace.stage_capture("cap2.pcap", b"raw")?;
        std::fs::create_dir_all(h.workspace.processed_dir())?;
        std::fs::write(h.workspace.processed_dir().join("gtp_removed_cap2.pcap"), b"x")?;
        tracewarden_test_support::fixtures::write_sample_flows(
            &h.workspace.flow_dir(),
            "gtp_removed_cap2.pcap_Flow.csv",
        )?;

        let tools = FakeTools::new(true, true, true);
        let outcome = stage(&h, tools.clone()).transform(&h.config, &capture).await?;
        assert!(matches!(outcome, TransformOutcome::Analyzed { .. }));
        assert!(tools.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn strip_failure_without_output_aborts_and_cleans_up() -> anyhow::Result<()> {
        let h = harness()?;
        let capture = h.workspace.stage_capture("cap3.pcap", b"raw")?;
        let tools = FakeTools::new(false, false, true);
        let result = stage(&h, tools.clone()).transform(&h.config, &capture).await;
        assert!(matches!(result, Err(PipelineError::ToolFailed { tool: STRIP_TOOL, .. })));
        assert_eq!(tools.calls(), vec![STRIP_TOOL]);
        assert!(!h.workspace.processed_dir().join("gtp_removed_cap3.pcap").exists());
        Ok(())
    }

    #[tokio::test]
    async fn strip_failure_with_output_proceeds() -> anyhow::Result<()> {
        let h = harness()?;
        let capture = h.workspace.stage_capture("cap4.pcap", b"raw")?;
        let tools = FakeTools::new(false, true, true);
        let outcome = stage(&h, tools.clone()).transform(&h.config, &capture).await?;
        assert!(matches!(outcome, TransformOutcome::Analyzed { .. }));
        assert_eq!(tools.calls(), vec![STRIP_TOOL, FLOW_TOOL]);
        Ok(())
    }

    #[tokio::test]
    async fn empty_flow_dir_gets_header_only_placeholder() -> anyhow::Result<()> {
        let h = harness()?;
        let capture = h.workspace.stage_capture("cap5.pcap", b"raw")?;
        let outcome = stage(&h, FakeTools::new(true, true, false))
            .transform(&h.config, &capture)
            .await?;
        let placeholder = h
            .workspace
            .flow_dir()
            .join("gtp_removed_cap5.pcap_Flow_default.csv");
        assert_eq!(
            outcome,
            TransformOutcome::Placeholder {
                path: placeholder.clone()
            }
        );
        let body = std::fs::read_to_string(&placeholder)?;
        assert_eq!(body.lines().count(), 1);
        assert!(body.starts_with("Flow ID,Src IP"));
        assert!(h.workspace.detection_log_lines()?.is_empty());

        let second = h.workspace.stage_capture("cap6.pcap", b"raw")?;
        let outcome = stage(&h, FakeTools::new(true, true, false))
            .transform(&h.config, &second)
            .await?;
        assert!(matches!(outcome, TransformOutcome::FlowFileMissing { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn run_publishes_failure_events() -> anyhow::Result<()> {
        let h = harness()?;
        let capture = h.workspace.stage_capture("cap7.pcap", b"raw")?;
        let outcome = stage(&h, FakeTools::new(false, false, false))
            .run(&h.config, &capture)
            .await;
        assert!(outcome.is_none());
        assert!(
            h.ctx
                .events()
                .backlog_since(0)
                .iter()
                .any(|env| matches!(env.event, Event::TransformFailed { .. }))
        );
        Ok(())
    }

    #[tokio::test]
    async fn bare_tool_names_are_left_for_path_lookup() -> anyhow::Result<()> {
        let h = harness()?;
        let capture = h.workspace.stage_capture("cap8.pcap", b"raw")?;
        let tools = FakeTools::new(true, true, true);
        stage(&h, tools.clone()).transform(&h.config, &capture).await?;

        let calls = tools.invocations();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program, PathBuf::from("stripe"));
        assert_eq!(calls[0].working_dir, None);
        assert_eq!(calls[1].program, PathBuf::from("flow.sh"));
        Ok(())
    }

    #[tokio::test]
    async fn explicit_strip_path_runs_from_its_directory() -> anyhow::Result<()> {
        let mut h = harness()?;
        let bin = h.workspace.root().join("bin");
        h.config.strip_tool_path = bin.join("stripe");
        let capture = h.workspace.stage_capture("cap9.pcap", b"raw")?;
        let tools = FakeTools::new(true, true, true);
        stage(&h, tools.clone()).transform(&h.config, &capture).await?;

        let strip = &tools.invocations()[0];
        assert_eq!(strip.program, bin.join("stripe"));
        assert_eq!(strip.working_dir, Some(bin));
        Ok(())
    }
}
