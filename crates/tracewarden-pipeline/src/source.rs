//! Remote capture source.
//!
//! # Design
//! - The collector only sees [`CaptureSource`]; the production source shells out to `kubectl`.
//! - Every call reads the namespace, container, and remote path from the snapshot it is given.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracewarden_config::PipelineConfig;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::tools::{ToolInvocation, ToolRunner};

/// Remote location that produces capture files.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Resolve the endpoint (pod name) that currently holds the captures.
    ///
    /// # Errors
    ///
    /// Returns an error when no endpoint can be found.
    async fn resolve_endpoint(&self, config: &PipelineConfig) -> PipelineResult<String>;

    /// List file names in the configured remote directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the listing cannot be obtained.
    async fn list_files(&self, config: &PipelineConfig, endpoint: &str)
    -> PipelineResult<Vec<String>>;

    /// Copy one remote file to `local`.
    ///
    /// # Errors
    ///
    /// Returns an error when the copy fails.
    async fn copy_file(
        &self,
        config: &PipelineConfig,
        endpoint: &str,
        name: &str,
        local: &Path,
    ) -> PipelineResult<()>;
}

/// [`CaptureSource`] that drives the `kubectl` CLI.
#[derive(Clone)]
pub struct KubectlCaptureSource {
    runner: Arc<dyn ToolRunner>,
}

const KUBECTL: &str = "kubectl";

impl KubectlCaptureSource {
    /// Build a source that runs `kubectl` through `runner`.
    #[must_use]
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    fn invocation(config: &PipelineConfig) -> ToolInvocation {
        ToolInvocation::new(KUBECTL, &config.kubectl_path, config.tool_timeout())
    }

    async fn run_checked(
        &self,
        invocation: ToolInvocation,
        operation: &'static str,
    ) -> PipelineResult<String> {
        let output = self.runner.run(&invocation).await?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(PipelineError::SourceUnavailable {
                operation,
                reason: "kubectl_failed",
                detail: Some(output.stderr.trim().to_string()).filter(|s| !s.is_empty()),
            })
        }
    }
}

#[async_trait]
impl CaptureSource for KubectlCaptureSource {
    async fn resolve_endpoint(&self, config: &PipelineConfig) -> PipelineResult<String> {
        let invocation = Self::invocation(config)
            .arg("get")
            .arg("pods")
            .arg("-n")
            .arg(&config.source_namespace)
            .arg("-o")
            .arg("name");
        let stdout = self.run_checked(invocation, "resolve_endpoint").await?;
        stdout
            .lines()
            .map(|line| line.trim().trim_start_matches("pod/"))
            .find(|name| name.starts_with(&config.source_pod_prefix))
            .map(str::to_string)
            .ok_or_else(|| PipelineError::SourceUnavailable {
                operation: "resolve_endpoint",
                reason: "no_matching_pod",
                detail: Some(format!(
                    "{}/{}*",
                    config.source_namespace, config.source_pod_prefix
                )),
            })
    }

    async fn list_files(
        &self,
        config: &PipelineConfig,
        endpoint: &str,
    ) -> PipelineResult<Vec<String>> {
        let invocation = Self::invocation(config)
            .arg("exec")
            .arg("-n")
            .arg(&config.source_namespace)
            .arg(endpoint)
            .arg("-c")
            .arg(&config.source_container)
            .arg("--")
            .arg("ls")
            .arg("-1")
            .arg(&config.remote_path);
        let stdout = self.run_checked(invocation, "list_files").await?;
        let names: Vec<String> = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        debug!(endpoint, count = names.len(), "listed remote captures");
        Ok(names)
    }

    async fn copy_file(
        &self,
        config: &PipelineConfig,
        endpoint: &str,
        name: &str,
        local: &Path,
    ) -> PipelineResult<()> {
        let remote = format!(
            "{endpoint}:{}/{name}",
            config.remote_path.trim_end_matches('/')
        );
        let invocation = Self::invocation(config)
            .arg("cp")
            .arg("-n")
            .arg(&config.source_namespace)
            .arg("-c")
            .arg(&config.source_container)
            .arg(remote)
            .arg(local);
        self.runner
            .run(&invocation)
            .await?
            .into_success(KUBECTL)
            .map(|_| ())
    }
}
