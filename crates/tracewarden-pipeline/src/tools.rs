//! External tool invocation with a hard deadline.
//!
//! # Design
//! - Every invocation carries its own timeout; the child is killed when the deadline elapses.
//! - A non-zero exit is reported in [`ToolOutput`], not as an error; callers decide what it means.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// One external command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Logical tool name used in logs and metrics (`strip`, `flow`, `kubectl`).
    pub tool: &'static str,
    /// Program to execute.
    pub program: PathBuf,
    /// Arguments passed verbatim.
    pub args: Vec<OsString>,
    /// Working directory for the child, when set.
    pub working_dir: Option<PathBuf>,
    /// Deadline after which the child is killed.
    pub timeout: Duration,
}

impl ToolInvocation {
    /// Invocation of `program` with no arguments.
    #[must_use]
    pub fn new(tool: &'static str, program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tool,
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Run the child from `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Whether `tool` names a file on disk rather than a program looked up through `PATH`.
pub(crate) fn is_explicit_path(tool: &Path) -> bool {
    tool.parent()
        .is_some_and(|parent| !parent.as_os_str().is_empty())
}

/// Program to spawn for a configured tool path.
///
/// Explicit paths are made absolute so they survive a changed working directory;
/// bare names are passed through for the `PATH` lookup.
pub(crate) fn resolve_program(tool: &Path) -> PipelineResult<PathBuf> {
    if is_explicit_path(tool) {
        std::path::absolute(tool).map_err(|source| PipelineError::io("absolute_path", tool, source))
    } else {
        Ok(tool.to_path_buf())
    }
}

/// Captured result of a finished tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, absent when the process was terminated by a signal.
    pub status: Option<i32>,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl ToolOutput {
    /// Convert an unsuccessful exit into [`PipelineError::ToolFailed`].
    ///
    /// # Errors
    ///
    /// Returns an error when the tool exited unsuccessfully.
    pub fn into_success(self, tool: &'static str) -> PipelineResult<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(PipelineError::ToolFailed {
                tool,
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs external tools.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `invocation` to completion or until its deadline.
    ///
    /// # Errors
    ///
    /// Returns an error when the process cannot be started or exceeds its deadline.
    async fn run(&self, invocation: &ToolInvocation) -> PipelineResult<ToolOutput>;
}

/// [`ToolRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessToolRunner;

#[async_trait]
impl ToolRunner for ProcessToolRunner {
    async fn run(&self, invocation: &ToolInvocation) -> PipelineResult<ToolOutput> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }
        debug!(
            tool = invocation.tool,
            program = %invocation.program.display(),
            args = ?invocation.args,
            "running external tool"
        );

        let child = command.spawn().map_err(|source| PipelineError::ToolSpawn {
            tool: invocation.tool,
            program: invocation.program.clone(),
            source,
        })?;
        let output = match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await
        {
            Ok(result) => result.map_err(|source| PipelineError::ToolSpawn {
                tool: invocation.tool,
                program: invocation.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(PipelineError::ToolTimeout {
                    tool: invocation.tool,
                    timeout_secs: invocation.timeout.as_secs(),
                });
            }
        };

        Ok(ToolOutput {
            status: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
