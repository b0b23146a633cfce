//! # Design
//!
//! - Constant messages; tool names, paths, and exit codes travel as context.
//! - Per-file errors are logged by the stage that produced them and never stop a periodic task.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracewarden_classifier::ClassifierError;
use tracewarden_config::ConfigError;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors produced by the trace pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Filesystem failure.
    #[error("pipeline io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Directory traversal failure.
    #[error("pipeline walkdir failure")]
    Walkdir {
        /// Operation that triggered the traversal.
        operation: &'static str,
        /// Directory being scanned.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// An external tool could not be launched.
    #[error("external tool could not be started")]
    ToolSpawn {
        /// Logical tool name.
        tool: &'static str,
        /// Program that failed to start.
        program: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// An external tool ran past its deadline and was killed.
    #[error("external tool timed out")]
    ToolTimeout {
        /// Logical tool name.
        tool: &'static str,
        /// Deadline that elapsed.
        timeout_secs: u64,
    },
    /// An external tool exited unsuccessfully.
    #[error("external tool failed")]
    ToolFailed {
        /// Logical tool name.
        tool: &'static str,
        /// Exit code when the process was not killed by a signal.
        status: Option<i32>,
        /// Captured standard error, trimmed.
        stderr: String,
    },
    /// The capture source could not be reached or produced unusable output.
    #[error("capture source unavailable")]
    SourceUnavailable {
        /// Operation that failed.
        operation: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Additional detail when available.
        detail: Option<String>,
    },
    /// Classification of a flow file failed.
    #[error("flow classification failed")]
    Classifier {
        /// Underlying classifier error.
        #[from]
        source: ClassifierError,
    },
    /// A configuration change was rejected.
    #[error("configuration rejected")]
    Config {
        /// Underlying configuration error.
        #[from]
        source: ConfigError,
    },
    /// A background task could not be joined.
    #[error("background task failed")]
    Task {
        /// Operation that spawned the task.
        operation: &'static str,
        /// Join failure detail.
        detail: String,
    },
}

impl PipelineError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Path associated with the failure, when one applies.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Io { path, .. } | Self::Walkdir { path, .. } => Some(path),
            Self::ToolSpawn { program, .. } => Some(program),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn io_error_exposes_path_and_source() {
        let err = PipelineError::io(
            "create_dir",
            "/srv/pcap_files",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.to_string(), "pipeline io failure");
        assert_eq!(
            err.path().map(std::path::Path::to_path_buf),
            Some(PathBuf::from("/srv/pcap_files"))
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn config_errors_convert() {
        let err: PipelineError = ConfigError::InvalidField {
            field: "queue_depth",
            reason: "must_be_positive",
            value: None,
        }
        .into();
        assert!(matches!(err, PipelineError::Config { .. }));
        assert!(err.path().is_none());
    }
}
