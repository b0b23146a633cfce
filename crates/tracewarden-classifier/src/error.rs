//! # Design
//!
//! - Constant messages; the artifact path and operation travel as context.
//! - Every variant aborts the analysis of one flow file only.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for classification operations.
pub type ClassifierResult<T> = Result<T, ClassifierError>;

/// Errors produced while classifying a flow file.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// IO failure while reading an artifact or appending to the log.
    #[error("classifier io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The model file is not valid JSON in the node shape.
    #[error("decision tree could not be decoded")]
    TreeDecode {
        /// Model file that failed to decode.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// The model decoded but breaks the node invariants.
    #[error("decision tree is malformed")]
    MalformedTree {
        /// Static reason for the failure.
        reason: &'static str,
        /// Depth of the offending node.
        depth: usize,
    },
    /// The flow file has no header line.
    #[error("flow file has no header")]
    MissingHeader {
        /// Flow file that was empty.
        path: PathBuf,
    },
}

impl ClassifierError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
