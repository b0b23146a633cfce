//! Temporary directory layout mirroring a pipeline deployment.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

/// Temp directory holding staging, processed, flow, model, and log locations.
pub struct PipelineWorkspace {
    root: TempDir,
}

impl PipelineWorkspace {
    /// Create an empty workspace; pipeline directories are created lazily by the code under test.
    ///
    /// # Errors
    ///
    /// Returns an error when the temp directory cannot be created.
    pub fn new() -> Result<Self> {
        let root = tempfile::tempdir().context("failed to create temp workspace")?;
        Ok(Self { root })
    }

    /// Root of the workspace.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Staging directory for copied captures.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.root().join("pcap_files")
    }

    /// Directory for header-stripped captures.
    #[must_use]
    pub fn processed_dir(&self) -> PathBuf {
        self.root().join("pcap_files_processed")
    }

    /// Directory for flow CSV files.
    #[must_use]
    pub fn flow_dir(&self) -> PathBuf {
        self.root().join("flow_output")
    }

    /// Default model location derived from the flow directory.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.root().join("utils").join("decision_tree.json")
    }

    /// Default detection log location derived from the flow directory.
    #[must_use]
    pub fn detection_log_path(&self) -> PathBuf {
        self.root().join("logs").join("attack_detection.log")
    }

    /// Write a capture file into the staging directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be written.
    pub fn stage_capture(&self, name: &str, body: &[u8]) -> Result<PathBuf> {
        let dir = self.staging_dir();
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(name);
        fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Read the detection log, returning an empty list when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error when the log exists but cannot be read.
    pub fn detection_log_lines(&self) -> Result<Vec<String>> {
        let path = self.detection_log_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let body = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(body.lines().map(str::to_string).collect())
    }
}
