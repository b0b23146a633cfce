//! Typed configuration models and change payloads.
//!
//! # Design
//! - Pure data carriers shared by the pipeline controller and the API.
//! - `ConfigPatch` carries partial updates; empty strings and zero counts never overwrite.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};

/// Live configuration for the trace collection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Cluster namespace hosting the capture source.
    pub source_namespace: String,
    /// Container inside the capture pod that holds the recordings.
    pub source_container: String,
    /// Name prefix used to locate the capture-producing pod.
    pub source_pod_prefix: String,
    /// Directory inside the container that holds capture files.
    pub remote_path: String,
    /// File extension (including the dot) of capture files.
    pub capture_extension: String,
    /// Local directory that receives copied captures.
    pub local_staging_dir: PathBuf,
    /// Local directory that receives header-stripped captures.
    pub processed_dir: PathBuf,
    /// Local directory that receives flow-feature CSV files.
    pub flow_output_dir: PathBuf,
    /// Seconds between collector ticks.
    pub poll_interval_secs: u64,
    /// Seconds between flow-output directory scans.
    pub monitor_interval_secs: u64,
    /// Header-stripping tool binary.
    pub strip_tool_path: PathBuf,
    /// Flow-extraction tool binary or wrapper script.
    pub flow_tool_path: PathBuf,
    /// `kubectl` binary used to reach the capture source.
    pub kubectl_path: PathBuf,
    /// Explicit decision-tree model location; derived from `flow_output_dir` when unset.
    pub model_path: Option<PathBuf>,
    /// Explicit detection log location; derived from `flow_output_dir` when unset.
    pub detection_log_path: Option<PathBuf>,
    /// Deadline in seconds for any single external tool invocation.
    pub tool_timeout_secs: u64,
    /// Number of transform workers draining the dispatch queue.
    pub worker_count: usize,
    /// Capacity of the dispatch queue.
    pub queue_depth: usize,
    /// Attack percentage above which an analysis raises an alert.
    pub alert_threshold_pct: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_namespace: defaults::SOURCE_NAMESPACE.to_string(),
            source_container: defaults::SOURCE_CONTAINER.to_string(),
            source_pod_prefix: defaults::SOURCE_POD_PREFIX.to_string(),
            remote_path: defaults::REMOTE_PATH.to_string(),
            capture_extension: defaults::CAPTURE_EXTENSION.to_string(),
            local_staging_dir: PathBuf::from(defaults::LOCAL_STAGING_DIR),
            processed_dir: PathBuf::from(defaults::PROCESSED_DIR),
            flow_output_dir: PathBuf::from(defaults::FLOW_OUTPUT_DIR),
            poll_interval_secs: defaults::POLL_INTERVAL_SECS,
            monitor_interval_secs: defaults::MONITOR_INTERVAL_SECS,
            strip_tool_path: PathBuf::from(defaults::STRIP_TOOL_PATH),
            flow_tool_path: PathBuf::from(defaults::FLOW_TOOL_PATH),
            kubectl_path: PathBuf::from(defaults::KUBECTL_PATH),
            model_path: None,
            detection_log_path: None,
            tool_timeout_secs: defaults::TOOL_TIMEOUT_SECS,
            worker_count: defaults::WORKER_COUNT,
            queue_depth: defaults::QUEUE_DEPTH,
            alert_threshold_pct: defaults::ALERT_THRESHOLD_PCT,
        }
    }
}

impl PipelineConfig {
    /// Interval between collector ticks.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Interval between flow-output directory scans.
    #[must_use]
    pub const fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    /// Deadline applied to each external tool invocation.
    #[must_use]
    pub const fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Location of the decision-tree model, falling back to `<flow parent>/utils/decision_tree.json`.
    #[must_use]
    pub fn resolved_model_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| self.artifact_root().join(defaults::MODEL_RELATIVE_PATH))
    }

    /// Location of the detection log, falling back to `<flow parent>/logs/attack_detection.log`.
    #[must_use]
    pub fn resolved_detection_log_path(&self) -> PathBuf {
        self.detection_log_path.clone().unwrap_or_else(|| {
            self.artifact_root()
                .join(defaults::DETECTION_LOG_RELATIVE_PATH)
        })
    }

    /// Directories the pipeline writes into.
    #[must_use]
    pub fn working_directories(&self) -> [&Path; 3] {
        [
            self.local_staging_dir.as_path(),
            self.processed_dir.as_path(),
            self.flow_output_dir.as_path(),
        ]
    }

    fn artifact_root(&self) -> PathBuf {
        self.flow_output_dir
            .parent()
            .map_or_else(|| self.flow_output_dir.clone(), Path::to_path_buf)
    }

    /// Merge the non-empty, non-zero fields of `patch` into this configuration.
    ///
    /// Returns the names of the fields that changed value.
    pub fn apply_patch(&mut self, patch: ConfigPatch) -> Vec<&'static str> {
        let mut applied = Vec::new();
        merge_string(
            &mut self.source_namespace,
            patch.source_namespace,
            "source_namespace",
            &mut applied,
        );
        merge_string(
            &mut self.source_container,
            patch.source_container,
            "source_container",
            &mut applied,
        );
        merge_string(
            &mut self.source_pod_prefix,
            patch.source_pod_prefix,
            "source_pod_prefix",
            &mut applied,
        );
        merge_string(
            &mut self.remote_path,
            patch.remote_path,
            "remote_path",
            &mut applied,
        );
        merge_string(
            &mut self.capture_extension,
            patch.capture_extension,
            "capture_extension",
            &mut applied,
        );
        merge_path(
            &mut self.local_staging_dir,
            patch.local_staging_dir,
            "local_staging_dir",
            &mut applied,
        );
        merge_path(
            &mut self.processed_dir,
            patch.processed_dir,
            "processed_dir",
            &mut applied,
        );
        merge_path(
            &mut self.flow_output_dir,
            patch.flow_output_dir,
            "flow_output_dir",
            &mut applied,
        );
        merge_positive(
            &mut self.poll_interval_secs,
            patch.poll_interval_secs,
            "poll_interval_secs",
            &mut applied,
        );
        merge_positive(
            &mut self.monitor_interval_secs,
            patch.monitor_interval_secs,
            "monitor_interval_secs",
            &mut applied,
        );
        merge_path(
            &mut self.strip_tool_path,
            patch.strip_tool_path,
            "strip_tool_path",
            &mut applied,
        );
        merge_path(
            &mut self.flow_tool_path,
            patch.flow_tool_path,
            "flow_tool_path",
            &mut applied,
        );
        merge_path(
            &mut self.kubectl_path,
            patch.kubectl_path,
            "kubectl_path",
            &mut applied,
        );
        merge_optional_path(
            &mut self.model_path,
            patch.model_path,
            "model_path",
            &mut applied,
        );
        merge_optional_path(
            &mut self.detection_log_path,
            patch.detection_log_path,
            "detection_log_path",
            &mut applied,
        );
        merge_positive(
            &mut self.tool_timeout_secs,
            patch.tool_timeout_secs,
            "tool_timeout_secs",
            &mut applied,
        );
        merge_positive(
            &mut self.worker_count,
            patch.worker_count,
            "worker_count",
            &mut applied,
        );
        merge_positive(
            &mut self.queue_depth,
            patch.queue_depth,
            "queue_depth",
            &mut applied,
        );
        if let Some(threshold) = patch.alert_threshold_pct
            && threshold.is_finite()
            && threshold > 0.0
            && (threshold - self.alert_threshold_pct).abs() > f64::EPSILON
        {
            self.alert_threshold_pct = threshold;
            applied.push("alert_threshold_pct");
        }
        applied
    }
}

/// Partial configuration update. Absent, empty, or zero fields leave the live value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigPatch {
    /// Replacement namespace (`source_location` alias).
    #[serde(default, alias = "source_location", alias = "namespace")]
    pub source_namespace: Option<String>,
    /// Replacement container (`source_selector` alias).
    #[serde(default, alias = "source_selector", alias = "container_name")]
    pub source_container: Option<String>,
    /// Replacement pod prefix.
    #[serde(default)]
    pub source_pod_prefix: Option<String>,
    /// Replacement remote directory.
    #[serde(default, alias = "destination_path")]
    pub remote_path: Option<String>,
    /// Replacement capture extension.
    #[serde(default)]
    pub capture_extension: Option<String>,
    /// Replacement staging directory.
    #[serde(default, alias = "local_destination")]
    pub local_staging_dir: Option<PathBuf>,
    /// Replacement processed directory.
    #[serde(default, alias = "processed_destination")]
    pub processed_dir: Option<PathBuf>,
    /// Replacement flow-output directory.
    #[serde(default, alias = "flow_output_directory")]
    pub flow_output_dir: Option<PathBuf>,
    /// Replacement poll interval.
    #[serde(default, alias = "poll_interval_seconds", alias = "check_interval")]
    pub poll_interval_secs: Option<u64>,
    /// Replacement monitor interval.
    #[serde(default)]
    pub monitor_interval_secs: Option<u64>,
    /// Replacement strip tool path.
    #[serde(default)]
    pub strip_tool_path: Option<PathBuf>,
    /// Replacement flow tool path.
    #[serde(default)]
    pub flow_tool_path: Option<PathBuf>,
    /// Replacement `kubectl` path.
    #[serde(default)]
    pub kubectl_path: Option<PathBuf>,
    /// Explicit model path.
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// Explicit detection log path.
    #[serde(default)]
    pub detection_log_path: Option<PathBuf>,
    /// Replacement tool deadline.
    #[serde(default)]
    pub tool_timeout_secs: Option<u64>,
    /// Replacement worker count.
    #[serde(default)]
    pub worker_count: Option<usize>,
    /// Replacement queue depth.
    #[serde(default)]
    pub queue_depth: Option<usize>,
    /// Replacement alert threshold.
    #[serde(default)]
    pub alert_threshold_pct: Option<f64>,
}

impl ConfigPatch {
    /// Decode a patch from a JSON request body.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MalformedPatch`] when the body is not a valid patch document.
    pub fn from_json(body: &[u8]) -> ConfigResult<Self> {
        serde_json::from_slice(body).map_err(|source| ConfigError::MalformedPatch { source })
    }
}

/// Listener settings for the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface the API binds to.
    pub bind_addr: IpAddr,
    /// TCP port the API binds to.
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::from(defaults::BIND_ADDR),
            http_port: defaults::HTTP_PORT,
        }
    }
}

impl ServerConfig {
    /// Socket address assembled from the bind address and port.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.http_port)
    }
}

fn merge_string(
    target: &mut String,
    value: Option<String>,
    field: &'static str,
    applied: &mut Vec<&'static str>,
) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty())
        && *target != value
    {
        *target = value;
        applied.push(field);
    }
}

fn merge_path(
    target: &mut PathBuf,
    value: Option<PathBuf>,
    field: &'static str,
    applied: &mut Vec<&'static str>,
) {
    if let Some(value) = value.filter(|v| !v.as_os_str().is_empty())
        && *target != value
    {
        *target = value;
        applied.push(field);
    }
}

fn merge_optional_path(
    target: &mut Option<PathBuf>,
    value: Option<PathBuf>,
    field: &'static str,
    applied: &mut Vec<&'static str>,
) {
    if let Some(value) = value.filter(|v| !v.as_os_str().is_empty())
        && target.as_ref() != Some(&value)
    {
        *target = Some(value);
        applied.push(field);
    }
}

fn merge_positive<T>(
    target: &mut T,
    value: Option<T>,
    field: &'static str,
    applied: &mut Vec<&'static str>,
) where
    T: Copy + PartialOrd + Default,
{
    if let Some(value) = value.filter(|v| *v > T::default())
        && *target != value
    {
        *target = value;
        applied.push(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_follow_flow_output_parent() {
        let mut config = PipelineConfig {
            flow_output_dir: PathBuf::from("/srv/traces/flow_output"),
            ..PipelineConfig::default()
        };
        assert_eq!(
            config.resolved_model_path(),
            PathBuf::from("/srv/traces/utils/decision_tree.json")
        );
        assert_eq!(
            config.resolved_detection_log_path(),
            PathBuf::from("/srv/traces/logs/attack_detection.log")
        );

        config.model_path = Some(PathBuf::from("/models/tree.json"));
        assert_eq!(
            config.resolved_model_path(),
            PathBuf::from("/models/tree.json")
        );
    }

    #[test]
    fn patch_skips_empty_and_zero_fields() {
        let mut config = PipelineConfig::default();
        let baseline = config.clone();
        let applied = config.apply_patch(ConfigPatch {
            source_namespace: Some(String::new()),
            local_staging_dir: Some(PathBuf::new()),
            poll_interval_secs: Some(0),
            worker_count: Some(0),
            alert_threshold_pct: Some(f64::NAN),
            ..ConfigPatch::default()
        });
        assert!(applied.is_empty());
        assert_eq!(config, baseline);
    }

    #[test]
    fn patch_overwrites_supplied_fields_only() {
        let mut config = PipelineConfig::default();
        let applied = config.apply_patch(ConfigPatch {
            source_namespace: Some("open5gs".to_string()),
            poll_interval_secs: Some(5),
            flow_output_dir: Some(PathBuf::from("/data/flows")),
            ..ConfigPatch::default()
        });
        assert_eq!(
            applied,
            vec!["source_namespace", "flow_output_dir", "poll_interval_secs"]
        );
        assert_eq!(config.source_namespace, "open5gs");
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.flow_output_dir, PathBuf::from("/data/flows"));
        assert_eq!(config.source_container, "trace-collector");
    }

    #[test]
    fn patch_accepts_interface_aliases() -> ConfigResult<()> {
        let patch = ConfigPatch::from_json(
            br#"{"source_location":"core","source_selector":"tcpdump","poll_interval_seconds":3}"#,
        )?;
        assert_eq!(patch.source_namespace.as_deref(), Some("core"));
        assert_eq!(patch.source_container.as_deref(), Some("tcpdump"));
        assert_eq!(patch.poll_interval_secs, Some(3));
        Ok(())
    }

    #[test]
    fn patch_rejects_unknown_fields_and_bad_types() {
        assert!(matches!(
            ConfigPatch::from_json(br#"{"bogus":true}"#),
            Err(ConfigError::MalformedPatch { .. })
        ));
        assert!(matches!(
            ConfigPatch::from_json(br#"{"poll_interval_secs":-4}"#),
            Err(ConfigError::MalformedPatch { .. })
        ));
    }

    #[test]
    fn server_config_builds_socket_addr() {
        let server = ServerConfig::default();
        assert_eq!(server.socket_addr().port(), 8081);
    }
}
