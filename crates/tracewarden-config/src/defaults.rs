//! Baseline values for a freshly started pipeline.
//!
//! # Design
//! - Keep every default in one place so the model, loader, and tests agree.
//! - Paths are relative to the process working directory and created lazily.

pub(crate) const SOURCE_NAMESPACE: &str = "default";
pub(crate) const SOURCE_CONTAINER: &str = "trace-collector";
pub(crate) const SOURCE_POD_PREFIX: &str = "open5gs-upf";
pub(crate) const REMOTE_PATH: &str = "/usr/src/app/pcap_files";
pub(crate) const CAPTURE_EXTENSION: &str = ".pcap";
pub(crate) const LOCAL_STAGING_DIR: &str = "./pcap_files";
pub(crate) const PROCESSED_DIR: &str = "./pcap_files_processed";
pub(crate) const FLOW_OUTPUT_DIR: &str = "./flow_output";
pub(crate) const STRIP_TOOL_PATH: &str = "/opt/tracewarden/bin/stripe";
pub(crate) const FLOW_TOOL_PATH: &str = "/opt/tracewarden/bin/run_cfm_direct.sh";
pub(crate) const KUBECTL_PATH: &str = "kubectl";

/// Seconds between collector ticks.
pub(crate) const POLL_INTERVAL_SECS: u64 = 10;
/// Seconds between flow-output directory scans.
pub(crate) const MONITOR_INTERVAL_SECS: u64 = 30;
/// Deadline applied to every external tool invocation.
pub(crate) const TOOL_TIMEOUT_SECS: u64 = 300;
pub(crate) const WORKER_COUNT: usize = 4;
pub(crate) const QUEUE_DEPTH: usize = 64;
/// Attack share (percent) above which an analysis raises an alert.
pub(crate) const ALERT_THRESHOLD_PCT: f64 = 30.0;

/// Model location relative to the parent of the flow-output directory.
pub(crate) const MODEL_RELATIVE_PATH: &str = "utils/decision_tree.json";
/// Detection log location relative to the parent of the flow-output directory.
pub(crate) const DETECTION_LOG_RELATIVE_PATH: &str = "logs/attack_detection.log";

pub(crate) const BIND_ADDR: [u8; 4] = [0, 0, 0, 0];
pub(crate) const HTTP_PORT: u16 = 8081;
