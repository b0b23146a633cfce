//! Environment overlay for pipeline and listener configuration.
//!
//! # Design
//! - Start from defaults, then apply `TRACEWARDEN_*` variables that are present and non-blank.
//! - `load_with` takes a lookup closure so tests never touch the process environment.

use tracing::debug;

use crate::error::ConfigResult;
use crate::model::{PipelineConfig, ServerConfig};
use crate::validate::{
    parse_ip, parse_path, parse_percentage, parse_port, parse_positive_u64,
    parse_positive_usize, validate_config,
};

const ENV_PREFIX: &str = "TRACEWARDEN_";

/// Build the pipeline configuration from defaults and the process environment.
///
/// # Errors
///
/// Returns an error when a variable fails to parse or the merged result is invalid.
pub fn load_from_env() -> ConfigResult<PipelineConfig> {
    load_with(|key| std::env::var(key).ok())
}

/// Build the pipeline configuration from defaults and an arbitrary variable lookup.
///
/// Keys passed to `lookup` are fully prefixed (for example `TRACEWARDEN_POLL_INTERVAL_SECS`).
///
/// # Errors
///
/// Returns an error when a variable fails to parse or the merged result is invalid.
pub fn load_with<F>(lookup: F) -> ConfigResult<PipelineConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| {
        lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty())
    };
    let mut config = PipelineConfig::default();

    if let Some(value) = get("SOURCE_NAMESPACE") {
        config.source_namespace = value.trim().to_string();
    }
    if let Some(value) = get("SOURCE_CONTAINER") {
        config.source_container = value.trim().to_string();
    }
    if let Some(value) = get("SOURCE_POD_PREFIX") {
        config.source_pod_prefix = value.trim().to_string();
    }
    if let Some(value) = get("REMOTE_PATH") {
        config.remote_path = value.trim().to_string();
    }
    if let Some(value) = get("CAPTURE_EXTENSION") {
        config.capture_extension = value.trim().to_string();
    }
    if let Some(value) = get("LOCAL_STAGING_DIR") {
        config.local_staging_dir = parse_path("local_staging_dir", &value)?;
    }
    if let Some(value) = get("PROCESSED_DIR") {
        config.processed_dir = parse_path("processed_dir", &value)?;
    }
    if let Some(value) = get("FLOW_OUTPUT_DIR") {
        config.flow_output_dir = parse_path("flow_output_dir", &value)?;
    }
    if let Some(value) = get("POLL_INTERVAL_SECS") {
        config.poll_interval_secs = parse_positive_u64("poll_interval_secs", &value)?;
    }
    if let Some(value) = get("MONITOR_INTERVAL_SECS") {
        config.monitor_interval_secs = parse_positive_u64("monitor_interval_secs", &value)?;
    }
    if let Some(value) = get("STRIP_TOOL_PATH") {
        config.strip_tool_path = parse_path("strip_tool_path", &value)?;
    }
    if let Some(value) = get("FLOW_TOOL_PATH") {
        config.flow_tool_path = parse_path("flow_tool_path", &value)?;
    }
    if let Some(value) = get("KUBECTL_PATH") {
        config.kubectl_path = parse_path("kubectl_path", &value)?;
    }
    if let Some(value) = get("MODEL_PATH") {
        config.model_path = Some(parse_path("model_path", &value)?);
    }
    if let Some(value) = get("DETECTION_LOG_PATH") {
        config.detection_log_path = Some(parse_path("detection_log_path", &value)?);
    }
    if let Some(value) = get("TOOL_TIMEOUT_SECS") {
        config.tool_timeout_secs = parse_positive_u64("tool_timeout_secs", &value)?;
    }
    if let Some(value) = get("WORKER_COUNT") {
        config.worker_count = parse_positive_usize("worker_count", &value)?;
    }
    if let Some(value) = get("QUEUE_DEPTH") {
        config.queue_depth = parse_positive_usize("queue_depth", &value)?;
    }
    if let Some(value) = get("ALERT_THRESHOLD_PCT") {
        config.alert_threshold_pct = parse_percentage("alert_threshold_pct", &value)?;
    }

    validate_config(&config)?;
    debug!(
        namespace = %config.source_namespace,
        container = %config.source_container,
        poll_interval_secs = config.poll_interval_secs,
        "pipeline configuration loaded"
    );
    Ok(config)
}

/// Build the listener configuration from defaults and the process environment.
///
/// # Errors
///
/// Returns an error when the bind address or port fails to parse.
pub fn load_server_from_env() -> ConfigResult<ServerConfig> {
    load_server_with(|key| std::env::var(key).ok())
}

/// Build the listener configuration from defaults and an arbitrary variable lookup.
///
/// # Errors
///
/// Returns an error when the bind address or port fails to parse.
pub fn load_server_with<F>(lookup: F) -> ConfigResult<ServerConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| {
        lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty())
    };
    let mut server = ServerConfig::default();
    if let Some(value) = get("BIND_ADDR") {
        server.bind_addr = parse_ip("bind_addr", &value)?;
    }
    if let Some(value) = get("HTTP_PORT") {
        server.http_port = parse_port("http_port", &value)?;
    }
    Ok(server)
}
