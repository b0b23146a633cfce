//! Invariant checks and parsing helpers for pipeline configuration.

use std::net::IpAddr;
use std::path::PathBuf;

use crate::error::{ConfigError, ConfigResult};
use crate::model::PipelineConfig;

/// Verify that a merged configuration can drive a pipeline run.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] naming the first field that breaks an invariant.
pub fn validate_config(config: &PipelineConfig) -> ConfigResult<()> {
    ensure_non_empty("source_namespace", &config.source_namespace)?;
    ensure_non_empty("source_container", &config.source_container)?;
    ensure_non_empty("remote_path", &config.remote_path)?;
    if !config.capture_extension.starts_with('.') || config.capture_extension.len() < 2 {
        return Err(ConfigError::invalid(
            "capture_extension",
            "must_start_with_dot",
            &config.capture_extension,
        ));
    }
    ensure_path("local_staging_dir", &config.local_staging_dir)?;
    ensure_path("processed_dir", &config.processed_dir)?;
    ensure_path("flow_output_dir", &config.flow_output_dir)?;
    ensure_path("strip_tool_path", &config.strip_tool_path)?;
    ensure_path("flow_tool_path", &config.flow_tool_path)?;
    ensure_path("kubectl_path", &config.kubectl_path)?;
    ensure_positive("poll_interval_secs", config.poll_interval_secs)?;
    ensure_positive("monitor_interval_secs", config.monitor_interval_secs)?;
    ensure_positive("tool_timeout_secs", config.tool_timeout_secs)?;
    ensure_positive("worker_count", config.worker_count as u64)?;
    ensure_positive("queue_depth", config.queue_depth as u64)?;
    if !config.alert_threshold_pct.is_finite()
        || config.alert_threshold_pct <= 0.0
        || config.alert_threshold_pct > 100.0
    {
        return Err(ConfigError::invalid(
            "alert_threshold_pct",
            "must_be_percentage",
            config.alert_threshold_pct,
        ));
    }
    Ok(())
}

fn ensure_non_empty(field: &'static str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidField {
            field,
            reason: "must_not_be_empty",
            value: None,
        });
    }
    Ok(())
}

fn ensure_path(field: &'static str, value: &std::path::Path) -> ConfigResult<()> {
    if value.as_os_str().is_empty() {
        return Err(ConfigError::InvalidField {
            field,
            reason: "must_not_be_empty",
            value: None,
        });
    }
    Ok(())
}

const fn ensure_positive(field: &'static str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::InvalidField {
            field,
            reason: "must_be_positive",
            value: None,
        });
    }
    Ok(())
}

/// Parse a strictly positive integer.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the value is not a positive integer.
pub fn parse_positive_u64(field: &'static str, raw: &str) -> ConfigResult<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::invalid(field, "must_be_positive", raw)),
        Ok(value) => Ok(value),
        Err(_) => Err(ConfigError::invalid(field, "not_an_integer", raw)),
    }
}

/// Parse a strictly positive count.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the value is not a positive integer.
pub fn parse_positive_usize(field: &'static str, raw: &str) -> ConfigResult<usize> {
    let value = parse_positive_u64(field, raw)?;
    usize::try_from(value).map_err(|_| ConfigError::invalid(field, "out_of_range", raw))
}

/// Parse a finite, positive percentage.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the value is not a percentage in `(0, 100]`.
pub fn parse_percentage(field: &'static str, raw: &str) -> ConfigResult<f64> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| ConfigError::invalid(field, "not_a_number", raw))?;
    if !value.is_finite() || value <= 0.0 || value > 100.0 {
        return Err(ConfigError::invalid(field, "must_be_percentage", raw));
    }
    Ok(value)
}

/// Parse a TCP port.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the value is not a non-zero port.
pub fn parse_port(field: &'static str, raw: &str) -> ConfigResult<u16> {
    match raw.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(ConfigError::invalid(field, "invalid_port", raw)),
        Ok(port) => Ok(port),
    }
}

/// Parse an IP address.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the value is not an IP address.
pub fn parse_ip(field: &'static str, raw: &str) -> ConfigResult<IpAddr> {
    raw.trim()
        .parse::<IpAddr>()
        .map_err(|_| ConfigError::invalid(field, "invalid_ip", raw))
}

/// Parse a non-empty path.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the value is blank.
pub fn parse_path(field: &'static str, raw: &str) -> ConfigResult<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidField {
            field,
            reason: "must_not_be_empty",
            value: None,
        });
    }
    Ok(PathBuf::from(trimmed))
}
