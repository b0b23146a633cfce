//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Counters cover the collector, the external tools, and classification.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared by the pipeline and the API.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    events_emitted_total: IntCounterVec,
    collector_ticks_total: IntCounterVec,
    tool_invocations_total: IntCounterVec,
    captures_copied_total: IntCounter,
    capture_copy_failures_total: IntCounter,
    flow_files_analyzed_total: IntCounter,
    flows_classified_total: IntCounter,
    attack_flows_total: IntCounter,
    attack_alerts_total: IntCounter,
    dispatch_queue_depth: IntGauge,
    pipeline_running: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Captures waiting in the dispatch queue.
    pub dispatch_queue_depth: i64,
    /// Whether a pipeline run is active (0 or 1).
    pub pipeline_running: i64,
    /// Captures copied from the remote source.
    pub captures_copied_total: u64,
    /// Copy attempts that failed.
    pub capture_copy_failures_total: u64,
    /// Flow files classified.
    pub flow_files_analyzed_total: u64,
    /// Individual flows classified.
    pub flows_classified_total: u64,
    /// Individual flows classified as an attack.
    pub attack_flows_total: u64,
    /// Analyses that crossed the alert threshold.
    pub attack_alerts_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = counter_vec(
            "http_requests_total",
            "Total HTTP requests received",
            &["route", "code"],
        )?;
        let events_emitted_total = counter_vec(
            "events_emitted_total",
            "Pipeline events emitted by type",
            &["type"],
        )?;
        let collector_ticks_total = counter_vec(
            "collector_ticks_total",
            "Collector ticks by outcome",
            &["outcome"],
        )?;
        let tool_invocations_total = counter_vec(
            "tool_invocations_total",
            "External tool invocations by tool and status",
            &["tool", "status"],
        )?;
        let captures_copied_total = counter(
            "captures_copied_total",
            "Captures copied from the remote source",
        )?;
        let capture_copy_failures_total = counter(
            "capture_copy_failures_total",
            "Capture copies that failed",
        )?;
        let flow_files_analyzed_total =
            counter("flow_files_analyzed_total", "Flow files classified")?;
        let flows_classified_total = counter("flows_classified_total", "Flows classified")?;
        let attack_flows_total =
            counter("attack_flows_total", "Flows classified as an attack class")?;
        let attack_alerts_total = counter(
            "attack_alerts_total",
            "Analyses whose attack share exceeded the alert threshold",
        )?;
        let dispatch_queue_depth = gauge(
            "dispatch_queue_depth",
            "Captures waiting for a transform worker",
        )?;
        let pipeline_running = gauge("pipeline_running", "Whether a pipeline run is active")?;

        register(&registry, "http_requests_total", &http_requests_total)?;
        register(&registry, "events_emitted_total", &events_emitted_total)?;
        register(&registry, "collector_ticks_total", &collector_ticks_total)?;
        register(&registry, "tool_invocations_total", &tool_invocations_total)?;
        register(&registry, "captures_copied_total", &captures_copied_total)?;
        register(
            &registry,
            "capture_copy_failures_total",
            &capture_copy_failures_total,
        )?;
        register(
            &registry,
            "flow_files_analyzed_total",
            &flow_files_analyzed_total,
        )?;
        register(&registry, "flows_classified_total", &flows_classified_total)?;
        register(&registry, "attack_flows_total", &attack_flows_total)?;
        register(&registry, "attack_alerts_total", &attack_alerts_total)?;
        register(&registry, "dispatch_queue_depth", &dispatch_queue_depth)?;
        register(&registry, "pipeline_running", &pipeline_running)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                events_emitted_total,
                collector_ticks_total,
                tool_invocations_total,
                captures_copied_total,
                capture_copy_failures_total,
                flow_files_analyzed_total,
                flows_classified_total,
                attack_flows_total,
                attack_alerts_total,
                dispatch_queue_depth,
                pipeline_running,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Increment the emitted event counter for the specific event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Record the outcome of one collector tick (`ok`, `source_unavailable`, ...).
    pub fn inc_collector_tick(&self, outcome: &str) {
        self.inner
            .collector_ticks_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record one external tool invocation.
    pub fn inc_tool_invocation(&self, tool: &str, status: &str) {
        self.inner
            .tool_invocations_total
            .with_label_values(&[tool, status])
            .inc();
    }

    /// Count a capture copied into staging.
    pub fn inc_capture_copied(&self) {
        self.inner.captures_copied_total.inc();
    }

    /// Count a failed capture copy.
    pub fn inc_capture_copy_failure(&self) {
        self.inner.capture_copy_failures_total.inc();
    }

    /// Record the result of one flow-file analysis.
    pub fn observe_analysis(&self, total_flows: u64, attack_flows: u64) {
        self.inner.flow_files_analyzed_total.inc();
        self.inner.flows_classified_total.inc_by(total_flows);
        self.inner.attack_flows_total.inc_by(attack_flows);
    }

    /// Count a raised attack alert.
    pub fn inc_attack_alert(&self) {
        self.inner.attack_alerts_total.inc();
    }

    /// Set the dispatch queue depth gauge.
    pub fn set_dispatch_queue_depth(&self, depth: i64) {
        self.inner.dispatch_queue_depth.set(depth);
    }

    /// Adjust the dispatch queue depth gauge by `delta`.
    pub fn add_dispatch_queue_depth(&self, delta: i64) {
        self.inner.dispatch_queue_depth.add(delta);
    }

    /// Set the pipeline running gauge.
    pub fn set_pipeline_running(&self, running: bool) {
        self.inner.pipeline_running.set(i64::from(running));
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatch_queue_depth: self.inner.dispatch_queue_depth.get(),
            pipeline_running: self.inner.pipeline_running.get(),
            captures_copied_total: self.inner.captures_copied_total.get(),
            capture_copy_failures_total: self.inner.capture_copy_failures_total.get(),
            flow_files_analyzed_total: self.inner.flow_files_analyzed_total.get(),
            flows_classified_total: self.inner.flows_classified_total.get(),
            attack_flows_total: self.inner.attack_flows_total.get(),
            attack_alerts_total: self.inner.attack_alerts_total.get(),
        }
    }
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn counter(name: &'static str, help: &str) -> Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn gauge(name: &'static str, help: &str) -> Result<IntGauge> {
    IntGauge::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_collectors() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_http_request("/traces/status", 200);
        metrics.inc_event("pipeline_started");
        metrics.inc_collector_tick("ok");
        metrics.inc_tool_invocation("strip", "success");
        metrics.inc_capture_copied();
        metrics.set_pipeline_running(true);

        let rendered = metrics.render()?;
        assert!(rendered.contains("http_requests_total"));
        assert!(rendered.contains("collector_ticks_total"));
        assert!(rendered.contains("tool_invocations_total"));
        assert!(rendered.contains("pipeline_running 1"));
        Ok(())
    }

    #[test]
    fn snapshot_reflects_analysis_counters() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.observe_analysis(10, 4);
        metrics.observe_analysis(5, 0);
        metrics.inc_attack_alert();
        metrics.inc_capture_copy_failure();
        metrics.set_dispatch_queue_depth(3);
        metrics.add_dispatch_queue_depth(-1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.flow_files_analyzed_total, 2);
        assert_eq!(snapshot.flows_classified_total, 15);
        assert_eq!(snapshot.attack_flows_total, 4);
        assert_eq!(snapshot.attack_alerts_total, 1);
        assert_eq!(snapshot.capture_copy_failures_total, 1);
        assert_eq!(snapshot.dispatch_queue_depth, 2);
        Ok(())
    }
}
