//! Periodic capture collection.
//!
//! # Design
//! - Each tick reads the live configuration, so directory changes apply on the next tick.
//! - The poll interval is fixed for the lifetime of a run.
//! - Source failures end the tick only; copy failures skip the file without retry.
//! - Cancellation is checked between files; a copy in progress completes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::fs;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracewarden_classifier::log::TIMESTAMP_FORMAT;
use tracewarden_config::PipelineConfig;
use tracewarden_events::Event;
use tracing::{debug, info, warn};

use crate::context::{ConfigHandle, PipelineContext};
use crate::dispatch::Dispatcher;
use crate::scan::files_with_suffix_async;
use crate::source::CaptureSource;

const HEALTH_COMPONENT: &str = "capture_source";

/// Which remote files a tick considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingPolicy {
    /// Skip the lexically last capture; it may still be written by the producer.
    #[default]
    HoldBackNewest,
    /// Consider every capture.
    All,
}

impl ListingPolicy {
    /// Filter `names` to captures ending in `extension` and apply the policy.
    #[must_use]
    pub fn select(self, names: Vec<String>, extension: &str) -> Vec<String> {
        let mut captures: Vec<String> = names
            .into_iter()
            .filter(|name| name.ends_with(extension))
            .collect();
        captures.sort();
        if self == Self::HoldBackNewest {
            captures.pop();
        }
        captures
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Endpoint used, when one was resolved.
    pub endpoint: Option<String>,
    /// Captures selected from the listing.
    pub selected: usize,
    /// Captures copied into staging.
    pub copied: usize,
    /// Copies that failed.
    pub copy_failures: usize,
    /// Captures newly queued for transformation.
    pub dispatched: usize,
}

/// Polls the capture source and feeds the dispatcher.
pub struct CollectorLoop {
    config: ConfigHandle,
    ctx: PipelineContext,
    source: Arc<dyn CaptureSource>,
    dispatcher: Dispatcher,
    policy: ListingPolicy,
    cancel: CancellationToken,
}

impl CollectorLoop {
    /// Build a collector that stops when `cancel` fires.
    #[must_use]
    pub fn new(
        config: ConfigHandle,
        ctx: PipelineContext,
        source: Arc<dyn CaptureSource>,
        dispatcher: Dispatcher,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            ctx,
            source,
            dispatcher,
            policy: ListingPolicy::default(),
            cancel,
        }
    }

    /// Override the listing policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: ListingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Dispatcher fed by this collector.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Tick every `poll_interval` until cancelled, then shut the dispatcher down.
    ///
    /// The first tick runs immediately.
    pub async fn run(self, poll_interval: Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = poll_interval.as_secs(), "collector started");
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let report = self.tick().await;
            debug!(?report, "collector tick complete");
        }
        self.dispatcher.shutdown().await;
        info!("collector stopped");
    }

    /// Close the dispatch queue and wait for queued captures to be transformed.
    pub async fn finish(self) {
        self.dispatcher.shutdown().await;
    }

    /// Run one collection pass.
    pub async fn tick(&self) -> TickReport {
        let config = self.config.snapshot();
        let mut report = TickReport::default();

        let endpoint = match self.source.resolve_endpoint(&config).await {
            Ok(endpoint) => endpoint,
            Err(err) => {
                self.source_failed("resolve_endpoint", &err.to_string());
                return report;
            }
        };
        debug!(endpoint, "capture source resolved");
        let listing = match self.source.list_files(&config, &endpoint).await {
            Ok(listing) => listing,
            Err(err) => {
                self.source_failed("list_files", &err.to_string());
                report.endpoint = Some(endpoint);
                return report;
            }
        };
        self.ctx.mark_recovered(HEALTH_COMPONENT);

        let captures = self.policy.select(listing, &config.capture_extension);
        report.selected = captures.len();
        if !captures.is_empty() {
            self.collect(&config, &endpoint, &captures, &mut report).await;
        }
        report.endpoint = Some(endpoint);

        let at = Local::now().format(TIMESTAMP_FORMAT).to_string();
        if report.copied > 0 {
            info!(copied = report.copied, at, "copied new captures");
        } else {
            info!(at, "no new captures to copy");
        }

        if !self.cancel.is_cancelled() {
            self.dispatch_staged(&config, &mut report).await;
        }
        self.ctx.metrics().inc_collector_tick("ok");
        report
    }

    async fn collect(
        &self,
        config: &PipelineConfig,
        endpoint: &str,
        captures: &[String],
        report: &mut TickReport,
    ) {
        let staging = &config.local_staging_dir;
        if let Err(err) = fs::create_dir_all(staging).await {
            warn!(path = %staging.display(), error = %err, "failed to create staging directory");
            return;
        }

        for name in captures {
            if self.cancel.is_cancelled() {
                debug!("collector cancelled mid-tick");
                return;
            }
            if Path::new(name).file_name().is_none_or(|base| base != name.as_str()) {
                warn!(name, "remote capture name is not a plain file name; skipping");
                continue;
            }
            let local = staging.join(name);
            if fs::try_exists(&local).await.unwrap_or(false) {
                debug!(name, "capture already staged");
                if self.dispatcher.submit(&local).await {
                    report.dispatched += 1;
                }
                continue;
            }

            match self.source.copy_file(config, endpoint, name, &local).await {
                Ok(()) => {
                    report.copied += 1;
                    self.ctx.metrics().inc_capture_copied();
                    self.ctx.publish(Event::CaptureCopied {
                        path: local.display().to_string(),
                    });
                    info!(name, path = %local.display(), "capture copied");
                    if self.dispatcher.submit(&local).await {
                        report.dispatched += 1;
                    }
                }
                Err(err) => {
                    report.copy_failures += 1;
                    self.ctx.metrics().inc_capture_copy_failure();
                    warn!(name, error = ?err, "capture copy failed");
                    if let Err(remove) = fs::remove_file(&local).await
                        && remove.kind() != std::io::ErrorKind::NotFound
                    {
                        warn!(path = %local.display(), error = %remove, "failed to remove partial capture");
                    }
                }
            }
        }
    }

    async fn dispatch_staged(&self, config: &PipelineConfig, report: &mut TickReport) {
        let staged = match files_with_suffix_async(
            "scan_staging_dir",
            &config.local_staging_dir,
            &config.capture_extension,
        )
        .await
        {
            Ok(staged) => staged,
            Err(err) => {
                warn!(path = %config.local_staging_dir.display(), error = ?err, "staging rescan failed");
                return;
            }
        };
        for capture in staged {
            if self.cancel.is_cancelled() {
                return;
            }
            if self.dispatcher.submit(&capture).await {
                report.dispatched += 1;
            }
        }
    }

    fn source_failed(&self, operation: &'static str, detail: &str) {
        warn!(operation, error = detail, "capture source unavailable; skipping tick");
        self.ctx.metrics().inc_collector_tick("source_unavailable");
        self.ctx.mark_degraded(HEALTH_COMPONENT, detail);
    }
}
