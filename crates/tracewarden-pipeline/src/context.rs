//! Shared handles threaded through every pipeline component.
//!
//! # Design
//! - `ConfigHandle` is the single live configuration; readers take snapshots.
//! - `PipelineContext` bundles the event bus, metrics, and degraded-component tracking.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracewarden_config::{ConfigPatch, ConfigResult, PipelineConfig, validate_config};
use tracewarden_events::{Event, EventBus};
use tracewarden_telemetry::Metrics;
use tracing::{error, info, warn};

/// Shared, lock-protected live configuration.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<PipelineConfig>>,
}

impl ConfigHandle {
    /// Wrap an initial configuration.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the current configuration.
    #[must_use]
    pub fn snapshot(&self) -> PipelineConfig {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                error!("configuration lock poisoned; continuing");
                poisoned.into_inner().clone()
            }
        }
    }

    /// Merge `patch`, validate the result, and store it.
    ///
    /// Returns the merged configuration and the changed field names. The live
    /// value is untouched when validation fails.
    ///
    /// # Errors
    ///
    /// Returns an error when the merged configuration is invalid.
    pub fn apply(&self, patch: ConfigPatch) -> ConfigResult<(PipelineConfig, Vec<&'static str>)> {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("configuration lock poisoned; continuing");
                poisoned.into_inner()
            }
        };
        let mut candidate = guard.clone();
        let changed = candidate.apply_patch(patch);
        validate_config(&candidate)?;
        *guard = candidate.clone();
        Ok((candidate, changed))
    }
}

/// Event bus, metrics, and health shared by the pipeline components.
#[derive(Clone)]
pub struct PipelineContext {
    events: EventBus,
    metrics: Metrics,
    degraded: Arc<Mutex<BTreeSet<String>>>,
}

impl PipelineContext {
    /// Bundle the shared handles.
    #[must_use]
    pub fn new(events: EventBus, metrics: Metrics) -> Self {
        Self {
            events,
            metrics,
            degraded: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Event bus.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Metrics registry.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Publish an event and count it.
    pub fn publish(&self, event: Event) {
        self.metrics.inc_event(event.kind());
        let _ = self.events.publish(event);
    }

    /// Components currently reported as degraded.
    #[must_use]
    pub fn degraded(&self) -> Vec<String> {
        self.lock_degraded().iter().cloned().collect()
    }

    /// Mark `component` degraded; publishes a health change on the first transition.
    pub fn mark_degraded(&self, component: &str, detail: &str) {
        let mut guard = self.lock_degraded();
        if guard.insert(component.to_string()) {
            let degraded: Vec<String> = guard.iter().cloned().collect();
            drop(guard);
            warn!(component, detail, "pipeline component degraded");
            self.publish(Event::HealthChanged { degraded });
        } else {
            drop(guard);
            warn!(component, detail, "pipeline component still degraded");
        }
    }

    /// Clear the degraded mark for `component`, publishing a health change when it was set.
    pub fn mark_recovered(&self, component: &str) {
        let mut guard = self.lock_degraded();
        if guard.remove(component) {
            let degraded: Vec<String> = guard.iter().cloned().collect();
            drop(guard);
            info!(component, "pipeline component recovered");
            self.publish(Event::HealthChanged { degraded });
        }
    }

    fn lock_degraded(&self) -> MutexGuard<'_, BTreeSet<String>> {
        match self.degraded.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("health lock poisoned; continuing");
                poisoned.into_inner()
            }
        }
    }
}
