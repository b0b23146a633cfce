//! Bounded worker pool that runs the transform stage.
//!
//! # Design
//! - A fixed number of workers share one bounded queue; submitting blocks while the queue is full.
//! - Dispatch is deduplicated per run by capture basename.
//! - Cancellation stops workers from taking new items; a transform already in progress finishes.
//! - Items still queued at cancellation are dropped. The dedup set belongs to the run, so the
//!   next run's staging rescan dispatches them again.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracewarden_events::Event;
use tracing::{debug, info, warn};

use crate::context::{ConfigHandle, PipelineContext};
use crate::transform::FileTransformStage;

/// Queue feeding the transform workers of one pipeline run.
pub struct Dispatcher {
    sender: mpsc::Sender<PathBuf>,
    dispatched: Arc<Mutex<HashSet<String>>>,
    workers: Vec<JoinHandle<()>>,
    ctx: PipelineContext,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Spawn `worker_count` workers behind a queue of `queue_depth` entries.
    #[must_use]
    pub fn spawn(
        ctx: PipelineContext,
        config: ConfigHandle,
        stage: FileTransformStage,
        worker_count: usize,
        queue_depth: usize,
        cancel: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_depth.max(1));
        let receiver = Arc::new(AsyncMutex::new(receiver));
        ctx.metrics().set_dispatch_queue_depth(0);

        let workers = (0..worker_count.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&receiver),
                    ctx.clone(),
                    config.clone(),
                    stage.clone(),
                    cancel.clone(),
                ))
            })
            .collect();
        debug!(workers = worker_count, queue_depth, "dispatch pool started");

        Self {
            sender,
            dispatched: Arc::new(Mutex::new(HashSet::new())),
            workers,
            ctx,
            cancel,
        }
    }

    /// Queue `capture` unless its basename was already dispatched in this run.
    ///
    /// Returns `true` when the capture was queued.
    pub async fn submit(&self, capture: &Path) -> bool {
        let Some(key) = capture
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
        else {
            warn!(path = %capture.display(), "capture path has no file name; not dispatched");
            return false;
        };
        if !self.claim(&key) {
            return false;
        }

        let queued = tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.sender.send(capture.to_path_buf()) => sent.is_ok(),
        };
        if !queued {
            self.release(&key);
            return false;
        }

        self.ctx.metrics().add_dispatch_queue_depth(1);
        self.ctx.publish(Event::CaptureDispatched {
            path: capture.display().to_string(),
        });
        debug!(path = %capture.display(), "capture dispatched");
        true
    }

    /// Whether `name` was dispatched in this run.
    #[must_use]
    pub fn was_dispatched(&self, name: &str) -> bool {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    /// Number of captures dispatched in this run.
    #[must_use]
    pub fn dispatched_count(&self) -> usize {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Close the queue and wait for every worker to exit.
    ///
    /// Without cancellation the workers drain the queue first; after cancellation only
    /// transforms already in progress complete.
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "dispatch worker ended abnormally");
            }
        }
        self.ctx.metrics().set_dispatch_queue_depth(0);
        info!("dispatch pool stopped");
    }

    fn claim(&self, key: &str) -> bool {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string())
    }

    fn release(&self, key: &str) {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

async fn worker_loop(
    worker: usize,
    receiver: Arc<AsyncMutex<mpsc::Receiver<PathBuf>>>,
    ctx: PipelineContext,
    config: ConfigHandle,
    stage: FileTransformStage,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                item = receiver.recv() => item,
            }
        };
        let Some(capture) = next else {
            break;
        };
        ctx.metrics().add_dispatch_queue_depth(-1);
        let snapshot = config.snapshot();
        debug!(worker, path = %capture.display(), "transform started");
        let _ = stage.run(&snapshot, &capture).await;
    }
    debug!(worker, "dispatch worker exiting");
}
