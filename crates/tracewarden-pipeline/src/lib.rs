#![forbid(unsafe_code)]
#![warn(
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Trace collection pipeline.
//!
//! A [`PipelineController`] owns the run lifecycle. While running, a
//! [`CollectorLoop`] pulls captures from a [`CaptureSource`] and feeds a
//! bounded [`Dispatcher`] whose workers run the [`FileTransformStage`]
//! (strip, extract flows, classify). The [`OutputDirectoryMonitor`] scans the
//! flow directory independently for the whole process lifetime.

pub mod analysis;
pub mod collector;
pub mod context;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod monitor;
mod scan;
pub mod source;
pub mod tools;
pub mod transform;

pub use analysis::AnalysisStage;
pub use collector::{CollectorLoop, ListingPolicy, TickReport};
pub use context::{ConfigHandle, PipelineContext};
pub use controller::{PipelineController, PipelineStatus, StartOutcome, StopOutcome};
pub use dispatch::Dispatcher;
pub use error::{PipelineError, PipelineResult};
pub use monitor::OutputDirectoryMonitor;
pub use source::{CaptureSource, KubectlCaptureSource};
pub use tools::{ProcessToolRunner, ToolInvocation, ToolOutput, ToolRunner};
pub use transform::{FileTransformStage, TransformOutcome};
