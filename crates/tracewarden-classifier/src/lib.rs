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

//! Flow classification against a serialized decision tree.
//!
//! Layout: `tree.rs` (model + evaluator), `analyzer.rs` (per-file analysis and
//! the shared analyzed-file cache), `log.rs` (append-only detection log).

pub mod analyzer;
pub mod error;
pub mod log;
pub mod tree;

pub use analyzer::{AnalysisOutcome, AnalysisSummary, AnalyzedFileCache, FlowAnalyzer};
pub use error::{ClassifierError, ClassifierResult};
pub use log::{DetectionLog, DetectionRecord};
pub use tree::{
    ATTACK_CLASSES, BENIGN_CLASS, DecisionTreeNode, FileTreeSource, TreeSource, UNKNOWN_LABEL,
    class_label,
};
