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

//! Pipeline configuration for the trace collector.
//!
//! Layout: `model.rs` (config + patch types), `defaults.rs` (baseline values),
//! `validate.rs` (invariants and parsing helpers), `loader.rs` (environment overlay).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_from_env, load_server_from_env, load_server_with, load_with};
pub use model::{ConfigPatch, PipelineConfig, ServerConfig};
pub use validate::validate_config;
