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

//! HTTP control surface for the trace pipeline.
//!
//! Layout: `http/router.rs` (router + server host), `http/traces.rs`
//! (start/stop/status/configure), `http/health.rs` (health + metrics),
//! `http/sse.rs` (event stream with `Last-Event-ID` replay),
//! `http/errors.rs` (problem documents), `models.rs` (wire types).

pub mod error;
pub(crate) mod http;
pub mod models;
pub(crate) mod state;

pub use error::{ApiServerError, ApiServerResult};
pub use http::router::ApiServer;
