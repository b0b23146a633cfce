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

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (model + flow CSV writers), workspace.rs (temp directory layout), scripts.rs (fake tool executables).

pub mod fixtures;
pub mod scripts;
pub mod workspace;
