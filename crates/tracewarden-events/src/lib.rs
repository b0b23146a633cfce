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

//! Event bus for the trace collection pipeline.
//!
//! The bus carries typed pipeline events with sequential identifiers and keeps
//! a bounded replay ring so late subscribers can catch up. Internally it uses
//! `tokio::broadcast`; when a subscriber lags, the oldest events are dropped.

pub mod payloads;
pub mod routing;

pub use payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};
pub use routing::{EventBus, EventStream};
