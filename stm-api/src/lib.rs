//! Serialisable service surface over the memory engine.
//!
//! [`MemoryApi`] wraps an engine handle and translates every operation into
//! a uniform [`ApiResponse`] envelope, ready for transports or process
//! boundaries that move JSON documents rather than Rust values. The crate
//! also renders stored conversations as portable JSON or CSV exports.

#![warn(missing_docs, clippy::pedantic)]

mod api;
mod envelope;
mod export;

/// The service facade and its payload views.
pub use api::{
    AddedView, ClearedView, ConfigView, ContextView, ExchangeView, ExportView, MatchView,
    MemoryApi, PromotionView, SaveStatusView, SavedView, StatisticsView,
};
/// The uniform response envelope.
pub use envelope::ApiResponse;
/// Export formats and their parse error.
pub use export::{ExportFormat, UnknownFormat};
