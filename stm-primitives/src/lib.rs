//! Core shared types for the semantic short-term memory engine.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod ids;
mod metadata;

/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Unique identifier for stored conversation exchanges.
pub use ids::ExchangeId;
/// Typed metadata values carried alongside exchange records.
pub use metadata::{Metadata, MetadataValue, validate_metadata};
