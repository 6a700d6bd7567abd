//! Bounded short-term conversational memory with coordinate search and
//! crash-safe persistence.
//!
//! The engine keeps the most recent exchanges of a conversation in RAM and
//! derives a deterministic nine-dimensional coordinate for each one, so
//! relevance queries reduce to a linear scan over a small window. When
//! capacity is exceeded the oldest exchange is promoted to an [`Archive`],
//! and the whole window is snapshotted to alternating slot files so a crash
//! never loses more than the last save interval.
//!
//! ```no_run
//! use stm_core::{EngineConfig, MemoryEngine, SearchOptions};
//! use stm_primitives::Metadata;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = MemoryEngine::open(EngineConfig::new("stm_data")).await?;
//! engine
//!     .add_exchange(
//!         "Can you book a table for Friday?",
//!         "Done, table for two at eight.",
//!         Metadata::new(),
//!     )
//!     .await?;
//! let matches = engine.search("table booking", SearchOptions::new()).await?;
//! for found in &matches {
//!     println!("{} ({:.2})", found.record().summary(), found.relevance());
//! }
//! engine.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, clippy::pedantic)]

mod archive;
mod config;
mod coordinate;
mod deriver;
mod engine;
mod error;
mod persist;
mod record;
mod search;
mod snapshot;
mod store;

/// Archive collaborators receiving exchanges evicted from active memory.
pub use archive::{Archive, DiscardArchive, RecordingArchive};
/// Engine configuration.
pub use config::EngineConfig;
/// Nine-dimensional coordinates and their axis layout.
pub use coordinate::{AXIS_LABELS, COORDINATE_DIMENSIONS, Coordinate};
/// Coordinate derivation from exchange text.
pub use deriver::{CoordinateDeriver, Derivation, LexicalDeriver};
/// The engine itself and the values it hands back.
pub use engine::{
    ContextBundle, EngineBuilder, EngineStats, ExchangeReceipt, MemoryEngine, Promotion,
    SaveStatus,
};
/// Error type and result alias for engine operations.
pub use error::{EngineError, EngineResult};
/// Dual-slot snapshot persistence and startup recovery.
pub use persist::{Recovery, SnapshotStore};
/// Stored exchange records.
pub use record::{ExchangeRecord, ExchangeRecordBuilder};
/// Relevance search options and results.
pub use search::{SearchMatch, SearchOptions};
/// On-disk snapshot format.
pub use snapshot::{SNAPSHOT_FORMAT_VERSION, SlotId, SnapshotFile};
/// The bounded insertion-ordered store backing the engine.
pub use store::{ExchangeStore, StoreStats};

/// Shared primitive types, re-exported for convenience.
pub use stm_primitives::{ExchangeId, Metadata, MetadataValue};
