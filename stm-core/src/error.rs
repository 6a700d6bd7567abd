//! Error types for the memory engine.

use serde_json::Error as SerdeError;
use thiserror::Error;

/// Errors emitted by engine components.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The provided configuration was invalid.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(&'static str),
    /// Caller-supplied input failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Exchange record state failed validation.
    #[error("invalid exchange record: {0}")]
    InvalidRecord(&'static str),
    /// Metadata value failed validation.
    #[error("metadata error: {source}")]
    Metadata {
        /// Source error from the primitives crate.
        #[from]
        source: stm_primitives::Error,
    },
    /// Underlying I/O failure while reading or writing snapshot files.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },
    /// Serialization or deserialization error.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
    /// A snapshot file parsed but failed structural validation.
    #[error("invalid snapshot: {reason}")]
    SnapshotInvalid {
        /// Human-readable reason describing the failure.
        reason: String,
    },
    /// Archive backend reported an application error.
    #[error("archive error: {reason}")]
    Archive {
        /// Human-readable reason describing the failure.
        reason: String,
    },
}

impl EngineError {
    /// Helper to construct archive errors from string-like values.
    #[must_use]
    pub fn archive(reason: impl Into<String>) -> Self {
        Self::Archive {
            reason: reason.into(),
        }
    }

    /// Helper to construct snapshot validation errors from string-like values.
    #[must_use]
    pub fn snapshot_invalid(reason: impl Into<String>) -> Self {
        Self::SnapshotInvalid {
            reason: reason.into(),
        }
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
