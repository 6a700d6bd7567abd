//! Shared error definitions for the STM primitive types.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the STM workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating STM primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided exchange identifier could not be parsed.
    #[error("invalid exchange id: {source}")]
    InvalidExchangeId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// A metadata number was NaN or infinite and cannot be stored losslessly.
    #[error("non-finite metadata number for key `{key}`")]
    NonFiniteMetadata {
        /// The metadata key carrying the offending number.
        key: String,
    },
}
