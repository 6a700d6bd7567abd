//! Exchange record types.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use stm_primitives::{ExchangeId, Metadata, MetadataValue, validate_metadata};

use crate::coordinate::Coordinate;
use crate::{EngineError, EngineResult};

/// A single user/assistant exchange held in short-term memory.
///
/// Records are immutable once stored; the engine only ever moves them
/// between the store, the archive, and snapshot files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRecord {
    id: ExchangeId,
    created_at: SystemTime,
    user_text: String,
    response_text: String,
    coordinate: Coordinate,
    summary: String,
    #[serde(default)]
    metadata: Metadata,
}

impl ExchangeRecord {
    /// Creates a builder for a new exchange record.
    #[must_use]
    pub fn builder(
        user_text: impl Into<String>,
        response_text: impl Into<String>,
        coordinate: Coordinate,
    ) -> ExchangeRecordBuilder {
        ExchangeRecordBuilder {
            id: ExchangeId::random(),
            created_at: SystemTime::now(),
            user_text: user_text.into(),
            response_text: response_text.into(),
            coordinate,
            summary: String::new(),
            metadata: Metadata::new(),
        }
    }

    /// Returns the unique identifier for this record.
    #[must_use]
    pub fn id(&self) -> ExchangeId {
        self.id
    }

    /// Returns the creation timestamp assigned at insertion.
    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Returns the text supplied by the user.
    #[must_use]
    pub fn user_text(&self) -> &str {
        &self.user_text
    }

    /// Returns the text produced in response.
    #[must_use]
    pub fn response_text(&self) -> &str {
        &self.response_text
    }

    /// Returns the coordinate the exchange was mapped to.
    #[must_use]
    pub fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }

    /// Returns the derived summary line.
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Returns the metadata map.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns the human-readable key of the record coordinate.
    #[must_use]
    pub fn coordinate_key(&self) -> String {
        self.coordinate.key()
    }

    pub(crate) fn set_created_at(&mut self, created_at: SystemTime) {
        self.created_at = created_at;
    }
}

/// Builder type used to assemble [`ExchangeRecord`] instances safely.
#[derive(Debug)]
pub struct ExchangeRecordBuilder {
    id: ExchangeId,
    created_at: SystemTime,
    user_text: String,
    response_text: String,
    coordinate: Coordinate,
    summary: String,
    metadata: Metadata,
}

impl ExchangeRecordBuilder {
    /// Overrides the record identifier.
    #[must_use]
    pub fn id(mut self, id: ExchangeId) -> Self {
        self.id = id;
        self
    }

    /// Sets the creation timestamp for the record.
    #[must_use]
    pub fn created_at(mut self, created_at: SystemTime) -> Self {
        self.created_at = created_at;
        self
    }

    /// Sets the derived summary line.
    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Adds a metadata entry after validating the value.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Metadata`] when a numeric value is NaN or
    /// infinite.
    pub fn metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> EngineResult<Self> {
        let key = key.into();
        let value = value.into();
        if !value.is_storable() {
            return Err(EngineError::Metadata {
                source: stm_primitives::Error::NonFiniteMetadata { key },
            });
        }
        self.metadata.insert(key, value);
        Ok(self)
    }

    /// Adds a full metadata map, overwriting existing keys when duplicates
    /// occur.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Metadata`] if any value fails validation.
    pub fn merge_metadata(mut self, metadata: Metadata) -> EngineResult<Self> {
        validate_metadata(&metadata)?;
        self.metadata.extend(metadata);
        Ok(self)
    }

    /// Finalises the builder and produces the record.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] when either text payload is
    /// empty or whitespace-only.
    pub fn build(self) -> EngineResult<ExchangeRecord> {
        if self.user_text.trim().is_empty() {
            return Err(EngineError::InvalidInput("user text must not be empty"));
        }
        if self.response_text.trim().is_empty() {
            return Err(EngineError::InvalidInput("response text must not be empty"));
        }
        Ok(ExchangeRecord {
            id: self.id,
            created_at: self.created_at,
            user_text: self.user_text,
            response_text: self.response_text,
            coordinate: self.coordinate,
            summary: self.summary,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::COORDINATE_DIMENSIONS;

    fn coordinate() -> Coordinate {
        Coordinate::new([0.5; COORDINATE_DIMENSIONS]).unwrap()
    }

    #[test]
    fn builder_rejects_blank_text() {
        let err = ExchangeRecord::builder("", "hello", coordinate())
            .build()
            .expect_err("empty user text should fail");
        assert!(matches!(err, EngineError::InvalidInput(_)));

        let err = ExchangeRecord::builder("hello", "   ", coordinate())
            .build()
            .expect_err("whitespace response should fail");
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn builder_rejects_non_finite_metadata() {
        let err = ExchangeRecord::builder("hello", "there", coordinate())
            .metadata("score", f64::INFINITY)
            .expect_err("infinite number should fail");
        assert!(matches!(err, EngineError::Metadata { .. }));
    }

    #[test]
    fn builder_constructs_record() {
        let record = ExchangeRecord::builder("hello", "there", coordinate())
            .summary("hello")
            .metadata("topic", "greeting")
            .unwrap()
            .metadata("turn", 2_i64)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(record.user_text(), "hello");
        assert_eq!(record.response_text(), "there");
        assert_eq!(record.summary(), "hello");
        assert_eq!(record.metadata().len(), 2);
        assert_eq!(record.coordinate_key(), record.coordinate().key());
    }

    #[test]
    fn serde_roundtrip_preserves_identity() {
        let record = ExchangeRecord::builder("hello", "there", coordinate())
            .summary("hello")
            .build()
            .unwrap();

        let json = serde_json::to_string(&record).unwrap();
        let decoded: ExchangeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.id(), record.id());
        assert_eq!(decoded.created_at(), record.created_at());
        assert_eq!(decoded.coordinate().as_slice(), record.coordinate().as_slice());
    }
}
