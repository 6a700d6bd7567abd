//! Typed metadata values attached to exchange records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Metadata map carried alongside an exchange record.
///
/// `BTreeMap` keeps iteration and serialisation order deterministic, which
/// in turn keeps snapshot files stable across saves of the same state.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A single metadata value.
///
/// The set of shapes is closed on purpose: snapshots and API envelopes only
/// ever need strings, numbers, and flags, and a closed enum keeps both
/// serialisation and consumers honest about it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Free-form text.
    Text(String),
    /// Numeric value. Must be finite to be storable.
    Number(f64),
    /// Boolean flag.
    Flag(bool),
}

impl MetadataValue {
    /// Returns `true` when the value can be serialised losslessly.
    ///
    /// Only `Number` can fail this check: NaN and infinities have no JSON
    /// representation.
    #[must_use]
    pub fn is_storable(&self) -> bool {
        match self {
            Self::Number(value) => value.is_finite(),
            Self::Text(_) | Self::Flag(_) => true,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        Self::Number(value as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

/// Validates every value in a metadata map.
///
/// # Errors
///
/// Returns [`Error::NonFiniteMetadata`] naming the first key whose number is
/// NaN or infinite.
pub fn validate_metadata(metadata: &Metadata) -> Result<()> {
    for (key, value) in metadata {
        if !value.is_storable() {
            return Err(Error::NonFiniteMetadata { key: key.clone() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_cover_common_shapes() {
        assert_eq!(
            MetadataValue::from("topic"),
            MetadataValue::Text("topic".to_owned())
        );
        assert_eq!(MetadataValue::from(3.5), MetadataValue::Number(3.5));
        assert_eq!(MetadataValue::from(7_i64), MetadataValue::Number(7.0));
        assert_eq!(MetadataValue::from(true), MetadataValue::Flag(true));
    }

    #[test]
    fn untagged_serde_round_trip() {
        let mut metadata = Metadata::new();
        metadata.insert("topic".to_owned(), MetadataValue::from("booking"));
        metadata.insert("turn".to_owned(), MetadataValue::from(4_i64));
        metadata.insert("resolved".to_owned(), MetadataValue::from(false));

        let json = serde_json::to_string(&metadata).expect("serialise");
        assert_eq!(json, r#"{"resolved":false,"topic":"booking","turn":4.0}"#);

        let back: Metadata = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, metadata);
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        let mut metadata = Metadata::new();
        metadata.insert("score".to_owned(), MetadataValue::Number(f64::NAN));

        let err = validate_metadata(&metadata).expect_err("must reject NaN");
        assert!(matches!(err, Error::NonFiniteMetadata { key } if key == "score"));
    }

    #[test]
    fn finite_map_passes_validation() {
        let mut metadata = Metadata::new();
        metadata.insert("score".to_owned(), MetadataValue::from(0.25));
        assert!(validate_metadata(&metadata).is_ok());
    }
}
