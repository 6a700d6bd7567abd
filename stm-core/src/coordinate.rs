//! Nine-dimensional semantic coordinates.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{EngineError, EngineResult};

/// Number of axes in the coordinate space.
pub const COORDINATE_DIMENSIONS: usize = 9;

/// Axis labels in component order.
///
/// The first triple (`x`, `y`, `z`) carries spatial features, the second
/// (`a`, `b`, `c`) conceptual features, and the third (`d`, `e`, `f`)
/// contextual features. Distance math treats all nine axes uniformly; the
/// grouping only gives the components names.
pub const AXIS_LABELS: [&str; COORDINATE_DIMENSIONS] =
    ["x", "y", "z", "a", "b", "c", "d", "e", "f"];

/// A point in the shared semantic coordinate space.
#[derive(Clone, Copy, PartialEq)]
pub struct Coordinate {
    values: [f64; COORDINATE_DIMENSIONS],
}

impl Coordinate {
    /// Creates a coordinate from component values.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRecord`] when any component is NaN or
    /// infinite.
    pub fn new(values: [f64; COORDINATE_DIMENSIONS]) -> EngineResult<Self> {
        if !values.iter().all(|value| value.is_finite()) {
            return Err(EngineError::InvalidRecord(
                "coordinate contains non-finite components",
            ));
        }
        Ok(Self { values })
    }

    /// Creates a coordinate by copying the provided slice.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRecord`] when the slice length differs
    /// from [`COORDINATE_DIMENSIONS`] or any component is non-finite.
    pub fn from_slice(values: &[f64]) -> EngineResult<Self> {
        let values: [f64; COORDINATE_DIMENSIONS] = values.try_into().map_err(|_| {
            EngineError::InvalidRecord("coordinate must have exactly nine components")
        })?;
        Self::new(values)
    }

    /// Returns an immutable view of the component values.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Returns the spatial triple (axes `x`, `y`, `z`).
    #[must_use]
    pub const fn spatial(&self) -> [f64; 3] {
        [self.values[0], self.values[1], self.values[2]]
    }

    /// Returns the conceptual triple (axes `a`, `b`, `c`).
    #[must_use]
    pub const fn conceptual(&self) -> [f64; 3] {
        [self.values[3], self.values[4], self.values[5]]
    }

    /// Returns the contextual triple (axes `d`, `e`, `f`).
    #[must_use]
    pub const fn contextual(&self) -> [f64; 3] {
        [self.values[6], self.values[7], self.values[8]]
    }

    /// Euclidean distance to another coordinate across all nine axes.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }

    /// Deterministic human-readable encoding of the coordinate.
    ///
    /// Each component is rendered as its axis label followed by the value at
    /// three decimal places, and the parts are joined with `_`. Keys are
    /// display identifiers only; records are keyed by their exchange id.
    #[must_use]
    pub fn key(&self) -> String {
        let parts: Vec<String> = AXIS_LABELS
            .iter()
            .zip(self.values.iter())
            .map(|(label, value)| format!("{label}{value:.3}"))
            .collect();
        parts.join("_")
    }
}

impl std::fmt::Debug for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinate").field("key", &self.key()).finish()
    }
}

impl Serialize for Coordinate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.values.as_slice().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = Vec::<f64>::deserialize(deserializer)?;
        Self::from_slice(&values).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_finite_components() {
        let mut values = [0.0; COORDINATE_DIMENSIONS];
        values[4] = f64::NAN;
        let err = Coordinate::new(values).expect_err("nan not allowed");
        assert!(matches!(err, EngineError::InvalidRecord(_)));
    }

    #[test]
    fn rejects_wrong_length() {
        let err = Coordinate::from_slice(&[0.0; 8]).expect_err("eight components should fail");
        assert!(matches!(err, EngineError::InvalidRecord(_)));
    }

    #[test]
    fn distance_between_origin_and_ones() {
        let origin = Coordinate::new([0.0; COORDINATE_DIMENSIONS]).unwrap();
        let ones = Coordinate::new([1.0; COORDINATE_DIMENSIONS]).unwrap();
        assert!((origin.distance(&ones) - 3.0).abs() < f64::EPSILON);
        assert!(origin.distance(&origin).abs() < f64::EPSILON);
    }

    #[test]
    fn key_is_label_prefixed_and_fixed_precision() {
        let mut values = [0.0; COORDINATE_DIMENSIONS];
        values[0] = 0.25;
        values[1] = -0.1184;
        let coordinate = Coordinate::new(values).unwrap();
        assert_eq!(
            coordinate.key(),
            "x0.250_y-0.118_z0.000_a0.000_b0.000_c0.000_d0.000_e0.000_f0.000"
        );
    }

    #[test]
    fn triples_cover_all_axes() {
        let values = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];
        let coordinate = Coordinate::new(values).unwrap();
        assert_eq!(coordinate.spatial(), [0.1, 0.2, 0.3]);
        assert_eq!(coordinate.conceptual(), [0.4, 0.5, 0.6]);
        assert_eq!(coordinate.contextual(), [0.7, 0.8, 0.9]);
    }

    #[test]
    fn serialization_roundtrip() {
        let values = [0.1, -0.2, 0.3, 0.0, 0.5, -0.6, 0.7, 0.0, 0.9];
        let coordinate = Coordinate::new(values).unwrap();
        let json = serde_json::to_string(&coordinate).unwrap();
        let decoded: Coordinate = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.as_slice(), coordinate.as_slice());
    }

    #[test]
    fn deserialization_rejects_short_sequences() {
        let result: Result<Coordinate, _> = serde_json::from_str("[0.0,0.0,0.0]");
        assert!(result.is_err());
    }
}
