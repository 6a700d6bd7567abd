//! Linear-scan relevance search over stored exchanges.

use std::cmp::Ordering;
use std::num::NonZeroUsize;

use crate::coordinate::Coordinate;
use crate::record::ExchangeRecord;
use crate::{EngineError, EngineResult};

/// Parameters bounding a relevance search.
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    max_results: NonZeroUsize,
    max_distance: Option<f64>,
}

impl SearchOptions {
    /// Creates options with the default result and distance bounds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of matches returned.
    #[must_use]
    pub fn with_max_results(mut self, max_results: NonZeroUsize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Sets the distance ceiling for this search, overriding the engine
    /// default.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] when the ceiling is not finite
    /// and positive.
    pub fn with_max_distance(mut self, max_distance: f64) -> EngineResult<Self> {
        if !max_distance.is_finite() || max_distance <= 0.0 {
            return Err(EngineError::InvalidInput(
                "max distance must be finite and positive",
            ));
        }
        self.max_distance = Some(max_distance);
        Ok(self)
    }

    /// Returns the maximum number of matches returned.
    #[must_use]
    pub const fn max_results(self) -> NonZeroUsize {
        self.max_results
    }

    /// Returns the distance ceiling, when overridden.
    #[must_use]
    pub const fn max_distance(self) -> Option<f64> {
        self.max_distance
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: NonZeroUsize::new(5).expect("non-zero"),
            max_distance: None,
        }
    }
}

/// A scored match returned from a relevance search.
#[derive(Debug, Clone)]
pub struct SearchMatch {
    record: ExchangeRecord,
    distance: f64,
    relevance: f64,
}

impl SearchMatch {
    pub(crate) fn new(record: ExchangeRecord, distance: f64, relevance: f64) -> Self {
        Self {
            record,
            distance,
            relevance,
        }
    }

    /// Returns the matched record.
    #[must_use]
    pub fn record(&self) -> &ExchangeRecord {
        &self.record
    }

    /// Consumes the match and returns the record.
    #[must_use]
    pub fn into_record(self) -> ExchangeRecord {
        self.record
    }

    /// Returns the Euclidean distance from the query coordinate.
    #[must_use]
    pub const fn distance(&self) -> f64 {
        self.distance
    }

    /// Returns the bounded relevance score in `[0.0, 1.0]`.
    ///
    /// Relevance decreases linearly from `1.0` at distance zero to `0.0` at
    /// the distance ceiling.
    #[must_use]
    pub const fn relevance(&self) -> f64 {
        self.relevance
    }
}

/// Scans the entries linearly and returns the closest qualifying matches.
///
/// Entries farther than `max_distance` are discarded. Results are ordered by
/// distance ascending with ties broken by insertion recency (most recent
/// first), then truncated to `max_results`.
pub(crate) fn rank<'a, I>(
    entries: I,
    query: &Coordinate,
    max_results: usize,
    max_distance: f64,
) -> Vec<SearchMatch>
where
    I: Iterator<Item = (usize, &'a ExchangeRecord)>,
{
    let mut qualifying: Vec<(usize, f64, &ExchangeRecord)> = Vec::new();
    for (index, record) in entries {
        let distance = record.coordinate().distance(query);
        if distance > max_distance {
            continue;
        }
        qualifying.push((index, distance, record));
    }

    qualifying.sort_by(|a, b| match a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal) {
        Ordering::Equal => b.0.cmp(&a.0),
        other => other,
    });
    qualifying.truncate(max_results);

    qualifying
        .into_iter()
        .map(|(_, distance, record)| {
            SearchMatch::new(record.clone(), distance, relevance(distance, max_distance))
        })
        .collect()
}

fn relevance(distance: f64, max_distance: f64) -> f64 {
    (1.0 - distance / max_distance).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::COORDINATE_DIMENSIONS;
    use crate::store::ExchangeStore;

    fn record_at(values: [f64; COORDINATE_DIMENSIONS]) -> ExchangeRecord {
        ExchangeRecord::builder("user line", "response line", Coordinate::new(values).unwrap())
            .summary("user line")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn origin_query_finds_exact_match_and_excludes_far_record() {
        let store = ExchangeStore::new(NonZeroUsize::new(10).unwrap());
        let near = record_at([0.0; COORDINATE_DIMENSIONS]);
        let near_id = near.id();
        store.insert(near).await.unwrap();
        store
            .insert(record_at([1.0; COORDINATE_DIMENSIONS]))
            .await
            .unwrap();

        let origin = Coordinate::new([0.0; COORDINATE_DIMENSIONS]).unwrap();
        let matches = store.search(&origin, 5, 2.0).await;

        // The all-ones record sits at distance 3.0, outside the 2.0 ceiling.
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].record().id(), near_id);
        assert!(matches[0].distance().abs() < f64::EPSILON);
        assert!((matches[0].relevance() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn orders_by_distance_with_bounded_relevance() {
        let store = ExchangeStore::new(NonZeroUsize::new(10).unwrap());
        for first_axis in [2.0, 0.0, 1.0] {
            let mut values = [0.0; COORDINATE_DIMENSIONS];
            values[0] = first_axis;
            store.insert(record_at(values)).await.unwrap();
        }

        let origin = Coordinate::new([0.0; COORDINATE_DIMENSIONS]).unwrap();
        let matches = store.search(&origin, 5, 2.0).await;

        assert_eq!(matches.len(), 3);
        let distances: Vec<f64> = matches.iter().map(SearchMatch::distance).collect();
        assert!(distances.windows(2).all(|pair| pair[0] <= pair[1]));
        let relevances: Vec<f64> = matches.iter().map(SearchMatch::relevance).collect();
        assert!(relevances.windows(2).all(|pair| pair[0] >= pair[1]));
        assert!(
            relevances
                .iter()
                .all(|score| (0.0..=1.0).contains(score))
        );
        // The record exactly at the ceiling is still included, at zero
        // relevance.
        assert!((matches[2].distance() - 2.0).abs() < f64::EPSILON);
        assert!(matches[2].relevance().abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn equal_distances_break_ties_by_recency() {
        let store = ExchangeStore::new(NonZeroUsize::new(10).unwrap());
        let older = record_at([0.5; COORDINATE_DIMENSIONS]);
        let newer = record_at([0.5; COORDINATE_DIMENSIONS]);
        let newer_id = newer.id();
        store.insert(older).await.unwrap();
        store.insert(newer).await.unwrap();

        let query = Coordinate::new([0.5; COORDINATE_DIMENSIONS]).unwrap();
        let matches = store.search(&query, 5, 2.0).await;

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].record().id(), newer_id);
    }

    #[tokio::test]
    async fn truncates_to_max_results() {
        let store = ExchangeStore::new(NonZeroUsize::new(10).unwrap());
        for _ in 0..4 {
            store
                .insert(record_at([0.1; COORDINATE_DIMENSIONS]))
                .await
                .unwrap();
        }

        let origin = Coordinate::new([0.0; COORDINATE_DIMENSIONS]).unwrap();
        let matches = store.search(&origin, 2, 2.0).await;
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn options_reject_bad_distance_ceiling() {
        for ceiling in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            let result = SearchOptions::default().with_max_distance(ceiling);
            assert!(result.is_err());
        }
        let options = SearchOptions::default().with_max_distance(1.5).unwrap();
        assert_eq!(options.max_distance(), Some(1.5));
    }
}
