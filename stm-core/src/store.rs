//! Bounded in-memory exchange store with FIFO promotion.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::time::SystemTime;

use stm_primitives::ExchangeId;
use tokio::sync::RwLock;

use crate::coordinate::Coordinate;
use crate::record::ExchangeRecord;
use crate::search::{SearchMatch, rank};
use crate::{EngineError, EngineResult};

#[derive(Debug, Default)]
struct StoreInner {
    entries: HashMap<ExchangeId, ExchangeRecord>,
    order: VecDeque<ExchangeId>,
    last_created_at: Option<SystemTime>,
}

/// Insertion-ordered store retaining at most `capacity` exchanges.
///
/// A single writer mutates the store at a time while readers proceed
/// concurrently; every read hands out copies, so callers never observe a
/// mutation mid-iteration.
#[derive(Debug)]
pub struct ExchangeStore {
    capacity: NonZeroUsize,
    inner: RwLock<StoreInner>,
}

impl ExchangeStore {
    /// Creates an empty store with the provided capacity.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(StoreInner {
                entries: HashMap::with_capacity(capacity.get()),
                order: VecDeque::with_capacity(capacity.get()),
                last_created_at: None,
            }),
        }
    }

    /// Returns the configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Inserts a record, evicting the oldest entry when capacity would be
    /// exceeded.
    ///
    /// The record timestamp is re-stamped so creation times never move
    /// backwards relative to the previous insertion, keeping queue order and
    /// timestamps consistent even when the wall clock regresses. The evicted
    /// record, if any, is returned so the caller can promote it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRecord`] when a record with the same
    /// identifier is already stored.
    pub async fn insert(&self, mut record: ExchangeRecord) -> EngineResult<Option<ExchangeRecord>> {
        let mut guard = self.inner.write().await;
        if guard.entries.contains_key(&record.id()) {
            return Err(EngineError::InvalidRecord(
                "exchange id already present in store",
            ));
        }

        let mut created_at = SystemTime::now();
        if let Some(last) = guard.last_created_at {
            created_at = created_at.max(last);
        }
        record.set_created_at(created_at);
        guard.last_created_at = Some(created_at);

        guard.order.push_back(record.id());
        guard.entries.insert(record.id(), record);

        if guard.order.len() > self.capacity.get() {
            if let Some(oldest) = guard.order.pop_front() {
                return Ok(guard.entries.remove(&oldest));
            }
        }
        Ok(None)
    }

    /// Returns a copy of the record with the given identifier.
    #[must_use]
    pub async fn get(&self, id: ExchangeId) -> Option<ExchangeRecord> {
        let guard = self.inner.read().await;
        guard.entries.get(&id).cloned()
    }

    /// Removes and returns the record with the given identifier.
    pub async fn remove(&self, id: ExchangeId) -> Option<ExchangeRecord> {
        let mut guard = self.inner.write().await;
        let removed = guard.entries.remove(&id);
        if removed.is_some() {
            guard.order.retain(|candidate| *candidate != id);
        }
        removed
    }

    /// Returns every stored record in insertion order.
    #[must_use]
    pub async fn all(&self) -> Vec<ExchangeRecord> {
        let guard = self.inner.read().await;
        guard
            .order
            .iter()
            .filter_map(|id| guard.entries.get(id).cloned())
            .collect()
    }

    /// Returns the most recent records up to the requested limit, oldest
    /// first.
    #[must_use]
    pub async fn recent(&self, limit: usize) -> Vec<ExchangeRecord> {
        let guard = self.inner.read().await;
        let skip = guard.order.len().saturating_sub(limit);
        guard
            .order
            .iter()
            .skip(skip)
            .filter_map(|id| guard.entries.get(id).cloned())
            .collect()
    }

    /// Runs a relevance search against the stored records.
    ///
    /// The ranking pass executes under the read lock and only clones records
    /// that actually qualify.
    #[must_use]
    pub async fn search(
        &self,
        query: &Coordinate,
        max_results: usize,
        max_distance: f64,
    ) -> Vec<SearchMatch> {
        let guard = self.inner.read().await;
        let entries = guard
            .order
            .iter()
            .enumerate()
            .filter_map(|(index, id)| guard.entries.get(id).map(|record| (index, record)));
        rank(entries, query, max_results, max_distance)
    }

    /// Replaces store contents with recovered records, preserving their ids
    /// and timestamps.
    ///
    /// Records beyond capacity are dropped from the oldest end. Returns the
    /// number of records loaded.
    pub async fn hydrate(&self, mut records: Vec<ExchangeRecord>) -> usize {
        let capacity = self.capacity.get();
        if records.len() > capacity {
            records.drain(..records.len() - capacity);
        }

        let mut guard = self.inner.write().await;
        guard.entries.clear();
        guard.order.clear();
        for record in records {
            guard.last_created_at = Some(match guard.last_created_at {
                Some(last) => last.max(record.created_at()),
                None => record.created_at(),
            });
            guard.order.push_back(record.id());
            guard.entries.insert(record.id(), record);
        }
        guard.order.len()
    }

    /// Removes every stored record.
    ///
    /// The monotonic timestamp floor survives the clear so later insertions
    /// cannot be stamped before earlier ones.
    pub async fn clear(&self) {
        let mut guard = self.inner.write().await;
        guard.entries.clear();
        guard.order.clear();
    }

    /// Returns the number of stored records.
    #[must_use]
    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    /// Returns whether the store is empty.
    #[must_use]
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.order.is_empty()
    }

    /// Returns utilisation statistics for the store.
    #[must_use]
    pub async fn stats(&self) -> StoreStats {
        let guard = self.inner.read().await;
        StoreStats {
            entries: guard.order.len(),
            capacity: self.capacity.get(),
        }
    }
}

/// Snapshot describing utilisation of the exchange store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Entries currently stored.
    pub entries: usize,
    /// Maximum number of entries permitted.
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::COORDINATE_DIMENSIONS;

    fn record_at(value: f64) -> ExchangeRecord {
        let coordinate = Coordinate::new([value; COORDINATE_DIMENSIONS]).unwrap();
        ExchangeRecord::builder("user line", "response line", coordinate)
            .summary("user line")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn respects_capacity_and_evicts_oldest() {
        let store = ExchangeStore::new(NonZeroUsize::new(2).unwrap());

        let first = record_at(0.1);
        let first_id = first.id();
        assert!(store.insert(first).await.unwrap().is_none());
        assert!(store.insert(record_at(0.2)).await.unwrap().is_none());

        let evicted = store
            .insert(record_at(0.3))
            .await
            .unwrap()
            .expect("third insert must evict");
        assert_eq!(evicted.id(), first_id);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn rejects_duplicate_ids() {
        let store = ExchangeStore::new(NonZeroUsize::new(4).unwrap());
        let record = record_at(0.1);
        let duplicate = ExchangeRecord::builder("user line", "response line", *record.coordinate())
            .id(record.id())
            .build()
            .unwrap();

        store.insert(record).await.unwrap();
        let err = store.insert(duplicate).await.expect_err("duplicate id");
        assert!(matches!(err, EngineError::InvalidRecord(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn timestamps_never_regress() {
        let store = ExchangeStore::new(NonZeroUsize::new(4).unwrap());

        let stale = ExchangeRecord::builder(
            "user line",
            "response line",
            Coordinate::new([0.0; COORDINATE_DIMENSIONS]).unwrap(),
        )
        .created_at(SystemTime::UNIX_EPOCH)
        .build()
        .unwrap();
        store.insert(stale).await.unwrap();
        store.insert(record_at(0.2)).await.unwrap();

        let all = store.all().await;
        assert_eq!(all.len(), 2);
        assert!(all[0].created_at() > SystemTime::UNIX_EPOCH);
        assert!(all[1].created_at() >= all[0].created_at());
    }

    #[tokio::test]
    async fn get_and_remove_round_trip() {
        let store = ExchangeStore::new(NonZeroUsize::new(4).unwrap());
        let record = record_at(0.4);
        let id = record.id();
        store.insert(record).await.unwrap();

        assert!(store.get(id).await.is_some());
        assert!(store.get(ExchangeId::random()).await.is_none());

        let removed = store.remove(id).await.expect("record present");
        assert_eq!(removed.id(), id);
        assert!(store.get(id).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn recent_returns_chronological_tail() {
        let store = ExchangeStore::new(NonZeroUsize::new(4).unwrap());
        let mut ids = Vec::new();
        for value in [0.1, 0.2, 0.3] {
            let record = record_at(value);
            ids.push(record.id());
            store.insert(record).await.unwrap();
        }

        let recent = store.recent(2).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id(), ids[1]);
        assert_eq!(recent[1].id(), ids[2]);

        let everything = store.recent(10).await;
        assert_eq!(everything.len(), 3);
    }

    #[tokio::test]
    async fn hydrate_truncates_to_capacity_keeping_newest() {
        let store = ExchangeStore::new(NonZeroUsize::new(2).unwrap());
        let records: Vec<ExchangeRecord> = (0..4).map(|i| record_at(f64::from(i) / 10.0)).collect();
        let keep: Vec<ExchangeId> = records.iter().skip(2).map(ExchangeRecord::id).collect();

        let loaded = store.hydrate(records).await;
        assert_eq!(loaded, 2);

        let all = store.all().await;
        assert_eq!(all[0].id(), keep[0]);
        assert_eq!(all[1].id(), keep[1]);
    }

    #[tokio::test]
    async fn search_on_empty_store_is_empty() {
        let store = ExchangeStore::new(NonZeroUsize::new(2).unwrap());
        let origin = Coordinate::new([0.0; COORDINATE_DIMENSIONS]).unwrap();
        assert!(store.search(&origin, 5, 2.0).await.is_empty());
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let store = ExchangeStore::new(NonZeroUsize::new(4).unwrap());
        store.insert(record_at(0.1)).await.unwrap();
        store.clear().await;
        assert!(store.is_empty().await);
        assert_eq!(store.stats().await.entries, 0);
    }
}
