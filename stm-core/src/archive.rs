//! Archive collaborators that receive exchanges evicted from active memory.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::EngineResult;
use crate::record::ExchangeRecord;

/// Destination for exchanges promoted out of the bounded store.
///
/// The engine appends each evicted record exactly once, in eviction order. An
/// implementation may forward records to long-term storage, an analytics
/// pipeline, or nowhere at all.
#[async_trait]
pub trait Archive: Send + Sync {
    /// Accepts a record promoted out of active memory.
    ///
    /// # Errors
    ///
    /// Returns an error when the record could not be accepted. The engine
    /// treats this as non-fatal: the eviction stands and the failure is
    /// reported on the receipt.
    async fn append(&self, record: &ExchangeRecord) -> EngineResult<()>;
}

/// Archive that drops every promoted record.
///
/// This is the default collaborator for engines that only need the bounded
/// active window.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardArchive;

#[async_trait]
impl Archive for DiscardArchive {
    async fn append(&self, record: &ExchangeRecord) -> EngineResult<()> {
        debug!(id = %record.id(), "discarding promoted exchange");
        Ok(())
    }
}

/// Archive that retains promoted records in memory, in arrival order.
///
/// Useful in tests and demos that need to observe what the engine evicted.
#[derive(Debug, Default)]
pub struct RecordingArchive {
    records: Mutex<Vec<ExchangeRecord>>,
}

impl RecordingArchive {
    /// Creates an empty recording archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every archived record, oldest first.
    pub async fn records(&self) -> Vec<ExchangeRecord> {
        self.records.lock().await.clone()
    }

    /// Returns the number of archived records.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Returns `true` when nothing has been archived yet.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl Archive for RecordingArchive {
    async fn append(&self, record: &ExchangeRecord) -> EngineResult<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::{COORDINATE_DIMENSIONS, Coordinate};

    fn sample_record(user_text: &str) -> ExchangeRecord {
        let coordinate = Coordinate::new([0.25; COORDINATE_DIMENSIONS]).unwrap();
        ExchangeRecord::builder(user_text, "noted", coordinate)
            .summary(user_text)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn recording_archive_preserves_arrival_order() {
        let archive = RecordingArchive::new();
        assert!(archive.is_empty().await);

        let first = sample_record("first exchange");
        let second = sample_record("second exchange");
        archive.append(&first).await.unwrap();
        archive.append(&second).await.unwrap();

        let records = archive.records().await;
        assert_eq!(archive.len().await, 2);
        assert_eq!(records[0].id(), first.id());
        assert_eq!(records[1].id(), second.id());
    }

    #[tokio::test]
    async fn discard_archive_accepts_everything() {
        let archive = DiscardArchive;
        let record = sample_record("anything");
        archive.append(&record).await.unwrap();
    }
}
