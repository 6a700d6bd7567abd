//! Alternating dual-slot persistence with crash-safe recovery.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::record::ExchangeRecord;
use crate::snapshot::{SlotId, SnapshotFile, read_snapshot, write_snapshot};

/// Outcome of scanning both snapshot slots at startup.
#[derive(Debug, Default)]
pub struct Recovery {
    records: Vec<ExchangeRecord>,
    source: Option<SlotId>,
    failures: Vec<(SlotId, EngineError)>,
}

impl Recovery {
    /// Returns the recovered records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[ExchangeRecord] {
        &self.records
    }

    /// Consumes the recovery and returns its records.
    #[must_use]
    pub fn into_records(self) -> Vec<ExchangeRecord> {
        self.records
    }

    /// Returns the slot the records were loaded from, when one was readable.
    #[must_use]
    pub const fn source(&self) -> Option<SlotId> {
        self.source
    }

    /// Returns the slots that were present but could not be used.
    #[must_use]
    pub fn failures(&self) -> &[(SlotId, EngineError)] {
        &self.failures
    }
}

/// Persists exchange snapshots by alternating between two slot files.
///
/// Every save targets the slot not written last time, so the previous
/// snapshot survives until the new one has fully landed. Combined with the
/// write-then-rename in [`crate::snapshot`], a crash at any point leaves at
/// least one readable snapshot on disk.
#[derive(Debug)]
pub struct SnapshotStore {
    slot_a: PathBuf,
    slot_b: PathBuf,
    next_slot: Mutex<SlotId>,
}

impl SnapshotStore {
    /// Creates a store over the two slot paths. The first save targets slot
    /// A; call [`SnapshotStore::recover`] first to resume an existing
    /// alternation.
    #[must_use]
    pub fn new(slot_a: PathBuf, slot_b: PathBuf) -> Self {
        Self {
            slot_a,
            slot_b,
            next_slot: Mutex::new(SlotId::A),
        }
    }

    /// Returns the on-disk path backing `slot`.
    #[must_use]
    pub fn path_for(&self, slot: SlotId) -> &Path {
        match slot {
            SlotId::A => &self.slot_a,
            SlotId::B => &self.slot_b,
        }
    }

    /// Returns the slot the next save will write to.
    pub async fn next_slot(&self) -> SlotId {
        *self.next_slot.lock().await
    }

    /// Writes `records` to the next slot and returns the slot written.
    ///
    /// The alternation only advances after the write succeeds. A failed save
    /// retries the same slot next time, leaving the other slot's good copy
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns an error when serialising or writing the snapshot fails.
    pub async fn save(&self, records: Vec<ExchangeRecord>) -> EngineResult<SlotId> {
        let mut slot_guard = self.next_slot.lock().await;
        let slot = *slot_guard;
        let snapshot = SnapshotFile::new(slot, records);
        write_snapshot(self.path_for(slot), &snapshot).await?;
        *slot_guard = slot.other();
        debug!(slot = %slot, records = snapshot.records().len(), "snapshot written");
        Ok(slot)
    }

    /// Scans both slots and loads the newest readable snapshot.
    ///
    /// Missing slots are normal on first start and are skipped silently. A
    /// slot that exists but cannot be read is logged, reported in
    /// [`Recovery::failures`], and otherwise ignored; recovery then falls
    /// back to the remaining slot or to an empty state. The next save targets
    /// the slot opposite the one loaded.
    pub async fn recover(&self) -> Recovery {
        let mut best: Option<SnapshotFile> = None;
        let mut failures: Vec<(SlotId, EngineError)> = Vec::new();

        for slot in [SlotId::A, SlotId::B] {
            let path = self.path_for(slot);
            match fs::try_exists(path).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    failures.push((slot, err.into()));
                    continue;
                }
            }
            match read_snapshot(path).await {
                Ok(snapshot) => {
                    let newer = match &best {
                        Some(current) => snapshot.saved_at() > current.saved_at(),
                        None => true,
                    };
                    if newer {
                        best = Some(snapshot);
                    }
                }
                Err(err) => {
                    warn!(slot = %slot, ?err, "snapshot slot unreadable; skipping");
                    failures.push((slot, err));
                }
            }
        }

        let source = best.as_ref().map(SnapshotFile::slot);
        *self.next_slot.lock().await = source.map_or(SlotId::A, SlotId::other);

        Recovery {
            records: best.map(SnapshotFile::into_records).unwrap_or_default(),
            source,
            failures,
        }
    }
}
