//! On-disk snapshot format and atomic slot file I/O.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{EngineError, EngineResult};
use crate::record::ExchangeRecord;

/// Version stamped into every snapshot file.
///
/// Readers reject snapshots carrying any other version rather than guessing
/// at their layout.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Identifier of one of the two alternating snapshot slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotId {
    /// First slot, written on the initial save.
    A,
    /// Second slot.
    B,
}

impl SlotId {
    /// Returns the opposite slot.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Returns the file name this slot is stored under.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::A => "snapshot-a.json",
            Self::B => "snapshot-b.json",
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("a"),
            Self::B => f.write_str("b"),
        }
    }
}

/// Complete contents of one snapshot slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    version: u32,
    saved_at: SystemTime,
    slot: SlotId,
    records: Vec<ExchangeRecord>,
}

impl SnapshotFile {
    /// Creates a snapshot of the given records, stamped with the current
    /// time.
    #[must_use]
    pub fn new(slot: SlotId, records: Vec<ExchangeRecord>) -> Self {
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            saved_at: SystemTime::now(),
            slot,
            records,
        }
    }

    /// Returns the format version the file was written with.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Returns the wall-clock time the snapshot was taken.
    #[must_use]
    pub const fn saved_at(&self) -> SystemTime {
        self.saved_at
    }

    /// Returns the slot this snapshot was written to.
    #[must_use]
    pub const fn slot(&self) -> SlotId {
        self.slot
    }

    /// Returns the snapshotted records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[ExchangeRecord] {
        &self.records
    }

    /// Consumes the snapshot and returns its records.
    #[must_use]
    pub fn into_records(self) -> Vec<ExchangeRecord> {
        self.records
    }

    /// Checks the snapshot for structural problems beyond JSON validity.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SnapshotInvalid`] on a version mismatch or when
    /// two records share an exchange id.
    pub fn validate(&self) -> EngineResult<()> {
        if self.version != SNAPSHOT_FORMAT_VERSION {
            return Err(EngineError::snapshot_invalid(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_FORMAT_VERSION})",
                self.version
            )));
        }
        let mut seen = HashSet::with_capacity(self.records.len());
        for record in &self.records {
            if !seen.insert(record.id()) {
                return Err(EngineError::snapshot_invalid(format!(
                    "duplicate exchange id {} in snapshot",
                    record.id()
                )));
            }
        }
        Ok(())
    }
}

/// Reads and validates the snapshot stored at `path`.
pub(crate) async fn read_snapshot(path: &Path) -> EngineResult<SnapshotFile> {
    let bytes = fs::read(path).await?;
    let snapshot: SnapshotFile = serde_json::from_slice(&bytes)?;
    snapshot.validate()?;
    Ok(snapshot)
}

/// Writes `snapshot` to `path` atomically.
///
/// The bytes land in a sibling temporary file first, are synced to disk, and
/// only then renamed over the destination. A crash mid-write leaves the
/// previous slot contents untouched.
pub(crate) async fn write_snapshot(path: &Path, snapshot: &SnapshotFile) -> EngineResult<()> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&tmp, path).await?;
    Ok(())
}
