//! Engine configuration.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::snapshot::SlotId;
use crate::{EngineError, EngineResult};

/// Configuration for a memory engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    max_entries: NonZeroUsize,
    save_interval: Duration,
    data_dir: PathBuf,
    default_max_distance: f64,
}

impl EngineConfig {
    /// Creates a configuration rooted at the provided data directory.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the maximum number of exchanges retained in memory.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: NonZeroUsize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Sets the interval between scheduled snapshot saves.
    #[must_use]
    pub fn with_save_interval(mut self, save_interval: Duration) -> Self {
        self.save_interval = save_interval;
        self
    }

    /// Sets the distance ceiling applied to searches that do not override it.
    #[must_use]
    pub fn with_default_max_distance(mut self, default_max_distance: f64) -> Self {
        self.default_max_distance = default_max_distance;
        self
    }

    /// Returns the maximum number of exchanges retained in memory.
    #[must_use]
    pub const fn max_entries(&self) -> NonZeroUsize {
        self.max_entries
    }

    /// Returns the interval between scheduled snapshot saves.
    #[must_use]
    pub const fn save_interval(&self) -> Duration {
        self.save_interval
    }

    /// Returns the directory holding the snapshot slots.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the default distance ceiling for searches.
    #[must_use]
    pub const fn default_max_distance(&self) -> f64 {
        self.default_max_distance
    }

    /// Returns the snapshot file path for the given slot.
    #[must_use]
    pub fn slot_path(&self, slot: SlotId) -> PathBuf {
        self.data_dir.join(slot.file_name())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] when the save interval is zero
    /// or the default distance ceiling is not finite and positive.
    pub fn validate(&self) -> EngineResult<()> {
        if self.save_interval.is_zero() {
            return Err(EngineError::InvalidConfig(
                "save interval must be greater than zero",
            ));
        }
        if !self.default_max_distance.is_finite() || self.default_max_distance <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "default max distance must be finite and positive",
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_entries: NonZeroUsize::new(100).expect("non-zero"),
            save_interval: Duration::from_secs(30),
            data_dir: PathBuf::from("stm_data"),
            default_max_distance: 2.0,
        }
    }
}
