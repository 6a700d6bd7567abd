//! The memory engine: bounded active storage, relevance search, archive
//! promotion and scheduled persistence.

use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

use tokio::fs;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use stm_primitives::{ExchangeId, Metadata};

use crate::archive::{Archive, DiscardArchive};
use crate::config::EngineConfig;
use crate::coordinate::Coordinate;
use crate::deriver::{CoordinateDeriver, LexicalDeriver};
use crate::error::{EngineError, EngineResult};
use crate::persist::SnapshotStore;
use crate::record::ExchangeRecord;
use crate::search::{SearchMatch, SearchOptions};
use crate::snapshot::SlotId;
use crate::store::ExchangeStore;

#[derive(Debug, Default)]
struct EngineCounters {
    added: AtomicU64,
    promotions: AtomicU64,
    promotion_failures: AtomicU64,
    searches: AtomicU64,
    matches_returned: AtomicU64,
    saves_completed: AtomicU64,
    save_failures: AtomicU64,
    recovered: AtomicU64,
}

struct EngineShared {
    config: EngineConfig,
    store: ExchangeStore,
    snapshots: SnapshotStore,
    counters: EngineCounters,
    generation: AtomicU64,
    saved_generation: AtomicU64,
    save_lock: Mutex<()>,
    status_tx: watch::Sender<SaveStatus>,
}

impl EngineShared {
    fn mark_dirty(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    fn is_dirty(&self) -> bool {
        self.generation.load(Ordering::Acquire) != self.saved_generation.load(Ordering::Acquire)
    }

    /// Copies the active records and writes them to the next slot.
    ///
    /// The save lock keeps the generation capture, the copy and the write
    /// together, so a slower save cannot overwrite a newer snapshot and then
    /// mark the newer generation clean.
    async fn run_save(&self) -> EngineResult<SlotId> {
        let _guard = self.save_lock.lock().await;
        let generation = self.generation.load(Ordering::Acquire);
        let records = self.store.all().await;
        match self.snapshots.save(records).await {
            Ok(slot) => {
                self.saved_generation.store(generation, Ordering::Release);
                self.counters.saves_completed.fetch_add(1, Ordering::Relaxed);
                self.publish_save_outcome(Ok(())).await;
                Ok(slot)
            }
            Err(err) => {
                self.counters.save_failures.fetch_add(1, Ordering::Relaxed);
                self.publish_save_outcome(Err(&err)).await;
                Err(err)
            }
        }
    }

    async fn publish_save_outcome(&self, outcome: Result<(), &EngineError>) {
        let mut status = self.status_tx.borrow().clone();
        status.saves_completed = self.counters.saves_completed.load(Ordering::Relaxed);
        status.save_failures = self.counters.save_failures.load(Ordering::Relaxed);
        status.next_slot = self.snapshots.next_slot().await;
        match outcome {
            Ok(()) => {
                status.last_saved_at = Some(SystemTime::now());
                status.last_error = None;
            }
            Err(err) => {
                status.last_error = Some(err.to_string());
            }
        }
        status.dirty = self.is_dirty();
        self.status_tx.send_replace(status);
    }
}

/// Snapshot of persistence health, published after every save attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveStatus {
    /// Snapshots written successfully since startup.
    pub saves_completed: u64,
    /// Save attempts that failed since startup.
    pub save_failures: u64,
    /// Slot the next save will write to.
    pub next_slot: SlotId,
    /// Wall-clock time of the last successful save, when one has happened.
    pub last_saved_at: Option<SystemTime>,
    /// Description of the most recent failure, cleared by the next success.
    pub last_error: Option<String>,
    /// Whether unsaved changes are pending.
    pub dirty: bool,
}

impl Default for SaveStatus {
    fn default() -> Self {
        Self {
            saves_completed: 0,
            save_failures: 0,
            next_slot: SlotId::A,
            last_saved_at: None,
            last_error: None,
            dirty: false,
        }
    }
}

/// Point-in-time activity and utilisation statistics for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    /// Exchanges accepted since startup.
    pub added: u64,
    /// Exchanges promoted to the archive since startup.
    pub promotions: u64,
    /// Promotions whose archive append failed.
    pub promotion_failures: u64,
    /// Relevance searches executed since startup.
    pub searches: u64,
    /// Matches returned across all searches.
    pub matches_returned: u64,
    /// Snapshots written successfully since startup.
    pub saves_completed: u64,
    /// Save attempts that failed since startup.
    pub save_failures: u64,
    /// Records loaded from disk at startup.
    pub recovered: u64,
    /// Exchanges currently held in active memory.
    pub entries: usize,
    /// Maximum number of active exchanges.
    pub capacity: usize,
    /// Whether unsaved changes are pending.
    pub dirty: bool,
    /// Slot the next save will write to.
    pub next_slot: SlotId,
}

/// Details of an exchange promoted out of active memory.
#[derive(Debug, Clone)]
pub struct Promotion {
    evicted: ExchangeRecord,
    archived: bool,
    warning: Option<String>,
}

impl Promotion {
    /// Returns the record evicted from active memory.
    #[must_use]
    pub fn evicted(&self) -> &ExchangeRecord {
        &self.evicted
    }

    /// Returns whether the archive accepted the record.
    #[must_use]
    pub const fn archived(&self) -> bool {
        self.archived
    }

    /// Returns the archive failure description, when the append failed.
    #[must_use]
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }
}

/// Receipt returned after an exchange is accepted into active memory.
#[derive(Debug, Clone)]
pub struct ExchangeReceipt {
    id: ExchangeId,
    coordinate: Coordinate,
    summary: String,
    entries: usize,
    promotion: Option<Promotion>,
}

impl ExchangeReceipt {
    /// Returns the id assigned to the stored exchange.
    #[must_use]
    pub const fn id(&self) -> ExchangeId {
        self.id
    }

    /// Returns the coordinate derived for the exchange.
    #[must_use]
    pub const fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }

    /// Returns the derived coordinate's grid key.
    #[must_use]
    pub fn coordinate_key(&self) -> String {
        self.coordinate.key()
    }

    /// Returns the summary stored alongside the exchange.
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Returns the number of active exchanges after the insertion.
    #[must_use]
    pub const fn entries(&self) -> usize {
        self.entries
    }

    /// Returns the promotion this insertion triggered, when capacity was
    /// exceeded.
    #[must_use]
    pub const fn promotion(&self) -> Option<&Promotion> {
        self.promotion.as_ref()
    }
}

/// Conversational context assembled for a new user input.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    recent: Vec<ExchangeRecord>,
    relevant: Vec<SearchMatch>,
    query_summary: String,
}

impl ContextBundle {
    /// Returns the most recent exchanges, oldest first.
    #[must_use]
    pub fn recent(&self) -> &[ExchangeRecord] {
        &self.recent
    }

    /// Returns relevant matches not already present in the recent window.
    #[must_use]
    pub fn relevant(&self) -> &[SearchMatch] {
        &self.relevant
    }

    /// Returns the summary derived from the query text.
    #[must_use]
    pub fn query_summary(&self) -> &str {
        &self.query_summary
    }
}

/// Builder assembling a [`MemoryEngine`] with optional collaborators.
pub struct EngineBuilder {
    config: EngineConfig,
    deriver: Arc<dyn CoordinateDeriver>,
    archive: Arc<dyn Archive>,
}

impl EngineBuilder {
    /// Creates a builder with the default deriver and a discarding archive.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            deriver: Arc::new(LexicalDeriver::new()),
            archive: Arc::new(DiscardArchive),
        }
    }

    /// Replaces the coordinate deriver.
    #[must_use]
    pub fn with_deriver(mut self, deriver: Arc<dyn CoordinateDeriver>) -> Self {
        self.deriver = deriver;
        self
    }

    /// Replaces the archive that receives promoted exchanges.
    #[must_use]
    pub fn with_archive(mut self, archive: Arc<dyn Archive>) -> Self {
        self.archive = archive;
        self
    }

    /// Validates the configuration, recovers persisted state and starts the
    /// scheduled save worker.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid or the data
    /// directory cannot be created. Unreadable snapshot slots are logged and
    /// skipped rather than failing the open.
    pub async fn open(self) -> EngineResult<MemoryEngine> {
        self.config.validate()?;
        fs::create_dir_all(self.config.data_dir()).await?;

        let snapshots = SnapshotStore::new(
            self.config.slot_path(SlotId::A),
            self.config.slot_path(SlotId::B),
        );
        let recovery = snapshots.recover().await;
        for (slot, err) in recovery.failures() {
            warn!(slot = %slot, ?err, "snapshot slot unusable during recovery");
        }
        let source = recovery.source();
        let recovered_count = recovery.records().len();

        let store = ExchangeStore::new(self.config.max_entries());
        let loaded = store.hydrate(recovery.into_records()).await;
        if loaded < recovered_count {
            warn!(
                recovered = recovered_count,
                loaded, "snapshot exceeded capacity; oldest records dropped"
            );
        }
        match source {
            Some(slot) => {
                info!(slot = %slot, entries = loaded, "recovered active memory from snapshot");
            }
            None => info!("starting with empty active memory"),
        }

        let next_slot = snapshots.next_slot().await;
        let (status_tx, status_rx) = watch::channel(SaveStatus {
            next_slot,
            ..SaveStatus::default()
        });

        let shared = Arc::new(EngineShared {
            config: self.config,
            store,
            snapshots,
            counters: EngineCounters::default(),
            generation: AtomicU64::new(0),
            saved_generation: AtomicU64::new(0),
            save_lock: Mutex::new(()),
            status_tx,
        });
        shared
            .counters
            .recovered
            .store(loaded as u64, Ordering::Relaxed);

        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = tokio::spawn(run_save_worker(Arc::clone(&shared), Arc::clone(&shutdown)));

        Ok(MemoryEngine {
            shared,
            deriver: self.deriver,
            archive: self.archive,
            status_rx,
            shutdown,
            worker: Mutex::new(Some(worker)),
        })
    }
}

/// Bounded conversational memory with relevance search and crash-safe
/// persistence.
///
/// The engine holds the most recent exchanges in RAM, promotes the oldest to
/// an [`Archive`] when capacity is exceeded, and snapshots its contents to
/// alternating slot files on a schedule. Clone-free sharing across tasks
/// works through `Arc<MemoryEngine>`; every method takes `&self`.
pub struct MemoryEngine {
    shared: Arc<EngineShared>,
    deriver: Arc<dyn CoordinateDeriver>,
    archive: Arc<dyn Archive>,
    status_rx: watch::Receiver<SaveStatus>,
    shutdown: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryEngine {
    /// Returns a builder for customising collaborators before opening.
    #[must_use]
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Opens an engine with the default deriver and a discarding archive.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid or the data
    /// directory cannot be created.
    pub async fn open(config: EngineConfig) -> EngineResult<Self> {
        EngineBuilder::new(config).open().await
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Derives a coordinate for the exchange and stores it, promoting the
    /// oldest exchange when capacity is exceeded.
    ///
    /// Archive failures do not fail the insertion. They are counted, logged
    /// and surfaced through [`Promotion::warning`] on the receipt.
    ///
    /// # Errors
    ///
    /// Returns an error when either text is blank or the metadata fails
    /// validation.
    pub async fn add_exchange(
        &self,
        user_text: &str,
        response_text: &str,
        metadata: Metadata,
    ) -> EngineResult<ExchangeReceipt> {
        let derivation = self.deriver.derive(user_text, response_text)?;
        let record = ExchangeRecord::builder(user_text, response_text, *derivation.coordinate())
            .summary(derivation.summary())
            .merge_metadata(metadata)?
            .build()?;

        let id = record.id();
        let coordinate = *record.coordinate();
        let summary = record.summary().to_owned();

        let evicted = self.shared.store.insert(record).await?;
        self.shared.counters.added.fetch_add(1, Ordering::Relaxed);
        self.shared.mark_dirty();

        let promotion = match evicted {
            Some(evicted) => Some(self.promote(evicted).await),
            None => None,
        };
        let entries = self.shared.store.len().await;
        debug!(id = %id, entries, "exchange stored");

        Ok(ExchangeReceipt {
            id,
            coordinate,
            summary,
            entries,
            promotion,
        })
    }

    async fn promote(&self, evicted: ExchangeRecord) -> Promotion {
        self.shared
            .counters
            .promotions
            .fetch_add(1, Ordering::Relaxed);
        match self.archive.append(&evicted).await {
            Ok(()) => {
                debug!(id = %evicted.id(), "exchange promoted to archive");
                Promotion {
                    evicted,
                    archived: true,
                    warning: None,
                }
            }
            Err(err) => {
                self.shared
                    .counters
                    .promotion_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(id = %evicted.id(), ?err, "archive append failed; promoted exchange dropped");
                Promotion {
                    evicted,
                    archived: false,
                    warning: Some(err.to_string()),
                }
            }
        }
    }

    /// Searches active memory for exchanges relevant to `query_text`.
    ///
    /// # Errors
    ///
    /// Returns an error when the query text is blank.
    pub async fn search(
        &self,
        query_text: &str,
        options: SearchOptions,
    ) -> EngineResult<Vec<SearchMatch>> {
        let derivation = self.deriver.derive_query(query_text)?;
        Ok(self.search_at(derivation.coordinate(), options).await)
    }

    /// Searches active memory around an already-derived coordinate.
    ///
    /// Falls back to the configured default distance ceiling when the
    /// options do not override it.
    pub async fn search_at(&self, query: &Coordinate, options: SearchOptions) -> Vec<SearchMatch> {
        let max_distance = options
            .max_distance()
            .unwrap_or(self.shared.config.default_max_distance());
        let matches = self
            .shared
            .store
            .search(query, options.max_results().get(), max_distance)
            .await;
        self.shared.counters.searches.fetch_add(1, Ordering::Relaxed);
        self.shared
            .counters
            .matches_returned
            .fetch_add(matches.len() as u64, Ordering::Relaxed);
        matches
    }

    /// Returns the exchange with `id`, when it is still in active memory.
    pub async fn get(&self, id: ExchangeId) -> Option<ExchangeRecord> {
        self.shared.store.get(id).await
    }

    /// Returns every active exchange, oldest first.
    pub async fn all(&self) -> Vec<ExchangeRecord> {
        self.shared.store.all().await
    }

    /// Returns the `limit` most recent exchanges, oldest first.
    pub async fn recent(&self, limit: usize) -> Vec<ExchangeRecord> {
        self.shared.store.recent(limit).await
    }

    /// Returns the number of active exchanges.
    pub async fn len(&self) -> usize {
        self.shared.store.len().await
    }

    /// Returns whether active memory is empty.
    pub async fn is_empty(&self) -> bool {
        self.shared.store.is_empty().await
    }

    /// Assembles recent plus relevant context for a new user input.
    ///
    /// Relevant matches already present in the recent window are dropped so
    /// the bundle never repeats an exchange.
    ///
    /// # Errors
    ///
    /// Returns an error when the input text is blank.
    pub async fn build_context(
        &self,
        user_input: &str,
        recent_count: usize,
        relevant_count: usize,
    ) -> EngineResult<ContextBundle> {
        let derivation = self.deriver.derive_query(user_input)?;
        let recent = self.shared.store.recent(recent_count).await;
        let relevant = match NonZeroUsize::new(relevant_count) {
            Some(max_results) => {
                let options = SearchOptions::new().with_max_results(max_results);
                let seen: HashSet<ExchangeId> = recent.iter().map(ExchangeRecord::id).collect();
                self.search_at(derivation.coordinate(), options)
                    .await
                    .into_iter()
                    .filter(|candidate| !seen.contains(&candidate.record().id()))
                    .collect()
            }
            None => Vec::new(),
        };
        Ok(ContextBundle {
            recent,
            relevant,
            query_summary: derivation.summary().to_owned(),
        })
    }

    /// Removes every active exchange and returns how many were removed.
    ///
    /// Archived copies and existing snapshots are not touched; the next save
    /// persists the emptied state.
    pub async fn clear(&self) -> usize {
        let removed = self.shared.store.len().await;
        self.shared.store.clear().await;
        self.shared.mark_dirty();
        info!(removed, "active memory cleared");
        removed
    }

    /// Writes a snapshot immediately, regardless of the dirty state.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be written. The failure is
    /// also recorded in the save status, and the same slot is retried on the
    /// next save.
    pub async fn save_now(&self) -> EngineResult<SlotId> {
        self.shared.run_save().await
    }

    /// Returns activity statistics for the engine.
    pub async fn stats(&self) -> EngineStats {
        let store = self.shared.store.stats().await;
        let counters = &self.shared.counters;
        EngineStats {
            added: counters.added.load(Ordering::Relaxed),
            promotions: counters.promotions.load(Ordering::Relaxed),
            promotion_failures: counters.promotion_failures.load(Ordering::Relaxed),
            searches: counters.searches.load(Ordering::Relaxed),
            matches_returned: counters.matches_returned.load(Ordering::Relaxed),
            saves_completed: counters.saves_completed.load(Ordering::Relaxed),
            save_failures: counters.save_failures.load(Ordering::Relaxed),
            recovered: counters.recovered.load(Ordering::Relaxed),
            entries: store.entries,
            capacity: store.capacity,
            dirty: self.shared.is_dirty(),
            next_slot: self.shared.snapshots.next_slot().await,
        }
    }

    /// Returns the current persistence status.
    #[must_use]
    pub fn save_status(&self) -> SaveStatus {
        let mut status = self.status_rx.borrow().clone();
        status.dirty = self.shared.is_dirty();
        status
    }

    /// Returns a watch receiver notified after every save attempt.
    #[must_use]
    pub fn subscribe_save_status(&self) -> watch::Receiver<SaveStatus> {
        self.status_rx.clone()
    }

    /// Stops the save worker and writes a final snapshot when changes are
    /// pending. Calling close again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error when the final snapshot cannot be written.
    pub async fn close(&self) -> EngineResult<()> {
        self.shutdown.store(true, Ordering::Release);
        if let Some(worker) = self.worker.lock().await.take() {
            worker.abort();
            let _ = worker.await;
        }
        if self.shared.is_dirty() {
            let slot = self.shared.run_save().await?;
            debug!(slot = %slot, "final snapshot written on close");
        }
        info!("memory engine closed");
        Ok(())
    }
}

impl fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("data_dir", &self.shared.config.data_dir())
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Drop for MemoryEngine {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Ok(mut guard) = self.worker.try_lock() {
            if let Some(worker) = guard.take() {
                worker.abort();
            }
        }
    }
}

/// Periodically snapshots the store while it has unsaved changes.
async fn run_save_worker(shared: Arc<EngineShared>, shutdown: Arc<AtomicBool>) {
    let mut ticker = interval(shared.config.save_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so the initial cycle waits a
    // full interval.
    ticker.tick().await;

    while !shutdown.load(Ordering::Acquire) {
        ticker.tick().await;
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        if !shared.is_dirty() {
            continue;
        }
        match shared.run_save().await {
            Ok(slot) => debug!(slot = %slot, "scheduled save completed"),
            Err(err) => warn!(?err, "scheduled save failed; will retry next interval"),
        }
    }
}
