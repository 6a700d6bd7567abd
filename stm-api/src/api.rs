//! Service facade translating engine calls into serialisable envelopes.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use stm_core::{ExchangeRecord, MemoryEngine, Promotion, SearchMatch, SearchOptions, SlotId};
use stm_primitives::Metadata;

use crate::envelope::{ApiResponse, unix_seconds};
use crate::export::{ExportFormat, render};

/// Cloneable service handle exposing the engine as envelope-returning
/// operations.
///
/// Each method maps one engine operation to an [`ApiResponse`] whose payload
/// serialises cleanly to JSON, making the facade suitable for any transport
/// that moves documents rather than Rust values.
#[derive(Debug, Clone)]
pub struct MemoryApi {
    engine: Arc<MemoryEngine>,
}

/// Serialisable view of a stored exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeView {
    /// Exchange identifier.
    pub id: String,
    /// Seconds since the Unix epoch when the exchange was stored.
    pub timestamp: f64,
    /// Text supplied by the user.
    pub user_message: String,
    /// Text produced in response.
    pub assistant_response: String,
    /// Short summary derived from the user text.
    pub summary: String,
    /// Grid key of the derived coordinate.
    pub coordinate_key: String,
    /// Raw coordinate components.
    pub coordinate: Vec<f64>,
    /// Caller-supplied metadata.
    pub metadata: Metadata,
}

impl ExchangeView {
    pub(crate) fn from_record(record: &ExchangeRecord) -> Self {
        Self {
            id: record.id().to_string(),
            timestamp: unix_seconds(record.created_at()),
            user_message: record.user_text().to_owned(),
            assistant_response: record.response_text().to_owned(),
            summary: record.summary().to_owned(),
            coordinate_key: record.coordinate_key(),
            coordinate: record.coordinate().as_slice().to_vec(),
            metadata: record.metadata().clone(),
        }
    }
}

/// A search result, flattened over the exchange fields.
#[derive(Debug, Clone, Serialize)]
pub struct MatchView {
    /// The matched exchange.
    #[serde(flatten)]
    pub exchange: ExchangeView,
    /// Euclidean distance from the query coordinate.
    pub distance: f64,
    /// Bounded relevance score.
    pub relevance: f64,
}

impl MatchView {
    pub(crate) fn from_match(found: &SearchMatch) -> Self {
        Self {
            exchange: ExchangeView::from_record(found.record()),
            distance: found.distance(),
            relevance: found.relevance(),
        }
    }
}

/// Payload returned after storing an exchange.
#[derive(Debug, Clone, Serialize)]
pub struct AddedView {
    /// Identifier assigned to the stored exchange.
    pub id: String,
    /// Grid key of the derived coordinate.
    pub coordinate_key: String,
    /// Summary stored alongside the exchange.
    pub summary: String,
    /// Active entries after the insertion.
    pub active_entries: usize,
    /// Promotion triggered by the insertion, when capacity was exceeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted: Option<PromotionView>,
}

/// Payload describing an exchange promoted out of active memory.
#[derive(Debug, Clone, Serialize)]
pub struct PromotionView {
    /// Identifier of the evicted exchange.
    pub evicted_id: String,
    /// Whether the archive accepted the record.
    pub archived: bool,
    /// Archive failure description, when the append failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl PromotionView {
    fn from_promotion(promotion: &Promotion) -> Self {
        Self {
            evicted_id: promotion.evicted().id().to_string(),
            archived: promotion.archived(),
            warning: promotion.warning().map(str::to_owned),
        }
    }
}

/// Payload bundling recent and relevant context for a new input.
#[derive(Debug, Clone, Serialize)]
pub struct ContextView {
    /// Most recent exchanges, oldest first.
    pub recent: Vec<ExchangeView>,
    /// Relevant matches not already in the recent window.
    pub relevant: Vec<MatchView>,
    /// Summary derived from the query text.
    pub query_summary: String,
}

/// Payload reporting activity statistics and persistence health.
#[derive(Debug, Clone, Serialize)]
pub struct StatisticsView {
    /// Exchanges accepted since startup.
    pub total_added: u64,
    /// Exchanges promoted to the archive since startup.
    pub total_promoted: u64,
    /// Promotions whose archive append failed.
    pub promotion_failures: u64,
    /// Relevance searches executed since startup.
    pub total_searches: u64,
    /// Matches returned across all searches.
    pub matches_returned: u64,
    /// Records loaded from disk at startup.
    pub recovered_entries: u64,
    /// Exchanges currently held in active memory.
    pub active_entries: usize,
    /// Maximum number of active exchanges.
    pub max_entries: usize,
    /// Persistence health.
    pub persistence: SaveStatusView,
    /// Echo of the engine configuration.
    pub configuration: ConfigView,
}

/// Payload echoing the engine configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigView {
    /// Maximum exchanges kept in active memory.
    pub max_entries: usize,
    /// Seconds between scheduled snapshot saves.
    pub save_interval_secs: u64,
    /// Directory holding the snapshot slots.
    pub data_dir: String,
    /// Distance ceiling applied to searches that do not override it.
    pub default_max_distance: f64,
}

/// Payload describing snapshot persistence health.
#[derive(Debug, Clone, Serialize)]
pub struct SaveStatusView {
    /// Snapshots written successfully since startup.
    pub saves_completed: u64,
    /// Save attempts that failed since startup.
    pub save_failures: u64,
    /// Slot the next save will write to.
    pub next_slot: String,
    /// Unix seconds of the last successful save.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_saved_at: Option<f64>,
    /// Seconds elapsed since the last successful save.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_since_save: Option<f64>,
    /// Description of the most recent failure, cleared by the next success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Whether unsaved changes are pending.
    pub dirty: bool,
    /// Whether slot A currently exists on disk.
    pub slot_a_exists: bool,
    /// Whether slot B currently exists on disk.
    pub slot_b_exists: bool,
}

/// Payload carrying a rendered export document.
#[derive(Debug, Clone, Serialize)]
pub struct ExportView {
    /// Format the export was rendered in.
    pub format: String,
    /// Number of conversations exported.
    pub entries: usize,
    /// The rendered document.
    pub content: String,
}

/// Payload confirming a snapshot write.
#[derive(Debug, Clone, Serialize)]
pub struct SavedView {
    /// Slot the snapshot landed in.
    pub slot: String,
}

/// Payload confirming a memory clear.
#[derive(Debug, Clone, Serialize)]
pub struct ClearedView {
    /// Number of exchanges removed.
    pub removed_entries: usize,
}

impl MemoryApi {
    /// Wraps an engine handle.
    #[must_use]
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self { engine }
    }

    /// Returns the underlying engine handle.
    #[must_use]
    pub fn engine(&self) -> &Arc<MemoryEngine> {
        &self.engine
    }

    /// Stores a user/assistant exchange.
    pub async fn add_conversation(
        &self,
        user_message: &str,
        assistant_response: &str,
        metadata: Metadata,
    ) -> ApiResponse<AddedView> {
        match self
            .engine
            .add_exchange(user_message, assistant_response, metadata)
            .await
        {
            Ok(receipt) => ApiResponse::ok(AddedView {
                id: receipt.id().to_string(),
                coordinate_key: receipt.coordinate_key(),
                summary: receipt.summary().to_owned(),
                active_entries: receipt.entries(),
                promoted: receipt.promotion().map(PromotionView::from_promotion),
            }),
            Err(err) => ApiResponse::err(err.to_string()),
        }
    }

    /// Searches stored conversations for entries relevant to `query`.
    pub async fn search_relevant(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> ApiResponse<Vec<MatchView>> {
        match self.engine.search(query, options).await {
            Ok(matches) => ApiResponse::ok(matches.iter().map(MatchView::from_match).collect()),
            Err(err) => ApiResponse::err(err.to_string()),
        }
    }

    /// Builds recent plus relevant context for a new user input.
    pub async fn get_context(
        &self,
        user_input: &str,
        recent_count: usize,
        relevant_count: usize,
    ) -> ApiResponse<ContextView> {
        match self
            .engine
            .build_context(user_input, recent_count, relevant_count)
            .await
        {
            Ok(bundle) => ApiResponse::ok(ContextView {
                recent: bundle
                    .recent()
                    .iter()
                    .map(ExchangeView::from_record)
                    .collect(),
                relevant: bundle
                    .relevant()
                    .iter()
                    .map(MatchView::from_match)
                    .collect(),
                query_summary: bundle.query_summary().to_owned(),
            }),
            Err(err) => ApiResponse::err(err.to_string()),
        }
    }

    /// Returns the most recent conversations, oldest first.
    pub async fn recent_conversations(&self, limit: usize) -> ApiResponse<Vec<ExchangeView>> {
        let records = self.engine.recent(limit).await;
        ApiResponse::ok(records.iter().map(ExchangeView::from_record).collect())
    }

    /// Returns activity statistics together with persistence health.
    pub async fn statistics(&self) -> ApiResponse<StatisticsView> {
        let stats = self.engine.stats().await;
        let status = self.engine.save_status();
        let config = self.engine.config();
        let slot_a_exists = tokio::fs::try_exists(config.slot_path(SlotId::A))
            .await
            .unwrap_or(false);
        let slot_b_exists = tokio::fs::try_exists(config.slot_path(SlotId::B))
            .await
            .unwrap_or(false);
        let seconds_since_save = status
            .last_saved_at
            .and_then(|at| at.elapsed().ok())
            .map(|elapsed| elapsed.as_secs_f64());

        ApiResponse::ok(StatisticsView {
            total_added: stats.added,
            total_promoted: stats.promotions,
            promotion_failures: stats.promotion_failures,
            total_searches: stats.searches,
            matches_returned: stats.matches_returned,
            recovered_entries: stats.recovered,
            active_entries: stats.entries,
            max_entries: stats.capacity,
            persistence: SaveStatusView {
                saves_completed: status.saves_completed,
                save_failures: status.save_failures,
                next_slot: status.next_slot.to_string(),
                last_saved_at: status.last_saved_at.map(unix_seconds),
                seconds_since_save,
                last_error: status.last_error,
                dirty: status.dirty,
                slot_a_exists,
                slot_b_exists,
            },
            configuration: ConfigView {
                max_entries: config.max_entries().get(),
                save_interval_secs: config.save_interval().as_secs(),
                data_dir: config.data_dir().display().to_string(),
                default_max_distance: config.default_max_distance(),
            },
        })
    }

    /// Renders stored conversations as a portable document.
    pub async fn export_conversations(
        &self,
        format: ExportFormat,
        include_coordinates: bool,
    ) -> ApiResponse<ExportView> {
        let records = self.engine.all().await;
        match render(&records, format, include_coordinates) {
            Ok(content) => ApiResponse::ok(ExportView {
                format: format.to_string(),
                entries: records.len(),
                content,
            }),
            Err(err) => ApiResponse::err(format!("export failed: {err}")),
        }
    }

    /// Writes a snapshot immediately.
    pub async fn save_now(&self) -> ApiResponse<SavedView> {
        match self.engine.save_now().await {
            Ok(slot) => ApiResponse::ok(SavedView {
                slot: slot.to_string(),
            }),
            Err(err) => ApiResponse::err(err.to_string()),
        }
    }

    /// Clears active memory and persists the emptied state.
    ///
    /// Refuses to act unless `confirm` is set, so a stray call cannot wipe
    /// the conversation window.
    pub async fn clear_memory(&self, confirm: bool) -> ApiResponse<ClearedView> {
        if !confirm {
            return ApiResponse::err("confirmation required: pass confirm=true to clear memory");
        }
        let removed_entries = self.engine.clear().await;
        info!(removed_entries, "memory cleared through the api");
        match self.engine.save_now().await {
            Ok(_) => ApiResponse::ok(ClearedView { removed_entries }),
            Err(err) => ApiResponse::err(format!("memory cleared but save failed: {err}")),
        }
    }

    /// Stops the engine's save worker, flushing pending changes first.
    pub async fn shutdown(&self) -> ApiResponse<()> {
        match self.engine.close().await {
            Ok(()) => {
                info!("api shut down");
                ApiResponse::ok(())
            }
            Err(err) => ApiResponse::err(err.to_string()),
        }
    }
}
