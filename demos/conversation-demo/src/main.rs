//! Scripted tour of the semantic short-term memory engine.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use stm_api::{ExportFormat, MemoryApi};
use stm_core::{Archive, EngineConfig, MemoryEngine, RecordingArchive, SearchOptions};
use stm_primitives::Metadata;

#[derive(Debug, Parser)]
#[command(about = "Scripted tour of the semantic short-term memory engine")]
struct Args {
    /// Directory the snapshot slots are written to.
    #[arg(long, default_value = "stm_demo_data")]
    data_dir: String,

    /// Maximum exchanges kept in active memory.
    #[arg(long, default_value_t = 6)]
    max_entries: usize,

    /// Seconds between scheduled snapshot saves.
    #[arg(long, default_value_t = 5)]
    save_interval_secs: u64,

    /// Keep running until ctrl-c so scheduled saves can be observed.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let args = Args::parse();

    info!("=== Semantic STM: Conversation Demo ===\n");

    let max_entries =
        NonZeroUsize::new(args.max_entries).context("max-entries must be at least 1")?;
    let config = EngineConfig::new(&args.data_dir)
        .with_max_entries(max_entries)
        .with_save_interval(Duration::from_secs(args.save_interval_secs));

    let archive = Arc::new(RecordingArchive::new());
    let engine = Arc::new(
        MemoryEngine::builder(config)
            .with_archive(Arc::clone(&archive) as Arc<dyn Archive>)
            .open()
            .await?,
    );
    let api = MemoryApi::new(Arc::clone(&engine));

    seed_conversation(&engine).await?;
    relevance_search(&engine).await?;
    context_assembly(&engine).await?;
    promoted_history(&archive).await;
    service_surface(&api).await?;

    if args.watch {
        info!(
            "Watching; scheduled saves run every {}s. Press ctrl-c to close.",
            args.save_interval_secs
        );
        tokio::signal::ctrl_c().await?;
    }

    engine.close().await?;
    info!("=== Demo complete ===");
    Ok(())
}

/// Step 1: feed a scripted travel conversation through the engine.
async fn seed_conversation(engine: &MemoryEngine) -> Result<()> {
    info!("--- Step 1: Store a conversation ---");

    let exchanges = [
        (
            "I want to plan a trip to Lisbon in October.",
            "Great choice, October is mild in Lisbon.",
        ),
        (
            "What neighbourhoods should we stay in?",
            "Alfama for character, Baixa for convenience.",
        ),
        (
            "We'd like somewhere quiet with a view.",
            "Then look at Graca, up the hill from Alfama.",
        ),
        (
            "How do we get around the city?",
            "Trams and the metro cover almost everything.",
        ),
        (
            "Is the number 28 tram really worth it?",
            "Yes, ride it early before the queues build.",
        ),
        (
            "Where should we eat near Graca?",
            "Try the small tascas along the miradouro.",
        ),
        (
            "Can you book a table for Friday night?",
            "Booked for two at eight near the viewpoint.",
        ),
        (
            "What's the weather usually like then?",
            "Around twenty degrees, with some rain.",
        ),
    ];

    for (user, response) in exchanges {
        let mut metadata = Metadata::new();
        metadata.insert("topic".into(), "lisbon-trip".into());
        let receipt = engine.add_exchange(user, response, metadata).await?;
        match receipt.promotion() {
            Some(promotion) => info!(
                "Stored {} and promoted {} (archived: {})",
                receipt.id(),
                promotion.evicted().id(),
                promotion.archived()
            ),
            None => info!("Stored {} at {}", receipt.id(), receipt.coordinate_key()),
        }
    }

    info!("Active entries: {}\n", engine.len().await);
    Ok(())
}

/// Step 2: run relevance searches against the stored window.
async fn relevance_search(engine: &MemoryEngine) -> Result<()> {
    info!("--- Step 2: Relevance search ---");

    let queries = [
        "where should we stay",
        "getting around by tram",
        "dinner reservation",
    ];
    for query in queries {
        let options = SearchOptions::new()
            .with_max_results(NonZeroUsize::new(3).expect("non-zero"));
        let matches = engine.search(query, options).await?;
        info!("Query '{}' returned {} match(es)", query, matches.len());
        for found in &matches {
            info!(
                "  relevance {:.2} at distance {:.3}: {}",
                found.relevance(),
                found.distance(),
                found.record().summary()
            );
        }
    }

    info!("");
    Ok(())
}

/// Step 3: build the context bundle an agent would prepend to its prompt.
async fn context_assembly(engine: &MemoryEngine) -> Result<()> {
    info!("--- Step 3: Context assembly ---");

    let bundle = engine
        .build_context("any tips for our Lisbon evenings?", 3, 3)
        .await?;
    info!("Query summary: {}", bundle.query_summary());
    for record in bundle.recent() {
        info!("  recent: {}", record.summary());
    }
    for found in bundle.relevant() {
        info!(
            "  relevant ({:.2}): {}",
            found.relevance(),
            found.record().summary()
        );
    }

    info!("");
    Ok(())
}

/// Step 4: show what the archive received from capacity promotions.
async fn promoted_history(archive: &RecordingArchive) {
    info!("--- Step 4: Promoted history ---");

    for record in archive.records().await {
        info!("  archived: {}", record.summary());
    }

    info!("Archive holds {} exchange(s)\n", archive.len().await);
}

/// Step 5: exercise the envelope API with a save, statistics and an export.
async fn service_surface(api: &MemoryApi) -> Result<()> {
    info!("--- Step 5: Service surface ---");

    let saved = api.save_now().await;
    if let Some(view) = saved.data {
        info!("Snapshot written to slot {}", view.slot);
    }

    let stats = api.statistics().await;
    if let Some(view) = stats.data {
        info!("Statistics:\n{}", serde_json::to_string_pretty(&view)?);
    }

    let export = api.export_conversations(ExportFormat::Csv, false).await;
    if let Some(view) = export.data {
        info!("CSV export of {} conversation(s):\n{}", view.entries, view.content);
    }

    info!("");
    Ok(())
}
