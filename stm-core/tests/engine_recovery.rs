//! End-to-end persistence and recovery behaviour across engine restarts.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use stm_core::{EngineConfig, MemoryEngine, SlotId};
use stm_primitives::{Metadata, MetadataValue};
use uuid::Uuid;

fn temp_data_dir() -> PathBuf {
    std::env::temp_dir().join(format!("stm-recovery-{}", Uuid::new_v4()))
}

// A long interval keeps the scheduled worker out of these tests; saves only
// happen through save_now and close.
fn quiet_config(data_dir: &PathBuf) -> EngineConfig {
    EngineConfig::new(data_dir)
        .with_max_entries(NonZeroUsize::new(10).unwrap())
        .with_save_interval(Duration::from_secs(3600))
}

#[tokio::test]
async fn restart_restores_exchanges_in_order() {
    let dir = temp_data_dir();

    let engine = MemoryEngine::open(quiet_config(&dir)).await.unwrap();
    let mut metadata = Metadata::new();
    metadata.insert("topic".into(), "booking".into());
    let first = engine
        .add_exchange("Can you book a table for Friday?", "Done, eight o'clock.", metadata)
        .await
        .unwrap();
    let second = engine
        .add_exchange("Make it nine instead.", "Moved to nine.", Metadata::new())
        .await
        .unwrap();
    let third = engine
        .add_exchange("Add a note about the terrace.", "Noted.", Metadata::new())
        .await
        .unwrap();
    let before = engine.all().await;
    engine.close().await.unwrap();
    drop(engine);

    let reopened = MemoryEngine::open(quiet_config(&dir)).await.unwrap();
    let after = reopened.all().await;

    assert_eq!(after.len(), 3);
    let expected_ids = [first.id(), second.id(), third.id()];
    for (index, record) in after.iter().enumerate() {
        assert_eq!(record.id(), expected_ids[index]);
        assert_eq!(record.user_text(), before[index].user_text());
        assert_eq!(record.coordinate(), before[index].coordinate());
        assert_eq!(record.created_at(), before[index].created_at());
    }
    assert_eq!(
        after[0].metadata().get("topic"),
        Some(&MetadataValue::Text("booking".into()))
    );
    assert_eq!(reopened.stats().await.recovered, 3);

    reopened.close().await.unwrap();
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn repeated_saves_populate_both_slots() {
    let dir = temp_data_dir();

    let engine = MemoryEngine::open(quiet_config(&dir)).await.unwrap();
    engine
        .add_exchange("What is on the menu today?", "Soup and a roast.", Metadata::new())
        .await
        .unwrap();
    assert_eq!(engine.save_now().await.unwrap(), SlotId::A);
    assert_eq!(engine.save_now().await.unwrap(), SlotId::B);

    assert!(dir.join(SlotId::A.file_name()).exists());
    assert!(dir.join(SlotId::B.file_name()).exists());

    engine.close().await.unwrap();
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn corrupted_newest_slot_falls_back_to_the_older_one() {
    let dir = temp_data_dir();

    let engine = MemoryEngine::open(quiet_config(&dir)).await.unwrap();
    let kept = engine
        .add_exchange("Remember my allergy to nuts.", "Noted, no nuts.", Metadata::new())
        .await
        .unwrap();
    engine.save_now().await.unwrap();
    engine
        .add_exchange("Also no shellfish please.", "Understood.", Metadata::new())
        .await
        .unwrap();
    assert_eq!(engine.save_now().await.unwrap(), SlotId::B);
    engine.close().await.unwrap();
    drop(engine);

    std::fs::write(dir.join(SlotId::B.file_name()), b"not a snapshot").unwrap();

    let reopened = MemoryEngine::open(quiet_config(&dir)).await.unwrap();
    assert_eq!(reopened.len().await, 1);
    assert!(reopened.get(kept.id()).await.is_some());
    // The surviving copy in slot A must not be overwritten next.
    assert_eq!(reopened.save_now().await.unwrap(), SlotId::B);

    reopened.close().await.unwrap();
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn both_slots_corrupt_starts_empty_but_operational() {
    let dir = temp_data_dir();
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(SlotId::A.file_name()), b"x").unwrap();
    std::fs::write(dir.join(SlotId::B.file_name()), b"y").unwrap();

    let engine = MemoryEngine::open(quiet_config(&dir)).await.unwrap();
    assert!(engine.is_empty().await);
    assert_eq!(engine.stats().await.recovered, 0);

    engine
        .add_exchange("Fresh start after the crash.", "All clear.", Metadata::new())
        .await
        .unwrap();
    assert_eq!(engine.save_now().await.unwrap(), SlotId::A);

    engine.close().await.unwrap();
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn close_writes_pending_changes() {
    let dir = temp_data_dir();

    let engine = MemoryEngine::open(quiet_config(&dir)).await.unwrap();
    engine
        .add_exchange("Keep this one safe.", "Will do.", Metadata::new())
        .await
        .unwrap();
    // No explicit save; close must flush the dirty state itself.
    engine.close().await.unwrap();
    drop(engine);

    let reopened = MemoryEngine::open(quiet_config(&dir)).await.unwrap();
    assert_eq!(reopened.len().await, 1);

    reopened.close().await.unwrap();
    let _ = std::fs::remove_dir_all(dir);
}
