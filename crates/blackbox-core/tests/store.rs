//! End-to-end tests for log stores attached to a distributor
//!
//! Messages travel the full pipeline here: convenience entry point, dispatch
//! task, store ring, archive task, disk, and back through a restart.

use std::sync::Arc;

use blackbox_core::{LogDistributor, LogKind, LogStore};
use bytes::Bytes;
use tempfile::TempDir;

async fn store_at(dir: &TempDir, file: &str) -> Arc<LogStore> {
    LogStore::builder("test")
        .path(dir.path().join(file))
        .build()
        .await
        .unwrap()
}

fn texts(messages: &[blackbox_core::LogMessage]) -> Vec<String> {
    messages.iter().map(|m| m.text.clone()).collect()
}

// ============================================================================
// Pipeline Tests
// ============================================================================

/// Messages logged through the distributor land in the store and survive a
/// restart of both.
#[tokio::test]
async fn test_pipeline_persists_across_restart() {
    let dir = TempDir::new().unwrap();

    {
        let distributor = LogDistributor::new();
        let store = store_at(&dir, "app.data").await;
        distributor.add_observer(&store);

        distributor.log("session one, message one");
        distributor.log_error("session one, message two");
        store.wait_until_fully_flushed().await;
    }

    let reopened = store_at(&dir, "app.data").await;
    let messages = reopened.snapshot();
    assert_eq!(
        texts(&messages),
        vec!["session one, message one", "session one, message two"]
    );
    assert_eq!(messages[1].kind, LogKind::Error);
}

/// `retrieve_all` includes a message logged immediately before it, with no
/// explicit barrier in between.
#[tokio::test]
async fn test_retrieve_all_sees_just_logged_message() {
    let dir = TempDir::new().unwrap();
    let distributor = LogDistributor::new();
    let store = store_at(&dir, "app.data").await;
    distributor.add_observer(&store);

    distributor.log("just now");
    let messages = store.retrieve_all().await;

    assert_eq!(texts(&messages), vec!["just now"]);
}

/// A store filter applies to the live pipeline, not just direct observes.
#[tokio::test]
async fn test_filter_holds_over_mixed_pipeline_traffic() {
    let dir = TempDir::new().unwrap();
    let distributor = LogDistributor::new();
    let store = LogStore::builder("quiet")
        .path(dir.path().join("quiet.data"))
        .filter(|message| message.kind != LogKind::Error)
        .build()
        .await
        .unwrap();
    distributor.add_observer(&store);

    distributor.log("keep one");
    distributor.log_error("drop one");
    distributor.log_with_kind("keep two", LogKind::Default);
    distributor.log_error("drop two");

    let messages = store.retrieve_all().await;
    assert_eq!(texts(&messages), vec!["keep one", "keep two"]);
    assert!(messages.iter().all(|m| m.kind != LogKind::Error));
}

/// Clearing mid-session wipes history; later messages persist normally.
#[tokio::test]
async fn test_clear_then_log_leaves_only_new_messages() {
    let dir = TempDir::new().unwrap();

    {
        let distributor = LogDistributor::new();
        let store = store_at(&dir, "app.data").await;
        distributor.add_observer(&store);

        distributor.log("stale");
        distributor.distribute_all_pending().await;
        store.clear().await;
        distributor.log("fresh");
        store.wait_until_fully_flushed().await;

        assert_eq!(texts(&store.snapshot()), vec!["fresh"]);
    }

    let reopened = store_at(&dir, "app.data").await;
    assert_eq!(texts(&reopened.snapshot()), vec!["fresh"]);
}

/// Two stores on one distributor record the same stream into separate files.
#[tokio::test]
async fn test_two_stores_share_one_stream() {
    let dir = TempDir::new().unwrap();
    let distributor = LogDistributor::new();
    let first = store_at(&dir, "first.data").await;
    let second = store_at(&dir, "second.data").await;
    distributor.add_observer(&first);
    distributor.add_observer(&second);

    distributor.log("everywhere");
    distributor.distribute_all_pending().await;

    assert_eq!(texts(&first.snapshot()), vec!["everywhere"]);
    assert_eq!(texts(&second.snapshot()), vec!["everywhere"]);
    assert_ne!(first.path(), second.path());
}

/// Screenshot messages carry their image through persistence.
#[tokio::test]
async fn test_screenshot_image_survives_restart() {
    let dir = TempDir::new().unwrap();
    let image = Bytes::from_static(b"\x89PNG\r\n\x1a\nfake");

    {
        let distributor = LogDistributor::new();
        let store = store_at(&dir, "app.data").await;
        distributor.add_observer(&store);
        distributor.log_screenshot(image.clone());
        store.wait_until_fully_flushed().await;
    }

    let reopened = store_at(&dir, "app.data").await;
    let messages = reopened.snapshot();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kind, LogKind::Screenshot);
    assert_eq!(messages[0].image.as_ref(), Some(&image));
}

// ============================================================================
// Default Store Tests
// ============================================================================

/// A distributor built with a default store path opens that store on first
/// use and persists the triggering message.
#[tokio::test]
async fn test_default_store_opens_lazily_and_catches_first_message() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("default.data");
    let distributor = LogDistributor::builder()
        .default_store_path(&path)
        .build();

    distributor.log("first ever");

    let store = distributor.default_store().await.expect("default store");
    assert_eq!(store.name(), "blackbox");
    assert_eq!(store.path(), path.as_path());
    assert_eq!(texts(&store.retrieve_all().await), vec!["first ever"]);
}

/// Replacing the default store before any logging means the built-in one is
/// never opened and no file appears at its path.
#[tokio::test]
async fn test_set_default_store_preempts_lazy_creation() {
    let dir = TempDir::new().unwrap();
    let unused = dir.path().join("never.data");
    let distributor = LogDistributor::builder()
        .default_store_path(&unused)
        .build();

    let custom = LogStore::builder("custom")
        .path(dir.path().join("custom.data"))
        .build()
        .await
        .unwrap();
    distributor.set_default_store(Some(custom.clone()));
    distributor.log("redirected");

    let store = distributor.default_store().await.expect("default store");
    assert_eq!(store.name(), "custom");
    assert_eq!(texts(&store.retrieve_all().await), vec!["redirected"]);
    assert!(!unused.exists());
}

/// Disabling the default store stops persistence without breaking dispatch.
#[tokio::test]
async fn test_disabled_default_store_drops_persistence() {
    let dir = TempDir::new().unwrap();
    let unused = dir.path().join("never.data");
    let distributor = LogDistributor::builder()
        .default_store_path(&unused)
        .build();

    distributor.set_default_store(None);
    distributor.log("vanishes");
    distributor.distribute_all_pending().await;

    assert!(distributor.default_store().await.is_none());
    assert!(!unused.exists());
}

/// A replaced default store stops observing; its replacement takes over.
#[tokio::test]
async fn test_replacing_default_store_moves_the_stream() {
    let dir = TempDir::new().unwrap();
    let distributor = LogDistributor::new();

    let first = LogStore::builder("first")
        .path(dir.path().join("first.data"))
        .build()
        .await
        .unwrap();
    distributor.set_default_store(Some(first.clone()));
    distributor.log("to first");

    let second = LogStore::builder("second")
        .path(dir.path().join("second.data"))
        .build()
        .await
        .unwrap();
    distributor.set_default_store(Some(second.clone()));
    distributor.log("to second");
    distributor.distribute_all_pending().await;

    assert_eq!(texts(&first.snapshot()), vec!["to first"]);
    assert_eq!(texts(&second.snapshot()), vec!["to second"]);
}
