//! History service integration tests.
//!
//! Drive a service over a real temporary directory and check what ends up
//! on disk and which events are sent.

use keepsake_history::{
    HistoryConfig, HistoryEvent, HistoryModel, HistoryService, ResourceMoved, DEFAULT_SOURCE,
    MOVED_SOURCE, RENAMED_SOURCE, RESTORED_SOURCE,
};
use keepsake_store::ContentStore;
use keepsake_test_utils::{BuiltTestWorkspace, RecordingStore, StoreOp, TestWorkspace};
use keepsake_util::id::LISTING_FILE;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

fn service(
    store: Arc<dyn ContentStore>,
    workspace: &BuiltTestWorkspace,
    config: HistoryConfig,
) -> HistoryService {
    HistoryService::new(store, Arc::new(config), workspace.history_root())
}

fn local_service(workspace: &BuiltTestWorkspace, config: HistoryConfig) -> HistoryService {
    service(RecordingStore::local().into_shared(), workspace, config)
}

fn no_merge() -> HistoryConfig {
    HistoryConfig {
        merge_window: Some(0),
        ..Default::default()
    }
}

fn ids(entries: &[keepsake_history::HistoryEntry]) -> Vec<String> {
    entries.iter().map(|e| e.id.clone()).collect()
}

/// Test that a save inside the merge window overwrites the newest entry.
#[tokio::test]
async fn test_saves_within_merge_window_merge() {
    let workspace = TestWorkspace::new().with_file("a.txt", "v1").build();
    let file = workspace.file("a.txt");
    let service = local_service(&workspace, HistoryConfig::default());
    let mut replaced = service.events().subscribe_replaced();
    let cancel = CancellationToken::new();

    let first = service
        .add_entry(&file, None, Some(1_000), &cancel)
        .await
        .expect("Failed to add entry")
        .expect("Entry should be recorded");

    workspace.write_file("a.txt", "v2");
    let merged = service
        .add_entry(&file, None, Some(5_000), &cancel)
        .await
        .expect("Failed to add entry")
        .expect("Entry should be recorded");

    assert_eq!(merged.id, first.id);
    assert_eq!(merged.timestamp, 5_000);
    assert_eq!(replaced.recv().await.unwrap().entry.id, first.id);

    let entries = service.get_entries(&file, &cancel).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(std::fs::read_to_string(&entries[0].location).unwrap(), "v2");

    // Outside the window a new entry is created
    service
        .add_entry(&file, None, Some(20_000), &cancel)
        .await
        .expect("Failed to add entry");
    assert_eq!(service.get_entries(&file, &cancel).await.len(), 2);
}

/// Test that a different source never merges, however close in time.
#[tokio::test]
async fn test_different_source_creates_new_entry() {
    let workspace = TestWorkspace::new().with_file("a.txt", "v1").build();
    let file = workspace.file("a.txt");
    let service = local_service(&workspace, HistoryConfig::default());
    let cancel = CancellationToken::new();

    service.add_entry(&file, None, Some(1_000), &cancel).await.unwrap();
    service
        .add_entry(&file, Some("checkpoint"), Some(1_001), &cancel)
        .await
        .unwrap();

    let entries = service.get_entries(&file, &cancel).await;
    let sources: Vec<&str> = entries.iter().map(|e| e.source.as_str()).collect();
    assert_eq!(sources, vec![DEFAULT_SOURCE, "checkpoint"]);
}

/// Test that storing evicts the oldest entries beyond the limit.
#[tokio::test]
async fn test_store_evicts_oldest_entries() {
    let workspace = TestWorkspace::new().with_file("a.txt", "A").build();
    let file = workspace.file("a.txt");
    let config = HistoryConfig {
        max_file_entries: Some(3),
        ..no_merge()
    };
    let service = local_service(&workspace, config);
    let mut removed = service.events().subscribe_removed();
    let cancel = CancellationToken::new();

    let mut added = Vec::new();
    for (source, ts) in [("A", 0), ("B", 10_000), ("C", 20_000), ("D", 30_000)] {
        workspace.write_file("a.txt", source);
        let entry = service
            .add_entry(&file, Some(source), Some(ts), &cancel)
            .await
            .unwrap()
            .unwrap();
        added.push(entry);
    }

    // Reads are capped before anything is evicted
    assert_eq!(ids(&service.get_entries(&file, &cancel).await), ids(&added[1..]));
    assert!(added[0].location.exists());

    service.store_all(&cancel).await;

    let evicted = removed.recv().await.unwrap().entry;
    assert_eq!(evicted.id, added[0].id);
    assert_eq!(evicted.source, "A");
    assert!(removed.try_recv().is_err());
    assert!(!added[0].location.exists());

    let entries = service.get_entries(&file, &cancel).await;
    let sources: Vec<&str> = entries.iter().map(|e| e.source.as_str()).collect();
    assert_eq!(sources, vec!["B", "C", "D"]);
    assert_eq!(std::fs::read_to_string(&entries[0].location).unwrap(), "B");
}

/// Test that a failed listing write is retried by the next store.
#[tokio::test]
async fn test_failed_listing_write_is_retried() {
    let workspace = TestWorkspace::new().with_file("a.txt", "v1").build();
    let file = workspace.file("a.txt");
    let store = RecordingStore::local();
    let service = service(store.clone().into_shared(), &workspace, HistoryConfig::default());
    let listing = HistoryModel::folder_for(&workspace.history_root(), &file).join(LISTING_FILE);
    let cancel = CancellationToken::new();

    service.add_entry(&file, Some("checkpoint"), Some(1_000), &cancel).await.unwrap();
    store.fail(StoreOp::WriteFile);
    service.store_all(&cancel).await;
    assert_eq!(store.count(StoreOp::WriteFile), 1);
    assert!(!listing.exists());

    store.heal(StoreOp::WriteFile);
    service.store_all(&cancel).await;
    assert_eq!(store.count(StoreOp::WriteFile), 2);
    assert!(listing.exists());

    // Clean again, nothing left to write
    service.store_all(&cancel).await;
    assert_eq!(store.count(StoreOp::WriteFile), 2);

    let reloaded = local_service(&workspace, HistoryConfig::default());
    let entries = reloaded.get_entries(&file, &cancel).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source, "checkpoint");
}

/// Test that eviction drops entries even when their snapshot cannot be deleted.
#[tokio::test]
async fn test_eviction_survives_failed_snapshot_delete() {
    let workspace = TestWorkspace::new().with_file("a.txt", "v1").build();
    let file = workspace.file("a.txt");
    let store = RecordingStore::local();
    let config = HistoryConfig {
        max_file_entries: Some(1),
        ..no_merge()
    };
    let service = service(store.clone().into_shared(), &workspace, config);
    let mut removed = service.events().subscribe_removed();
    let cancel = CancellationToken::new();

    let first = service
        .add_entry(&file, None, Some(1_000), &cancel)
        .await
        .unwrap()
        .unwrap();
    workspace.write_file("a.txt", "v2");
    let second = service
        .add_entry(&file, None, Some(2_000), &cancel)
        .await
        .unwrap()
        .unwrap();

    store.fail(StoreOp::Delete);
    service.store_all(&cancel).await;

    assert_eq!(store.paths(StoreOp::Delete), vec![first.location.clone()]);
    assert_eq!(removed.recv().await.unwrap().entry.id, first.id);
    assert!(removed.try_recv().is_err());
    assert!(first.location.exists());
    assert_eq!(ids(&service.get_entries(&file, &cancel).await), vec![second.id]);
    assert_eq!(store.count(StoreOp::WriteFile), 1);
}

/// Test that removing an entry succeeds even when its snapshot cannot be deleted.
#[tokio::test]
async fn test_remove_entry_survives_failed_snapshot_delete() {
    let workspace = TestWorkspace::new().with_file("a.txt", "v1").build();
    let file = workspace.file("a.txt");
    let store = RecordingStore::local();
    let service = service(store.clone().into_shared(), &workspace, HistoryConfig::default());
    let mut removed = service.events().subscribe_removed();
    let cancel = CancellationToken::new();

    let entry = service
        .add_entry(&file, None, Some(1_000), &cancel)
        .await
        .unwrap()
        .unwrap();

    store.fail(StoreOp::Delete);
    assert!(service.remove_entry(&entry, &cancel).await);

    assert_eq!(store.count(StoreOp::Delete), 1);
    assert_eq!(removed.recv().await.unwrap().entry.id, entry.id);
    assert!(entry.location.exists());
    assert!(service.get_entries(&file, &cancel).await.is_empty());
}

/// Test that a store with nothing pending touches nothing.
#[tokio::test]
async fn test_second_store_is_a_no_op() {
    let workspace = TestWorkspace::new().with_file("a.txt", "v1").build();
    let file = workspace.file("a.txt");
    let store = RecordingStore::local();
    let service = service(store.clone().into_shared(), &workspace, HistoryConfig::default());
    let cancel = CancellationToken::new();

    service.add_entry(&file, None, None, &cancel).await.unwrap();
    service.store_all(&cancel).await;
    assert_eq!(store.count(StoreOp::WriteFile), 1);

    store.clear();
    service.store_all(&cancel).await;
    assert!(store.ops().is_empty());
}

/// Test that a fresh service sees exactly what the previous one stored.
#[tokio::test]
async fn test_history_survives_restart() {
    let workspace = TestWorkspace::new().with_file("a.txt", "v1").build();
    let file = workspace.file("a.txt");
    let cancel = CancellationToken::new();

    let original = {
        let service = local_service(&workspace, no_merge());
        service.add_entry(&file, None, Some(1_000), &cancel).await.unwrap();
        workspace.write_file("a.txt", "v2");
        let second = service
            .add_entry(&file, None, Some(2_000), &cancel)
            .await
            .unwrap()
            .unwrap();
        service.update_entry(&second, "checkpoint", &cancel).await;
        service.store_all(&cancel).await;
        service.get_entries(&file, &cancel).await
    };

    let service = local_service(&workspace, no_merge());
    let reloaded = service.get_entries(&file, &cancel).await;

    assert_eq!(reloaded, original);
    assert_eq!(reloaded[1].source, "checkpoint");
    assert_eq!(reloaded[0].timestamp, 1_000);
}

/// Test that renaming within a folder carries history and labels it a rename.
#[tokio::test]
async fn test_rename_carries_history() {
    let workspace = TestWorkspace::new().with_file("a.txt", "v1").build();
    let (old, new) = (workspace.file("a.txt"), workspace.file("b.txt"));
    let service = local_service(&workspace, HistoryConfig::default());
    let mut moved = service.events().subscribe_moved();
    let cancel = CancellationToken::new();

    service.add_entry(&old, None, Some(1_000), &cancel).await.unwrap();

    workspace.rename("a.txt", "b.txt");
    service.handle_move(&old, &new, &cancel).await;

    let event = moved.recv().await.unwrap();
    assert_eq!(event.resources.len(), 1);
    assert_eq!(event.resources[0].to, new);

    let entries = service.get_entries(&new, &cancel).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].source, RENAMED_SOURCE);
    assert!(entries.iter().all(|e| e.resource == new && e.location.exists()));

    let old_folder = HistoryModel::folder_for(&workspace.history_root(), &old);
    assert!(!old_folder.exists());
    assert_eq!(workspace.history_folders().len(), 1);
}

/// Test that moving to another folder is labelled a move.
#[tokio::test]
async fn test_move_to_other_folder() {
    let workspace = TestWorkspace::new()
        .with_file("a.txt", "v1")
        .with_file("sub/keep", "")
        .build();
    let (old, new) = (workspace.file("a.txt"), workspace.file("sub/a.txt"));
    let service = local_service(&workspace, HistoryConfig::default());
    let cancel = CancellationToken::new();

    service.add_entry(&old, None, Some(1_000), &cancel).await.unwrap();
    workspace.rename("a.txt", "sub/a.txt");
    service.handle_move(&old, &new, &cancel).await;

    let entries = service.get_entries(&new, &cancel).await;
    assert_eq!(entries.last().map(|e| e.source.as_str()), Some(MOVED_SOURCE));
    assert!(service.get_entries(&old, &cancel).await.is_empty());
}

/// Test that moving a folder moves the history of everything below it.
///
/// Renaming the folder changes each descendant's parent, so they are moves.
#[tokio::test]
async fn test_folder_move_follows_descendants() {
    let workspace = TestWorkspace::new()
        .with_file("dir/x.txt", "x")
        .with_file("dir/sub/y.txt", "y")
        .with_file("dirt.txt", "not inside")
        .build();
    let service = local_service(&workspace, HistoryConfig::default());
    let mut moved = service.events().subscribe_moved();
    let cancel = CancellationToken::new();

    for file in ["dir/x.txt", "dir/sub/y.txt", "dirt.txt"] {
        service
            .add_entry(&workspace.file(file), None, Some(1_000), &cancel)
            .await
            .unwrap();
    }

    workspace.rename("dir", "renamed");
    service
        .handle_move(&workspace.file("dir"), &workspace.file("renamed"), &cancel)
        .await;

    let event = moved.recv().await.unwrap();
    let mut moved_to: Vec<PathBuf> = event.resources.into_iter().map(|r| r.to).collect();
    moved_to.sort();
    assert_eq!(
        moved_to,
        vec![workspace.file("renamed/sub/y.txt"), workspace.file("renamed/x.txt")]
    );

    for file in ["renamed/x.txt", "renamed/sub/y.txt"] {
        let entries = service.get_entries(&workspace.file(file), &cancel).await;
        assert_eq!(entries.len(), 2, "{file}");
        assert_eq!(entries[1].source, MOVED_SOURCE, "{file}");
    }
    assert_eq!(service.get_entries(&workspace.file("dirt.txt"), &cancel).await.len(), 1);
}

/// Test that a move completes when the history folder cannot be moved.
#[tokio::test]
async fn test_move_completes_when_folder_move_fails() {
    let workspace = TestWorkspace::new().with_file("a.txt", "v1").build();
    let (old, new) = (workspace.file("a.txt"), workspace.file("b.txt"));
    let store = RecordingStore::local();
    let service = service(store.clone().into_shared(), &workspace, HistoryConfig::default());
    let mut moved = service.events().subscribe_moved();
    let cancel = CancellationToken::new();

    service.add_entry(&old, None, Some(1_000), &cancel).await.unwrap();
    service.store_all(&cancel).await;

    store.fail(StoreOp::MoveFolder);
    workspace.rename("a.txt", "b.txt");
    service.handle_move(&old, &new, &cancel).await;

    assert_eq!(store.count(StoreOp::MoveFolder), 1);
    let event = moved.recv().await.unwrap();
    assert_eq!(event.resources.len(), 1);
    assert_eq!(event.resources[0].to, new);

    let entries = service.get_entries(&new, &cancel).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source, RENAMED_SOURCE);
    assert_eq!(entries[0].resource, new);

    // The old folder stays behind untouched
    assert!(HistoryModel::folder_for(&workspace.history_root(), &old).exists());
}

/// Test that a move still completes when pending changes cannot be written first.
#[tokio::test]
async fn test_move_with_unsaved_changes_completes() {
    let workspace = TestWorkspace::new().with_file("a.txt", "v1").build();
    let (old, new) = (workspace.file("a.txt"), workspace.file("b.txt"));
    let store = RecordingStore::local();
    let service = service(store.clone().into_shared(), &workspace, HistoryConfig::default());
    let cancel = CancellationToken::new();

    service
        .add_entry(&old, Some("checkpoint"), Some(1_000), &cancel)
        .await
        .unwrap();

    store.fail(StoreOp::WriteFile);
    workspace.rename("a.txt", "b.txt");
    service.handle_move(&old, &new, &cancel).await;

    // One retry before the move, one flush after it
    assert_eq!(store.count(StoreOp::WriteFile), 3);
    assert_eq!(store.count(StoreOp::MoveFolder), 1);

    // The snapshot moved, but its unsaved label did not
    let entries = service.get_entries(&new, &cancel).await;
    let sources: Vec<&str> = entries.iter().map(|e| e.source.as_str()).collect();
    assert_eq!(sources, vec![DEFAULT_SOURCE, RENAMED_SOURCE]);
    assert!(entries.iter().all(|e| e.resource == new && e.location.exists()));

    store.heal(StoreOp::WriteFile);
    service.store_all(&cancel).await;
    let new_folder = HistoryModel::folder_for(&workspace.history_root(), &new);
    assert!(new_folder.join(LISTING_FILE).exists());
    assert!(!HistoryModel::folder_for(&workspace.history_root(), &old).exists());
}

/// Test that listing all resources combines disk and memory.
#[tokio::test]
async fn test_get_all_includes_disk_only_resources() {
    let workspace = TestWorkspace::new()
        .with_file("a.txt", "a")
        .with_file("b.txt", "b")
        .with_file("c.txt", "c")
        .build();
    let cancel = CancellationToken::new();

    {
        let service = local_service(&workspace, HistoryConfig::default());
        for file in ["a.txt", "b.txt"] {
            service.add_entry(&workspace.file(file), None, None, &cancel).await.unwrap();
        }
        service.store_all(&cancel).await;
    }

    let service = local_service(&workspace, HistoryConfig::default());
    service
        .add_entry(&workspace.file("c.txt"), None, None, &cancel)
        .await
        .unwrap();

    assert_eq!(
        service.get_all(&cancel).await,
        vec![workspace.file("a.txt"), workspace.file("b.txt"), workspace.file("c.txt")]
    );
}

/// Test that removing all history deletes the root and notifies listeners.
#[tokio::test]
async fn test_remove_all() {
    let workspace = TestWorkspace::new().with_file("a.txt", "a").build();
    let file = workspace.file("a.txt");
    let service = local_service(&workspace, HistoryConfig::default());
    let mut all = service.events().subscribe_all();
    let cancel = CancellationToken::new();

    service.add_entry(&file, None, None, &cancel).await.unwrap();
    service.store_all(&cancel).await;
    assert!(workspace.history_root().exists());

    service.remove_all(&cancel).await;

    assert!(!workspace.history_root().exists());
    assert!(service.get_all(&cancel).await.is_empty());
    loop {
        match all.recv().await.unwrap() {
            HistoryEvent::AllEntriesRemoved => break,
            _ => continue,
        }
    }
}

/// Test that a failed snapshot copy records nothing and surfaces the error.
#[tokio::test]
async fn test_clone_failure_propagates() {
    let workspace = TestWorkspace::new().with_file("a.txt", "a").build();
    let file = workspace.file("a.txt");
    let store = RecordingStore::local();
    store.fail(StoreOp::CloneFile);
    let service = service(store.clone().into_shared(), &workspace, HistoryConfig::default());
    let cancel = CancellationToken::new();

    assert!(service.add_entry(&file, None, None, &cancel).await.is_err());
    assert!(service.get_entries(&file, &cancel).await.is_empty());

    service.store_all(&cancel).await;
    assert_eq!(store.count(StoreOp::WriteFile), 0);
    assert!(workspace.history_folders().is_empty());
}

/// Test that restoring records the current content first.
#[tokio::test]
async fn test_restore_entry() {
    let workspace = TestWorkspace::new().with_file("a.txt", "v1").build();
    let file = workspace.file("a.txt");
    let service = local_service(&workspace, HistoryConfig::default());
    let cancel = CancellationToken::new();

    let entry = service
        .add_entry(&file, None, Some(1_000), &cancel)
        .await
        .unwrap()
        .unwrap();
    workspace.write_file("a.txt", "v2");

    assert!(service.restore_entry(&entry, &cancel).await.unwrap());
    assert_eq!(workspace.read_file("a.txt"), "v1");

    let entries = service.get_entries(&file, &cancel).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].source, RESTORED_SOURCE);
    assert_eq!(service.read_entry(&entries[1]).await.unwrap(), b"v2");
}

/// Test that the move listener follows notifications until cancelled.
#[tokio::test]
async fn test_move_listener() {
    let workspace = TestWorkspace::new().with_file("a.txt", "v1").build();
    let (old, new) = (workspace.file("a.txt"), workspace.file("b.txt"));
    let service = Arc::new(local_service(&workspace, HistoryConfig::default()));
    let mut moved = service.events().subscribe_moved();
    let cancel = CancellationToken::new();

    service.add_entry(&old, None, Some(1_000), &cancel).await.unwrap();

    let (tx, rx) = broadcast::channel(8);
    let listener = service.spawn_move_listener(rx, cancel.clone());

    workspace.rename("a.txt", "b.txt");
    tx.send(ResourceMoved {
        source: old.clone(),
        target: new.clone(),
    })
    .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), moved.recv())
        .await
        .expect("Move was not followed")
        .unwrap();
    assert_eq!(event.source, old);
    assert_eq!(service.get_entries(&new, &cancel).await.len(), 2);

    cancel.cancel();
    listener.await.unwrap();
}

/// Test that overrides apply per resource pattern.
#[tokio::test]
async fn test_overrides_limit_matching_resources() {
    let workspace = TestWorkspace::new()
        .with_file("app.log", "l")
        .with_file("a.txt", "t")
        .build();
    let config = HistoryConfig::parse_jsonc(
        r#"{
            "mergeWindow": 0,
            // logs churn too much
            "overrides": { "*.log": { "maxFileEntries": 1 } }
        }"#,
        "test",
    )
    .unwrap();
    let service = local_service(&workspace, config);
    let cancel = CancellationToken::new();

    for ts in 1..=3 {
        for file in ["app.log", "a.txt"] {
            service
                .add_entry(&workspace.file(file), None, Some(ts), &cancel)
                .await
                .unwrap();
        }
    }
    service.store_all(&cancel).await;

    assert_eq!(service.get_entries(&workspace.file("app.log"), &cancel).await.len(), 1);
    assert_eq!(service.get_entries(&workspace.file("a.txt"), &cancel).await.len(), 3);
}

/// Test that cancelled calls do nothing.
#[tokio::test]
async fn test_cancelled_add_writes_nothing() {
    let workspace = TestWorkspace::new().with_file("a.txt", "v1").build();
    let store = RecordingStore::local();
    let service = service(store.clone().into_shared(), &workspace, HistoryConfig::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let entry = service
        .add_entry(&workspace.file("a.txt"), None, None, &cancel)
        .await
        .unwrap();
    assert!(entry.is_none());
    service.store_all(&cancel).await;
    assert_eq!(store.mutations(), 0);
    assert!(!workspace.history_root().exists());
}
