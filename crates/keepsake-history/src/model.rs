//! History of a single resource.
//!
//! A [`HistoryModel`] owns the entry list for one tracked resource and the
//! folder that holds its snapshots:
//! ```text
//! root/
//!   <hex(hash(resource))>/
//!     entries.json         # listing: ids, timestamps, sources
//!     aB3x.rs              # one snapshot per entry
//!     Q9zk.rs
//! ```
//!
//! The in-memory list is reconciled with disk lazily, at most once per
//! resource identity. Operations on one model must be serialized by the
//! caller; the service keeps every model behind its own mutex.

use crate::config::{HistorySettings, SettingKey, DEFAULT_MAX_ENTRIES, DEFAULT_MERGE_WINDOW_SECS};
use crate::entry::{now_millis, HistoryEntry, DEFAULT_SOURCE};
use crate::error::HistoryResult;
use crate::events::EntryEvents;
use crate::listing::SerializedListing;
use keepsake_store::ContentStore;
use keepsake_util::id::{self, LISTING_FILE};
use keepsake_util::path::dotted_extension;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of [`HistoryModel::move_entries`].
#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    /// Cancelled before the model was re-keyed.
    Skipped,
    /// Re-keyed to the new resource, with the entry recorded for the move.
    Moved(Option<HistoryEntry>),
}

/// Entries of one tracked resource.
pub struct HistoryModel {
    store: Arc<dyn ContentStore>,
    settings: Arc<dyn HistorySettings>,
    events: EntryEvents,

    root: PathBuf,
    resource: PathBuf,
    folder: PathBuf,
    listing_file: PathBuf,

    entries: Vec<HistoryEntry>,
    dirty: bool,
    resolved: bool,
}

impl HistoryModel {
    /// Create the model for `resource` with history under `root`.
    pub fn new(
        resource: PathBuf,
        root: PathBuf,
        store: Arc<dyn ContentStore>,
        settings: Arc<dyn HistorySettings>,
        events: EntryEvents,
    ) -> Self {
        let folder = Self::folder_for(&root, &resource);
        let listing_file = folder.join(LISTING_FILE);
        Self {
            store,
            settings,
            events,
            root,
            resource,
            folder,
            listing_file,
            entries: Vec::new(),
            dirty: false,
            resolved: false,
        }
    }

    /// History folder of `resource` below `root`.
    pub fn folder_for(root: &Path, resource: &Path) -> PathBuf {
        root.join(id::folder_name(&resource.to_string_lossy()))
    }

    /// The tracked resource.
    pub fn resource(&self) -> &Path {
        &self.resource
    }

    /// The folder holding this resource's snapshots.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Whether there are changes not yet written by [`store`](Self::store).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn max_entries(&self) -> usize {
        let max = self
            .settings
            .get_number(SettingKey::MaxEntries, &self.resource)
            .unwrap_or(DEFAULT_MAX_ENTRIES);
        usize::try_from(max).unwrap_or(usize::MAX)
    }

    fn merge_window_ms(&self) -> i64 {
        let secs = self
            .settings
            .get_number(SettingKey::MergeWindowSeconds, &self.resource)
            .unwrap_or(DEFAULT_MERGE_WINDOW_SECS);
        i64::try_from(secs).unwrap_or(i64::MAX / 1000).saturating_mul(1000)
    }

    fn resource_name(&self) -> String {
        self.resource
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn make_entry(&self, id: String, timestamp: i64, source: &str) -> HistoryEntry {
        HistoryEntry {
            location: self.folder.join(&id),
            id,
            resource: self.resource.clone(),
            name: self.resource_name(),
            timestamp,
            source: source.to_string(),
        }
    }

    /// Snapshot the resource's current content.
    ///
    /// When the newest entry has the same source and lies within the merge
    /// window, its snapshot is overwritten instead of adding an entry. Only
    /// the in-memory list is consulted for that check.
    pub async fn add_entry(
        &mut self,
        source: &str,
        timestamp: i64,
        cancel: &CancellationToken,
    ) -> HistoryResult<Option<HistoryEntry>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let merge_window = self.merge_window_ms();
        let replace = self.entries.last().is_some_and(|last| {
            last.source == source && timestamp.saturating_sub(last.timestamp) <= merge_window
        });

        if replace {
            let location = match self.entries.last() {
                Some(last) => last.location.clone(),
                None => return Ok(None),
            };
            self.store.clone_file(&self.resource, &location).await?;

            let Some(last) = self.entries.last_mut() else {
                return Ok(None);
            };
            last.timestamp = timestamp;
            let entry = last.clone();
            self.dirty = true;

            debug!(resource = %self.resource.display(), entry = %entry.id, "Replaced history entry");
            self.events.replaced(&entry);
            return Ok(Some(entry));
        }

        let entry = self.make_entry(
            id::entry_id(&dotted_extension(&self.resource)),
            timestamp,
            source,
        );
        self.store.clone_file(&self.resource, &entry.location).await?;

        self.entries.push(entry.clone());
        self.dirty = true;

        debug!(resource = %self.resource.display(), entry = %entry.id, source, "Added history entry");
        self.events.added(&entry);
        Ok(Some(entry))
    }

    /// Remove an entry and delete its snapshot.
    ///
    /// Returns false if the entry is unknown or the call was cancelled.
    pub async fn remove_entry(&mut self, entry: &HistoryEntry, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        self.resolve().await;
        if cancel.is_cancelled() {
            return false;
        }

        let Some(index) = self.entries.iter().position(|e| e.id == entry.id) else {
            return false;
        };

        self.delete_snapshot(&self.entries[index].location).await;
        let removed = self.entries.remove(index);
        self.dirty = true;

        self.events.removed(&removed);
        true
    }

    /// Relabel an entry's source.
    pub async fn update_entry(
        &mut self,
        entry: &HistoryEntry,
        source: &str,
        cancel: &CancellationToken,
    ) {
        if cancel.is_cancelled() {
            return;
        }
        self.resolve().await;
        if cancel.is_cancelled() {
            return;
        }

        let Some(existing) = self.entries.iter_mut().find(|e| e.id == entry.id) else {
            return;
        };
        existing.source = source.to_string();
        let changed = existing.clone();
        self.dirty = true;

        self.events.changed(&changed);
    }

    /// The most recent entries, oldest first, capped at the retention limit.
    ///
    /// Does not evict anything; that happens in [`store`](Self::store).
    pub async fn get_entries(&mut self, cancel: &CancellationToken) -> Vec<HistoryEntry> {
        if cancel.is_cancelled() {
            return Vec::new();
        }
        self.resolve().await;
        if cancel.is_cancelled() {
            return Vec::new();
        }

        let max = self.max_entries();
        let skip = self.entries.len().saturating_sub(max);
        self.entries[skip..].to_vec()
    }

    /// Whether any entry exists. With `skip_resolve`, only memory is checked.
    pub async fn has_entries(&mut self, skip_resolve: bool) -> bool {
        if !skip_resolve {
            self.resolve().await;
        }
        !self.entries.is_empty()
    }

    /// Merge disk state into memory, once per resource identity.
    ///
    /// Sources, weakest first: snapshot files in the folder (default source,
    /// file mtime), the listing file (timestamp and source of files that
    /// still exist), then entries added in memory since construction.
    async fn resolve(&mut self) {
        if self.resolved {
            return;
        }

        let mut merged: Vec<HistoryEntry> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        match self.store.list_children(&self.folder).await {
            Ok(mut children) => {
                children.sort_by(|a, b| a.name.cmp(&b.name));
                for child in children {
                    if child.is_dir || !id::is_entry_file_name(&child.name) {
                        continue;
                    }
                    let entry = self.make_entry(
                        child.name.clone(),
                        child.modified.timestamp_millis(),
                        DEFAULT_SOURCE,
                    );
                    index.insert(child.name, merged.len());
                    merged.push(entry);
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!(folder = %self.folder.display(), error = %e, "Failed to scan history folder");
            }
        }

        if !merged.is_empty() {
            if let Some(listing) = self.read_listing().await {
                for listed in &listing.entries {
                    let Some(&i) = index.get(&listed.id) else {
                        continue;
                    };
                    if let Some(timestamp) = listed.timestamp {
                        merged[i].timestamp = timestamp;
                    }
                    merged[i].source = listed.source_or_default().to_string();
                }
            }
        }

        for entry in self.entries.drain(..) {
            match index.get(&entry.id) {
                Some(&i) => merged[i] = entry,
                None => {
                    index.insert(entry.id.clone(), merged.len());
                    merged.push(entry);
                }
            }
        }

        merged.sort_by_key(|e| e.timestamp);
        self.entries = merged;
        self.resolved = true;
    }

    async fn read_listing(&self) -> Option<SerializedListing> {
        match self.store.read_file(&self.listing_file).await {
            Ok(bytes) => {
                let listing = SerializedListing::parse(&bytes);
                if listing.is_none() {
                    debug!(file = %self.listing_file.display(), "Ignoring unreadable listing");
                }
                listing
            }
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!(file = %self.listing_file.display(), error = %e, "Failed to read listing");
                None
            }
        }
    }

    /// Persist pending changes.
    ///
    /// Evicts entries over the retention limit first. An empty history
    /// deletes the whole folder. Failures are logged and leave the model
    /// dirty so the next call retries.
    pub async fn store(&mut self, cancel: &CancellationToken) {
        if !self.dirty {
            return;
        }
        if cancel.is_cancelled() {
            return;
        }
        self.resolve().await;
        if cancel.is_cancelled() {
            return;
        }

        self.clean_up_entries().await;
        if cancel.is_cancelled() {
            return;
        }

        if self.entries.is_empty() {
            match self.store.delete(&self.folder, true).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(folder = %self.folder.display(), error = %e, "Failed to delete history folder");
                    return;
                }
            }
        } else {
            let listing =
                SerializedListing::from_entries(&self.resource.to_string_lossy(), &self.entries);
            let bytes = match listing.to_bytes() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(resource = %self.resource.display(), error = %e, "Failed to encode listing");
                    return;
                }
            };
            if let Err(e) = self.store.write_file(&self.listing_file, &bytes).await {
                warn!(file = %self.listing_file.display(), error = %e, "Failed to write listing");
                return;
            }
        }

        self.dirty = false;
    }

    /// Evict the oldest entries beyond the retention limit.
    async fn clean_up_entries(&mut self) {
        let max = self.max_entries();
        if self.entries.len() <= max {
            return;
        }

        let evicted: Vec<HistoryEntry> = self.entries.drain(..self.entries.len() - max).collect();
        for entry in &evicted {
            self.delete_snapshot(&entry.location).await;
            self.events.removed(entry);
        }
        self.dirty = true;

        info!(
            resource = %self.resource.display(),
            evicted = evicted.len(),
            "Evicted old history entries"
        );
    }

    async fn delete_snapshot(&self, location: &Path) {
        match self.store.delete(location, false).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!(location = %location.display(), error = %e, "Failed to delete snapshot");
            }
        }
    }

    /// Follow the resource to `new_resource`.
    ///
    /// Flushes pending changes, renames the history folder, re-keys this
    /// model as if freshly created for the new resource, then records one
    /// entry labelled `source` and flushes again. Returns
    /// [`MoveOutcome::Skipped`] when cancelled before the re-key, in which
    /// case the model still belongs to the old resource.
    pub async fn move_entries(
        &mut self,
        new_resource: &Path,
        source: &str,
        cancel: &CancellationToken,
    ) -> MoveOutcome {
        self.store(cancel).await;
        if self.dirty && !cancel.is_cancelled() {
            self.store(cancel).await;
        }
        if cancel.is_cancelled() {
            return MoveOutcome::Skipped;
        }

        let new_folder = Self::folder_for(&self.root, new_resource);
        if new_folder != self.folder {
            match self.store.move_folder(&self.folder, &new_folder, true).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(
                        from = %self.folder.display(),
                        to = %new_folder.display(),
                        error = %e,
                        "Failed to move history folder"
                    );
                }
            }
        }

        if self.dirty {
            warn!(
                resource = %self.resource.display(),
                entries = self.entries.len(),
                "Moving history with unsaved changes"
            );
        }
        self.rekey(new_resource);
        if cancel.is_cancelled() {
            return MoveOutcome::Moved(None);
        }

        let entry = match self.add_entry(source, now_millis(), cancel).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(resource = %self.resource.display(), error = %e, "Failed to record move entry");
                None
            }
        };
        self.store(cancel).await;
        MoveOutcome::Moved(entry)
    }

    fn rekey(&mut self, resource: &Path) {
        self.resource = resource.to_path_buf();
        self.folder = Self::folder_for(&self.root, resource);
        self.listing_file = self.folder.join(LISTING_FILE);
        self.entries.clear();
        self.dirty = false;
        self.resolved = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::events::HistoryEvents;
    use keepsake_store::MemoryStore;

    fn model(store: Arc<MemoryStore>, config: HistoryConfig) -> HistoryModel {
        HistoryModel::new(
            PathBuf::from("/w/a.txt"),
            PathBuf::from("/h"),
            store,
            Arc::new(config),
            HistoryEvents::new().entry_emitter(),
        )
    }

    fn no_merge() -> HistoryConfig {
        HistoryConfig {
            merge_window: Some(0),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn add_entry_snapshots_into_folder() {
        let store = Arc::new(MemoryStore::new());
        store.insert("/w/a.txt", "v1");
        let mut model = model(store.clone(), no_merge());
        let cancel = CancellationToken::new();

        let entry = model.add_entry("saved", 10, &cancel).await.unwrap().unwrap();
        assert!(entry.id.ends_with(".txt"));
        assert_eq!(entry.location.parent(), Some(model.folder()));
        assert_eq!(entry.name, "a.txt");
        assert_eq!(store.read_file(&entry.location).await.unwrap(), b"v1");
        assert!(model.is_dirty());
    }

    #[tokio::test]
    async fn failed_clone_records_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut model = model(store, no_merge());
        let cancel = CancellationToken::new();

        assert!(model.add_entry("saved", 10, &cancel).await.is_err());
        assert!(!model.has_entries(true).await);
        assert!(!model.is_dirty());
    }

    #[tokio::test]
    async fn cancelled_calls_return_neutral_results() {
        let store = Arc::new(MemoryStore::new());
        store.insert("/w/a.txt", "v1");
        let mut model = model(store.clone(), no_merge());
        let live = CancellationToken::new();
        let entry = model.add_entry("saved", 10, &live).await.unwrap().unwrap();

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        assert!(model.add_entry("other", 20, &cancelled).await.unwrap().is_none());
        assert!(model.get_entries(&cancelled).await.is_empty());
        assert!(!model.remove_entry(&entry, &cancelled).await);
        assert_eq!(model.get_entries(&live).await.len(), 1);
    }

    #[tokio::test]
    async fn resolve_merges_folder_listing_and_memory() {
        let store = Arc::new(MemoryStore::new());
        let folder = HistoryModel::folder_for(Path::new("/h"), Path::new("/w/a.txt"));
        store.insert(folder.join("Aaaa.txt"), "old");
        store.insert(folder.join("Bbbb.txt"), "older");
        store.insert(folder.join("notes"), "not an entry");
        store.set_modified(
            &folder.join("Bbbb.txt"),
            chrono::DateTime::from_timestamp_millis(7).unwrap(),
        );
        store.insert(
            folder.join(LISTING_FILE),
            r#"{"version":1,"resource":"/w/a.txt","entries":[
                {"id":"Aaaa.txt","timestamp":5,"source":"moved"},
                {"id":"Gone.txt","timestamp":6}
            ]}"#,
        );
        store.insert("/w/a.txt", "now");

        let mut model = model(store, no_merge());
        let cancel = CancellationToken::new();
        let added = model.add_entry("saved", 100, &cancel).await.unwrap().unwrap();

        let entries = model.get_entries(&cancel).await;
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["Aaaa.txt", "Bbbb.txt", added.id.as_str()]);
        assert_eq!(entries[0].source, "moved");
        assert_eq!(entries[0].timestamp, 5);
        assert_eq!(entries[1].source, DEFAULT_SOURCE);
        assert_eq!(entries[1].timestamp, 7);
    }

    #[tokio::test]
    async fn corrupt_listing_falls_back_to_folder_scan() {
        let store = Arc::new(MemoryStore::new());
        let folder = HistoryModel::folder_for(Path::new("/h"), Path::new("/w/a.txt"));
        store.insert(folder.join("Aaaa.txt"), "old");
        store.insert(folder.join(LISTING_FILE), "{ truncated");

        let mut model = model(store, no_merge());
        let entries = model.get_entries(&CancellationToken::new()).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, DEFAULT_SOURCE);
    }

    #[tokio::test]
    async fn store_deletes_folder_when_history_empties() {
        let store = Arc::new(MemoryStore::new());
        store.insert("/w/a.txt", "v1");
        let mut model = model(store.clone(), no_merge());
        let cancel = CancellationToken::new();

        let entry = model.add_entry("saved", 1, &cancel).await.unwrap().unwrap();
        model.store(&cancel).await;
        assert!(store.exists(&model.folder().join(LISTING_FILE)).await.unwrap());

        assert!(model.remove_entry(&entry, &cancel).await);
        model.store(&cancel).await;
        assert!(!store.exists(model.folder()).await.unwrap());
        assert!(!model.is_dirty());
    }

    #[tokio::test]
    async fn cancelled_move_keeps_resource() {
        let store = Arc::new(MemoryStore::new());
        store.insert("/w/a.txt", "v1");
        let mut model = model(store.clone(), no_merge());
        let live = CancellationToken::new();
        model.add_entry("saved", 1, &live).await.unwrap();

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let outcome = model.move_entries(Path::new("/w/b.txt"), "renamed", &cancelled).await;
        assert_eq!(outcome, MoveOutcome::Skipped);
        assert_eq!(model.resource(), Path::new("/w/a.txt"));
        assert!(model.is_dirty());

        store.insert("/w/b.txt", "v1");
        let MoveOutcome::Moved(Some(entry)) = model.move_entries(Path::new("/w/b.txt"), "renamed", &live).await
        else {
            panic!("move should record an entry");
        };
        assert_eq!(entry.resource, Path::new("/w/b.txt"));
        assert_eq!(model.get_entries(&live).await.len(), 2);
        assert!(!model.is_dirty());
    }

    #[tokio::test]
    async fn update_entry_relabels_in_place() {
        let store = Arc::new(MemoryStore::new());
        store.insert("/w/a.txt", "v1");
        let mut model = model(store, no_merge());
        let cancel = CancellationToken::new();

        let entry = model.add_entry("saved", 1, &cancel).await.unwrap().unwrap();
        model.update_entry(&entry, "checkpoint", &cancel).await;

        let entries = model.get_entries(&cancel).await;
        assert_eq!(entries[0].id, entry.id);
        assert_eq!(entries[0].source, "checkpoint");
    }

    #[tokio::test]
    async fn removing_unknown_entry_returns_false() {
        let store = Arc::new(MemoryStore::new());
        store.insert("/w/a.txt", "v1");
        let mut model = model(store, no_merge());
        let cancel = CancellationToken::new();

        let mut entry = model.add_entry("saved", 1, &cancel).await.unwrap().unwrap();
        entry.id = "Zzzz.txt".to_string();
        assert!(!model.remove_entry(&entry, &cancel).await);
    }
}
