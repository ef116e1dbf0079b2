//! Registry of history models.
//!
//! The service owns one [`HistoryModel`] per resource, resolves the shared
//! history root once, routes operations to the right model, and follows
//! resources when they are renamed or moved.

use crate::config::{HistoryConfig, HistorySettings};
use crate::entry::{now_millis, HistoryEntry, DEFAULT_SOURCE, MOVED_SOURCE, RENAMED_SOURCE, RESTORED_SOURCE};
use crate::error::HistoryResult;
use crate::events::{EntriesMoved, HistoryEvents, MovedResource, ResourceMoved};
use crate::listing::SerializedListing;
use crate::model::{HistoryModel, MoveOutcome};
use crate::root::{ConfigRootProbe, NoRemoteRoot, RootProbe};
use futures::future::join_all;
use keepsake_store::{ChildEntry, ContentStore};
use keepsake_util::id::LISTING_FILE;
use keepsake_util::path;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{Mutex, OnceCell, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on concurrent store operations across batch work.
pub const MAX_PARALLEL_IO: usize = 10;

type SharedModel = Arc<Mutex<HistoryModel>>;

/// Options that decide which resources are tracked.
#[derive(Debug, Clone)]
pub struct TrackingOptions {
    /// Whether new entries are recorded at all.
    pub enabled: bool,
    /// Wildcard patterns of resources never tracked.
    pub exclude: Vec<String>,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            exclude: Vec::new(),
        }
    }
}

/// Registry and router for per-resource history.
pub struct HistoryService {
    store: Arc<dyn ContentStore>,
    settings: Arc<dyn HistorySettings>,
    probe: Arc<dyn RootProbe>,
    tracking: TrackingOptions,

    local_root: PathBuf,
    root: OnceCell<PathBuf>,

    models: RwLock<HashMap<PathBuf, SharedModel>>,
    limiter: Arc<Semaphore>,
    events: HistoryEvents,
}

impl HistoryService {
    /// Create a service with history under `local_root` and no remote root.
    pub fn new(
        store: Arc<dyn ContentStore>,
        settings: Arc<dyn HistorySettings>,
        local_root: PathBuf,
    ) -> Self {
        Self {
            store,
            settings,
            probe: Arc::new(NoRemoteRoot),
            tracking: TrackingOptions::default(),
            local_root,
            root: OnceCell::new(),
            models: RwLock::new(HashMap::new()),
            limiter: Arc::new(Semaphore::new(MAX_PARALLEL_IO)),
            events: HistoryEvents::new(),
        }
    }

    /// Create a service wired from a loaded configuration.
    ///
    /// Returns `None` if no local root is configured and the platform has
    /// no data directory.
    pub fn from_config(store: Arc<dyn ContentStore>, config: HistoryConfig) -> Option<Self> {
        let local_root = config.local_root()?;
        let probe = ConfigRootProbe::new(config.remote_root.clone(), Arc::clone(&store));
        let tracking = TrackingOptions {
            enabled: config.is_enabled(),
            exclude: config.exclude.clone().unwrap_or_default(),
        };
        Some(
            Self::new(store, Arc::new(config), local_root)
                .with_probe(Arc::new(probe))
                .with_tracking(tracking),
        )
    }

    /// Use a different remote root probe.
    pub fn with_probe(mut self, probe: Arc<dyn RootProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Use different tracking options.
    pub fn with_tracking(mut self, tracking: TrackingOptions) -> Self {
        self.tracking = tracking;
        self
    }

    /// Event channels.
    pub fn events(&self) -> &HistoryEvents {
        &self.events
    }

    /// The history root, resolved once and shared by every model.
    pub async fn history_root(&self) -> &Path {
        self.root
            .get_or_init(|| async {
                match self.probe.remote_root().await {
                    Ok(Some(remote)) => {
                        info!(root = %remote.display(), "Using remote history root");
                        remote
                    }
                    Ok(None) => self.local_root.clone(),
                    Err(e) => {
                        warn!(error = %e, "Remote history root probe failed");
                        self.local_root.clone()
                    }
                }
            })
            .await
    }

    fn key(resource: &Path) -> PathBuf {
        path::normalize(resource)
    }

    async fn model_for(&self, resource: &Path) -> SharedModel {
        let key = Self::key(resource);
        if let Some(model) = self.models.read().await.get(&key) {
            return Arc::clone(model);
        }

        let root = self.history_root().await.to_path_buf();
        let mut models = self.models.write().await;
        let model = models.entry(key.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(HistoryModel::new(
                key,
                root,
                Arc::clone(&self.store),
                Arc::clone(&self.settings),
                self.events.entry_emitter(),
            )))
        });
        Arc::clone(model)
    }

    fn registered(models: &HashMap<PathBuf, SharedModel>) -> Vec<(PathBuf, SharedModel)> {
        models
            .iter()
            .map(|(key, model)| (key.clone(), Arc::clone(model)))
            .collect()
    }

    /// Whether new entries for `resource` would be recorded.
    pub fn is_tracked(&self, resource: &Path) -> bool {
        self.tracking.enabled
            && self.store.supports(resource)
            && !keepsake_util::wildcard::matches_any(
                &self.tracking.exclude,
                &resource.to_string_lossy(),
            )
    }

    /// Record the current content of `resource`.
    ///
    /// `source` defaults to a plain save and `timestamp` to now. Returns
    /// `None` for resources that are not tracked or when cancelled.
    pub async fn add_entry(
        &self,
        resource: &Path,
        source: Option<&str>,
        timestamp: Option<i64>,
        cancel: &CancellationToken,
    ) -> HistoryResult<Option<HistoryEntry>> {
        if !self.is_tracked(resource) {
            debug!(resource = %resource.display(), "Not recording history for untracked resource");
            return Ok(None);
        }

        let model = self.model_for(resource).await;
        let mut model = model.lock().await;
        model
            .add_entry(
                source.unwrap_or(DEFAULT_SOURCE),
                timestamp.unwrap_or_else(now_millis),
                cancel,
            )
            .await
    }

    /// Relabel an entry.
    pub async fn update_entry(&self, entry: &HistoryEntry, source: &str, cancel: &CancellationToken) {
        let model = self.model_for(&entry.resource).await;
        model.lock().await.update_entry(entry, source, cancel).await;
    }

    /// Remove an entry and its snapshot.
    pub async fn remove_entry(&self, entry: &HistoryEntry, cancel: &CancellationToken) -> bool {
        let model = self.model_for(&entry.resource).await;
        let removed = model.lock().await.remove_entry(entry, cancel).await;
        removed
    }

    /// Entries of `resource`, oldest first.
    pub async fn get_entries(&self, resource: &Path, cancel: &CancellationToken) -> Vec<HistoryEntry> {
        let model = self.model_for(resource).await;
        let entries = model.lock().await.get_entries(cancel).await;
        entries
    }

    /// Look up one entry by id.
    pub async fn get_entry(
        &self,
        resource: &Path,
        id: &str,
        cancel: &CancellationToken,
    ) -> Option<HistoryEntry> {
        self.get_entries(resource, cancel)
            .await
            .into_iter()
            .find(|e| e.id == id)
    }

    /// Read an entry's snapshot content.
    pub async fn read_entry(&self, entry: &HistoryEntry) -> HistoryResult<Vec<u8>> {
        Ok(self.store.read_file(&entry.location).await?)
    }

    /// Overwrite the resource with an entry's snapshot.
    ///
    /// The current content is recorded first so the restore can be undone.
    pub async fn restore_entry(
        &self,
        entry: &HistoryEntry,
        cancel: &CancellationToken,
    ) -> HistoryResult<bool> {
        if cancel.is_cancelled() {
            return Ok(false);
        }

        let content = self.read_entry(entry).await?;
        if cancel.is_cancelled() {
            return Ok(false);
        }

        if self.store.exists(&entry.resource).await? {
            self.add_entry(&entry.resource, Some(RESTORED_SOURCE), None, cancel)
                .await?;
        }
        self.store.write_file(&entry.resource, &content).await?;

        info!(resource = %entry.resource.display(), entry = %entry.id, "Restored history entry");
        Ok(true)
    }

    /// Every resource with at least one entry.
    ///
    /// Combines resident models (memory only) with a scan of the history
    /// root. Unreadable folders are skipped.
    pub async fn get_all(&self, cancel: &CancellationToken) -> Vec<PathBuf> {
        let mut all: HashSet<PathBuf> = HashSet::new();
        if cancel.is_cancelled() {
            return Vec::new();
        }

        let resident = Self::registered(&*self.models.read().await);
        for (_, model) in resident {
            let mut model = model.lock().await;
            if model.has_entries(true).await {
                all.insert(model.resource().to_path_buf());
            }
        }

        let root = self.history_root().await.to_path_buf();
        let children = match self.store.list_children(&root).await {
            Ok(children) => children,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Failed to scan history root");
                Vec::new()
            }
        };
        if cancel.is_cancelled() {
            return Vec::new();
        }

        let scans = children
            .into_iter()
            .filter(|child| child.is_dir)
            .map(|child| self.scan_folder(child, cancel));
        all.extend(join_all(scans).await.into_iter().flatten());

        let mut all: Vec<PathBuf> = all.into_iter().collect();
        all.sort();
        all
    }

    async fn scan_folder(&self, folder: ChildEntry, cancel: &CancellationToken) -> Option<PathBuf> {
        let _permit = self.limiter.acquire().await.ok()?;
        if cancel.is_cancelled() {
            return None;
        }

        let bytes = self
            .store
            .read_file(&folder.path.join(LISTING_FILE))
            .await
            .ok()?;
        let listing = SerializedListing::parse(&bytes)?;
        (!listing.entries.is_empty()).then(|| PathBuf::from(listing.resource))
    }

    /// Delete every model and the whole history root.
    pub async fn remove_all(&self, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }

        self.models.write().await.clear();

        let root = self.history_root().await;
        match self.store.delete(root, true).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(root = %root.display(), error = %e, "Failed to delete history root"),
        }

        info!("Removed all history");
        self.events.all_entries_removed();
    }

    /// Flush every resident model.
    pub async fn store_all(&self, cancel: &CancellationToken) {
        let resident = Self::registered(&*self.models.read().await);
        let flushes = resident.into_iter().map(|(_, model)| async move {
            let Ok(_permit) = self.limiter.acquire().await else {
                return;
            };
            model.lock().await.store(cancel).await;
        });
        join_all(flushes).await;
    }

    /// Follow a move of `source` to `target`.
    ///
    /// Every resident resource equal to or below `source` is moved with its
    /// history. Each resource whose containing folder is unchanged is
    /// labelled a rename, every other one a move. One [`EntriesMoved`]
    /// event is sent once the whole batch is done.
    pub async fn handle_move(&self, source: &Path, target: &Path, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }

        let source = Self::key(source);
        let target = Self::key(target);

        let affected: Vec<(PathBuf, PathBuf, SharedModel)> = Self::registered(&*self.models.read().await)
            .into_iter()
            .filter_map(|(key, model)| {
                let moved_to = path::rebase(&key, &source, &target)?;
                Some((key, moved_to, model))
            })
            .collect();

        let moves = affected
            .into_iter()
            .map(|(from, to, model)| self.move_model(from, to, model, cancel));
        let resources: Vec<MovedResource> = join_all(moves).await.into_iter().flatten().collect();

        info!(
            source = %source.display(),
            target = %target.display(),
            moved = resources.len(),
            "History followed move"
        );
        self.events.entries_moved(EntriesMoved {
            source,
            target,
            resources,
        });
    }

    async fn move_model(
        &self,
        from: PathBuf,
        to: PathBuf,
        model: SharedModel,
        cancel: &CancellationToken,
    ) -> Option<MovedResource> {
        let _permit = self.limiter.acquire().await.ok()?;
        if cancel.is_cancelled() {
            return None;
        }

        let label = if path::same_parent(&from, &to) {
            RENAMED_SOURCE
        } else {
            MOVED_SOURCE
        };
        let outcome = model.lock().await.move_entries(&to, label, cancel).await;
        if outcome == MoveOutcome::Skipped {
            debug!(from = %from.display(), to = %to.display(), "Move cancelled before re-key");
            return None;
        }

        let mut models = self.models.write().await;
        models.remove(&from);
        models.insert(to.clone(), model);
        Some(MovedResource { from, to })
    }

    /// Run [`handle_move`](Self::handle_move) for each notification until
    /// `cancel` fires or the sender goes away.
    pub fn spawn_move_listener(
        self: &Arc<Self>,
        mut moves: broadcast::Receiver<ResourceMoved>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = moves.recv() => match received {
                        Ok(moved) => service.handle_move(&moved.source, &moved.target, &cancel).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Move listener fell behind; some moves were not followed");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            debug!("Move listener stopped");
        })
    }
}
