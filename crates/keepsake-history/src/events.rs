//! History events.
//!
//! Each event kind has its own broadcast channel so listeners only wake for
//! what they care about. A wildcard channel carries every event as
//! [`HistoryEvent`] for listeners that want the whole stream.
//!
//! Models only receive an [`EntryEvents`] emitter; batch events are sent by
//! the service alone.

use crate::entry::HistoryEntry;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Default channel capacity.
const DEFAULT_CAPACITY: usize = 256;

/// A new entry was recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryAdded {
    pub entry: HistoryEntry,
}

/// An entry's source label changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryChanged {
    pub entry: HistoryEntry,
}

/// A save merged into the most recent entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryReplaced {
    pub entry: HistoryEntry,
}

/// An entry was removed or evicted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRemoved {
    pub entry: HistoryEntry,
}

/// One resource whose history followed a move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovedResource {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// History followed a move of `source` to `target`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntriesMoved {
    pub source: PathBuf,
    pub target: PathBuf,
    pub resources: Vec<MovedResource>,
}

/// All history was deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllEntriesRemoved;

/// Incoming notification that a file or folder moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMoved {
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Any history event, for wildcard listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    EntryAdded(EntryAdded),
    EntryChanged(EntryChanged),
    EntryReplaced(EntryReplaced),
    EntryRemoved(EntryRemoved),
    EntriesMoved(EntriesMoved),
    AllEntriesRemoved,
}

/// Emitter for entry-level events, handed to each model.
#[derive(Clone)]
pub struct EntryEvents {
    added: broadcast::Sender<EntryAdded>,
    changed: broadcast::Sender<EntryChanged>,
    replaced: broadcast::Sender<EntryReplaced>,
    removed: broadcast::Sender<EntryRemoved>,
    all: broadcast::Sender<HistoryEvent>,
}

impl EntryEvents {
    fn new(all: broadcast::Sender<HistoryEvent>) -> Self {
        Self {
            added: broadcast::channel(DEFAULT_CAPACITY).0,
            changed: broadcast::channel(DEFAULT_CAPACITY).0,
            replaced: broadcast::channel(DEFAULT_CAPACITY).0,
            removed: broadcast::channel(DEFAULT_CAPACITY).0,
            all,
        }
    }

    // Send errors only mean nobody is listening.

    pub(crate) fn added(&self, entry: &HistoryEntry) {
        let event = EntryAdded {
            entry: entry.clone(),
        };
        let _ = self.added.send(event.clone());
        let _ = self.all.send(HistoryEvent::EntryAdded(event));
    }

    pub(crate) fn changed(&self, entry: &HistoryEntry) {
        let event = EntryChanged {
            entry: entry.clone(),
        };
        let _ = self.changed.send(event.clone());
        let _ = self.all.send(HistoryEvent::EntryChanged(event));
    }

    pub(crate) fn replaced(&self, entry: &HistoryEntry) {
        let event = EntryReplaced {
            entry: entry.clone(),
        };
        let _ = self.replaced.send(event.clone());
        let _ = self.all.send(HistoryEvent::EntryReplaced(event));
    }

    pub(crate) fn removed(&self, entry: &HistoryEntry) {
        let event = EntryRemoved {
            entry: entry.clone(),
        };
        let _ = self.removed.send(event.clone());
        let _ = self.all.send(HistoryEvent::EntryRemoved(event));
    }
}

/// All history channels, owned by the service.
#[derive(Clone)]
pub struct HistoryEvents {
    entries: EntryEvents,
    moved: broadcast::Sender<EntriesMoved>,
    all_removed: broadcast::Sender<AllEntriesRemoved>,
    all: broadcast::Sender<HistoryEvent>,
}

impl HistoryEvents {
    /// Create a fresh set of channels.
    pub fn new() -> Self {
        let (all, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self {
            entries: EntryEvents::new(all.clone()),
            moved: broadcast::channel(DEFAULT_CAPACITY).0,
            all_removed: broadcast::channel(DEFAULT_CAPACITY).0,
            all,
        }
    }

    /// The narrow emitter given to models.
    pub fn entry_emitter(&self) -> EntryEvents {
        self.entries.clone()
    }

    pub(crate) fn entries_moved(&self, event: EntriesMoved) {
        let _ = self.moved.send(event.clone());
        let _ = self.all.send(HistoryEvent::EntriesMoved(event));
    }

    pub(crate) fn all_entries_removed(&self) {
        let _ = self.all_removed.send(AllEntriesRemoved);
        let _ = self.all.send(HistoryEvent::AllEntriesRemoved);
    }

    pub fn subscribe_added(&self) -> broadcast::Receiver<EntryAdded> {
        self.entries.added.subscribe()
    }

    pub fn subscribe_changed(&self) -> broadcast::Receiver<EntryChanged> {
        self.entries.changed.subscribe()
    }

    pub fn subscribe_replaced(&self) -> broadcast::Receiver<EntryReplaced> {
        self.entries.replaced.subscribe()
    }

    pub fn subscribe_removed(&self) -> broadcast::Receiver<EntryRemoved> {
        self.entries.removed.subscribe()
    }

    pub fn subscribe_moved(&self) -> broadcast::Receiver<EntriesMoved> {
        self.moved.subscribe()
    }

    pub fn subscribe_all_removed(&self) -> broadcast::Receiver<AllEntriesRemoved> {
        self.all_removed.subscribe()
    }

    /// Subscribe to every event (wildcard).
    pub fn subscribe_all(&self) -> broadcast::Receiver<HistoryEvent> {
        self.all.subscribe()
    }
}

impl Default for HistoryEvents {
    fn default() -> Self {
        Self::new()
    }
}
