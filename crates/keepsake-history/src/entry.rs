//! History entry data structures.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Source label for plain saves. Omitted from listing files.
pub const DEFAULT_SOURCE: &str = "saved";

/// Source label for entries recorded when a resource moves to another folder.
pub const MOVED_SOURCE: &str = "moved";

/// Source label for entries recorded when a resource is renamed in place.
pub const RENAMED_SOURCE: &str = "renamed";

/// Source label for the entry taken right before a restore overwrites a resource.
pub const RESTORED_SOURCE: &str = "restored";

/// One retained snapshot of a tracked resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique within the resource's history folder, e.g. `aB3x.rs`.
    pub id: String,

    /// The tracked resource.
    pub resource: PathBuf,

    /// Display name of the resource.
    pub name: String,

    /// Where the snapshot content lives.
    pub location: PathBuf,

    /// Creation (or last replace) time in epoch milliseconds.
    pub timestamp: i64,

    /// Why the entry was created.
    pub source: String,
}

impl HistoryEntry {
    /// Whether this entry carries the plain-save label.
    pub fn is_default_source(&self) -> bool {
        self.source == DEFAULT_SOURCE
    }
}

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
