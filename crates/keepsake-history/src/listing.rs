//! The `entries.json` listing file.
//!
//! ```json
//! { "version": 1, "resource": "/work/notes.md",
//!   "entries": [ { "id": "aB3x.md", "timestamp": 1700000000000, "source": "moved" } ] }
//! ```
//!
//! `source` is omitted for plain saves. On read, a missing `source` means a
//! plain save and a missing `timestamp` keeps the snapshot file's mtime.

use crate::entry::{HistoryEntry, DEFAULT_SOURCE};
use crate::error::HistoryResult;
use serde::{Deserialize, Serialize};

/// Listing format version written by this crate.
pub const LISTING_VERSION: u32 = 1;

/// Serialized metadata for one history folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedListing {
    pub version: u32,
    pub resource: String,
    pub entries: Vec<SerializedEntry>,
}

/// Serialized metadata for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl SerializedListing {
    /// Build the listing for a resource's current entries.
    pub fn from_entries(resource: &str, entries: &[HistoryEntry]) -> Self {
        Self {
            version: LISTING_VERSION,
            resource: resource.to_string(),
            entries: entries
                .iter()
                .map(|entry| SerializedEntry {
                    id: entry.id.clone(),
                    timestamp: Some(entry.timestamp),
                    source: (!entry.is_default_source()).then(|| entry.source.clone()),
                })
                .collect(),
        }
    }

    /// Parse a listing. Returns `None` for anything unusable.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    /// Encode as a single compact JSON document.
    pub fn to_bytes(&self) -> HistoryResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl SerializedEntry {
    /// The source label, defaulting to a plain save.
    pub fn source_or_default(&self) -> &str {
        self.source.as_deref().unwrap_or(DEFAULT_SOURCE)
    }
}
