//! Per-file revision history for keepsake.
//!
//! This crate keeps recent versions of edited files:
//! - Snapshot a file on save, merging rapid same-source saves
//! - Remember why each snapshot was taken (saved, renamed, moved, ...)
//! - Retain a configurable number of snapshots per file
//! - Follow files and folders across renames and moves
//! - Survive restarts by reconciling memory with what is on disk
//!
//! # Example
//!
//! ```no_run
//! use keepsake_history::{HistoryConfig, HistoryService};
//! use keepsake_store::LocalStore;
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (config, _) = HistoryConfig::load(None).await?;
//! let service = HistoryService::from_config(Arc::new(LocalStore::new()), config)
//!     .ok_or("no data directory")?;
//! let cancel = CancellationToken::new();
//!
//! // Record the file as just saved
//! service.add_entry(Path::new("/work/notes.md"), None, None, &cancel).await?;
//!
//! // Browse its history, oldest first
//! for entry in service.get_entries(Path::new("/work/notes.md"), &cancel).await {
//!     println!("{} {} {}", entry.id, entry.timestamp, entry.source);
//! }
//!
//! // Persist before exiting
//! service.store_all(&cancel).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod entry;
mod error;
pub mod events;
pub mod listing;
mod model;
pub mod root;
mod service;

pub use config::{HistoryConfig, HistorySettings, SettingKey};
pub use entry::{
    now_millis, HistoryEntry, DEFAULT_SOURCE, MOVED_SOURCE, RENAMED_SOURCE, RESTORED_SOURCE,
};
pub use error::{ConfigError, HistoryError, HistoryResult};
pub use events::{HistoryEvent, HistoryEvents, ResourceMoved};
pub use model::{HistoryModel, MoveOutcome};
pub use service::{HistoryService, TrackingOptions, MAX_PARALLEL_IO};
