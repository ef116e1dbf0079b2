//! Content store adapters for keepsake.
//!
//! History snapshots and listing files are written through the
//! [`ContentStore`] trait so the history layer never talks to the
//! filesystem directly. Two backends are provided:
//! - Local filesystem storage (default)
//! - In-memory storage (for testing)

pub mod error;
pub mod local;
pub mod memory;

pub use error::{StoreError, StoreResult};
pub use local::LocalStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// One child of a listed folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    /// File name of the child.
    pub name: String,
    /// Full path of the child.
    pub path: PathBuf,
    /// Whether the child is a folder.
    pub is_dir: bool,
    /// Last modification time.
    pub modified: DateTime<Utc>,
}

/// The file-service operations history relies on.
///
/// Every method may fail with [`StoreError::NotFound`] when the path it
/// reads from does not exist; callers use that to tell "no history yet"
/// apart from real I/O trouble.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Whether this store can read the given resource at all.
    fn supports(&self, resource: &Path) -> bool;

    /// Copy `src` to `dst`, creating parent folders and replacing `dst`.
    async fn clone_file(&self, src: &Path, dst: &Path) -> StoreResult<()>;

    /// Move a folder. Fails with `AlreadyExists` if `dst` exists and
    /// `overwrite` is false.
    async fn move_folder(&self, src: &Path, dst: &Path, overwrite: bool) -> StoreResult<()>;

    /// Move a single file, creating the target's parent folders.
    async fn move_file(&self, src: &Path, dst: &Path) -> StoreResult<()>;

    /// Delete a file, or a folder when `recursive` is set.
    async fn delete(&self, path: &Path, recursive: bool) -> StoreResult<()>;

    /// Read a file's bytes.
    async fn read_file(&self, path: &Path) -> StoreResult<Vec<u8>>;

    /// Write a file, creating parent folders. The write replaces the
    /// previous content as a whole.
    async fn write_file(&self, path: &Path, content: &[u8]) -> StoreResult<()>;

    /// List the immediate children of a folder.
    async fn list_children(&self, folder: &Path) -> StoreResult<Vec<ChildEntry>>;

    /// Whether a file or folder exists.
    async fn exists(&self, path: &Path) -> StoreResult<bool>;
}
