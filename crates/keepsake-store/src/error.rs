//! Content store error types.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for content store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during content store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The file or folder does not exist.
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The target of a move exists and overwriting was not requested.
    #[error("Already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Any other IO failure (permissions, disk, network mounts).
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The operation was refused by the store.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Lock was poisoned (another thread panicked while holding the lock)
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    /// Classify an IO error raised while working on `path`.
    pub fn from_io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// Whether this error only means the path is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
