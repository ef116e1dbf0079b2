//! Local filesystem content store.
//!
//! Resources and history snapshots both live on the local disk. Writes go
//! to a hidden temp file first and are renamed into place.

use crate::{ChildEntry, ContentStore, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Content store backed by `tokio::fs`.
#[derive(Debug, Clone, Default)]
pub struct LocalStore;

impl LocalStore {
    /// Create a new local store.
    pub fn new() -> Self {
        Self
    }

    async fn ensure_parent(path: &Path) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::from_io(parent, e))?;
        }
        Ok(())
    }

    fn temp_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{name}.tmp"))
    }
}

#[async_trait]
impl ContentStore for LocalStore {
    fn supports(&self, resource: &Path) -> bool {
        resource.is_absolute()
    }

    async fn clone_file(&self, src: &Path, dst: &Path) -> StoreResult<()> {
        debug!(src = %src.display(), dst = %dst.display(), "Cloning file");
        Self::ensure_parent(dst).await?;
        fs::copy(src, dst)
            .await
            .map_err(|e| StoreError::from_io(src, e))?;
        Ok(())
    }

    async fn move_folder(&self, src: &Path, dst: &Path, overwrite: bool) -> StoreResult<()> {
        debug!(src = %src.display(), dst = %dst.display(), "Moving folder");
        fs::metadata(src)
            .await
            .map_err(|e| StoreError::from_io(src, e))?;

        if fs::try_exists(dst)
            .await
            .map_err(|e| StoreError::from_io(dst, e))?
        {
            if !overwrite {
                return Err(StoreError::AlreadyExists(dst.to_path_buf()));
            }
            fs::remove_dir_all(dst)
                .await
                .map_err(|e| StoreError::from_io(dst, e))?;
        }

        Self::ensure_parent(dst).await?;
        fs::rename(src, dst)
            .await
            .map_err(|e| StoreError::from_io(src, e))
    }

    async fn move_file(&self, src: &Path, dst: &Path) -> StoreResult<()> {
        debug!(src = %src.display(), dst = %dst.display(), "Moving file");
        Self::ensure_parent(dst).await?;
        fs::rename(src, dst)
            .await
            .map_err(|e| StoreError::from_io(src, e))
    }

    async fn delete(&self, path: &Path, recursive: bool) -> StoreResult<()> {
        debug!(path = %path.display(), recursive, "Deleting");
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| StoreError::from_io(path, e))?;

        let result = if metadata.is_dir() {
            if recursive {
                fs::remove_dir_all(path).await
            } else {
                fs::remove_dir(path).await
            }
        } else {
            fs::remove_file(path).await
        };
        result.map_err(|e| StoreError::from_io(path, e))
    }

    async fn read_file(&self, path: &Path) -> StoreResult<Vec<u8>> {
        fs::read(path).await.map_err(|e| StoreError::from_io(path, e))
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> StoreResult<()> {
        debug!(path = %path.display(), bytes = content.len(), "Writing file");
        Self::ensure_parent(path).await?;

        let temp_path = Self::temp_path(path);
        fs::write(&temp_path, content)
            .await
            .map_err(|e| StoreError::from_io(&temp_path, e))?;
        fs::rename(&temp_path, path)
            .await
            .map_err(|e| StoreError::from_io(path, e))
    }

    async fn list_children(&self, folder: &Path) -> StoreResult<Vec<ChildEntry>> {
        let mut entries = fs::read_dir(folder)
            .await
            .map_err(|e| StoreError::from_io(folder, e))?;

        let mut children = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::from_io(folder, e))?
        {
            let path = entry.path();
            // Entries can disappear between listing and stat.
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::from_io(&path, e)),
            };
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            children.push(ChildEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path,
                is_dir: metadata.is_dir(),
                modified,
            });
        }

        Ok(children)
    }

    async fn exists(&self, path: &Path) -> StoreResult<bool> {
        fs::try_exists(path)
            .await
            .map_err(|e| StoreError::from_io(path, e))
    }
}
