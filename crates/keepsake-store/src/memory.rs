//! In-memory content store for testing.
//!
//! Files are kept in a map keyed by path; folders exist implicitly while
//! at least one file lives below them.

use crate::{ChildEntry, ContentStore, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct MemoryFile {
    content: Vec<u8>,
    modified: DateTime<Utc>,
}

/// In-memory content store.
///
/// This stores all data in memory and is not persistent.
pub struct MemoryStore {
    files: RwLock<BTreeMap<PathBuf, MemoryFile>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add a file directly, bypassing the trait.
    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(
                path.into(),
                MemoryFile {
                    content: content.into(),
                    modified: Utc::now(),
                },
            );
        }
    }

    /// Override a file's modification time.
    pub fn set_modified(&self, path: &Path, modified: DateTime<Utc>) {
        if let Ok(mut files) = self.files.write() {
            if let Some(file) = files.get_mut(path) {
                file.modified = modified;
            }
        }
    }

    /// All file paths currently stored, in order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files
            .read()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn read_lock(
        &self,
    ) -> StoreResult<std::sync::RwLockReadGuard<'_, BTreeMap<PathBuf, MemoryFile>>> {
        self.files
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write_lock(
        &self,
    ) -> StoreResult<std::sync::RwLockWriteGuard<'_, BTreeMap<PathBuf, MemoryFile>>> {
        self.files
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn below<'a>(
        files: &'a BTreeMap<PathBuf, MemoryFile>,
        folder: &'a Path,
    ) -> impl Iterator<Item = (&'a PathBuf, &'a MemoryFile)> + 'a {
        files
            .iter()
            .filter(move |(path, _)| path.starts_with(folder) && path.as_path() != folder)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    fn supports(&self, resource: &Path) -> bool {
        resource.is_absolute()
    }

    async fn clone_file(&self, src: &Path, dst: &Path) -> StoreResult<()> {
        let mut files = self.write_lock()?;
        let content = files
            .get(src)
            .map(|f| f.content.clone())
            .ok_or_else(|| StoreError::NotFound(src.to_path_buf()))?;
        files.insert(
            dst.to_path_buf(),
            MemoryFile {
                content,
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn move_folder(&self, src: &Path, dst: &Path, overwrite: bool) -> StoreResult<()> {
        let mut files = self.write_lock()?;

        let moving: Vec<PathBuf> = Self::below(&files, src).map(|(p, _)| p.clone()).collect();
        if moving.is_empty() {
            return Err(StoreError::NotFound(src.to_path_buf()));
        }

        let existing: Vec<PathBuf> = Self::below(&files, dst).map(|(p, _)| p.clone()).collect();
        if !existing.is_empty() {
            if !overwrite {
                return Err(StoreError::AlreadyExists(dst.to_path_buf()));
            }
            for path in existing {
                files.remove(&path);
            }
        }

        for path in moving {
            if let (Some(file), Ok(suffix)) = (files.remove(&path), path.strip_prefix(src)) {
                files.insert(dst.join(suffix), file);
            }
        }
        Ok(())
    }

    async fn move_file(&self, src: &Path, dst: &Path) -> StoreResult<()> {
        let mut files = self.write_lock()?;
        let file = files
            .remove(src)
            .ok_or_else(|| StoreError::NotFound(src.to_path_buf()))?;
        files.insert(dst.to_path_buf(), file);
        Ok(())
    }

    async fn delete(&self, path: &Path, recursive: bool) -> StoreResult<()> {
        let mut files = self.write_lock()?;
        if files.remove(path).is_some() {
            return Ok(());
        }

        let nested: Vec<PathBuf> = Self::below(&files, path).map(|(p, _)| p.clone()).collect();
        if nested.is_empty() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        if !recursive {
            return Err(StoreError::Unsupported(format!(
                "folder {} is not empty",
                path.display()
            )));
        }
        for p in nested {
            files.remove(&p);
        }
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> StoreResult<Vec<u8>> {
        self.read_lock()?
            .get(path)
            .map(|f| f.content.clone())
            .ok_or_else(|| StoreError::NotFound(path.to_path_buf()))
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> StoreResult<()> {
        self.write_lock()?.insert(
            path.to_path_buf(),
            MemoryFile {
                content: content.to_vec(),
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list_children(&self, folder: &Path) -> StoreResult<Vec<ChildEntry>> {
        let files = self.read_lock()?;

        let mut children: HashMap<String, ChildEntry> = HashMap::new();
        for (path, file) in Self::below(&files, folder) {
            let Ok(relative) = path.strip_prefix(folder) else {
                continue;
            };
            let mut components = relative.components();
            let Some(first) = components.next() else {
                continue;
            };
            let name = first.as_os_str().to_string_lossy().into_owned();
            let is_dir = components.next().is_some();

            let child = children.entry(name.clone()).or_insert_with(|| ChildEntry {
                path: folder.join(&name),
                name,
                is_dir,
                modified: file.modified,
            });
            child.modified = child.modified.max(file.modified);
        }

        if children.is_empty() {
            return Err(StoreError::NotFound(folder.to_path_buf()));
        }
        Ok(children.into_values().collect())
    }

    async fn exists(&self, path: &Path) -> StoreResult<bool> {
        let files = self.read_lock()?;
        Ok(files.contains_key(path) || Self::below(&files, path).next().is_some())
    }
}
