//! Content store doubles for testing.
//!
//! [`RecordingStore`] wraps a real store, remembers every call, and can be
//! told to fail a given kind of operation with a non-"not found" IO error.

use async_trait::async_trait;
use keepsake_store::{ChildEntry, ContentStore, LocalStore, MemoryStore, StoreError, StoreResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Kinds of content store calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    CloneFile,
    MoveFolder,
    MoveFile,
    Delete,
    ReadFile,
    WriteFile,
    ListChildren,
    Exists,
}

impl StoreOp {
    /// Whether the operation changes stored data.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            StoreOp::CloneFile
                | StoreOp::MoveFolder
                | StoreOp::MoveFile
                | StoreOp::Delete
                | StoreOp::WriteFile
        )
    }
}

/// A recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedOp {
    pub op: StoreOp,
    pub path: PathBuf,
}

/// A content store that records calls and injects failures.
///
/// # Example
///
/// ```rust
/// use keepsake_test_utils::mocks::{RecordingStore, StoreOp};
///
/// let store = RecordingStore::memory();
/// store.fail(StoreOp::Delete);
/// assert_eq!(store.count(StoreOp::Delete), 0);
/// ```
#[derive(Clone)]
pub struct RecordingStore {
    inner: Arc<dyn ContentStore>,
    ops: Arc<Mutex<Vec<RecordedOp>>>,
    failing: Arc<Mutex<HashSet<StoreOp>>>,
}

impl RecordingStore {
    /// Wrap an existing store.
    pub fn new(inner: Arc<dyn ContentStore>) -> Self {
        Self {
            inner,
            ops: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Wrap a fresh local filesystem store.
    pub fn local() -> Self {
        Self::new(Arc::new(LocalStore::new()))
    }

    /// Wrap a fresh in-memory store.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Share as a trait object, keeping this handle's recordings visible
    /// through clones.
    pub fn into_shared(self) -> Arc<dyn ContentStore> {
        Arc::new(self)
    }

    /// Make every following call of `op` fail.
    pub fn fail(&self, op: StoreOp) {
        self.failing.lock().unwrap().insert(op);
    }

    /// Let `op` succeed again.
    pub fn heal(&self, op: StoreOp) {
        self.failing.lock().unwrap().remove(&op);
    }

    /// All recorded calls, oldest first.
    pub fn ops(&self) -> Vec<RecordedOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Number of recorded calls of `op`.
    pub fn count(&self, op: StoreOp) -> usize {
        self.ops.lock().unwrap().iter().filter(|r| r.op == op).count()
    }

    /// Number of recorded calls that change stored data.
    pub fn mutations(&self) -> usize {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.op.is_mutation())
            .count()
    }

    /// Paths passed to `op`, oldest first.
    pub fn paths(&self, op: StoreOp) -> Vec<PathBuf> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.op == op)
            .map(|r| r.path.clone())
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }

    fn record(&self, op: StoreOp, path: &Path) -> StoreResult<()> {
        self.ops.lock().unwrap().push(RecordedOp {
            op,
            path: path.to_path_buf(),
        });
        if self.failing.lock().unwrap().contains(&op) {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "injected failure"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for RecordingStore {
    fn supports(&self, resource: &Path) -> bool {
        self.inner.supports(resource)
    }

    async fn clone_file(&self, src: &Path, dst: &Path) -> StoreResult<()> {
        self.record(StoreOp::CloneFile, dst)?;
        self.inner.clone_file(src, dst).await
    }

    async fn move_folder(&self, src: &Path, dst: &Path, overwrite: bool) -> StoreResult<()> {
        self.record(StoreOp::MoveFolder, src)?;
        self.inner.move_folder(src, dst, overwrite).await
    }

    async fn move_file(&self, src: &Path, dst: &Path) -> StoreResult<()> {
        self.record(StoreOp::MoveFile, src)?;
        self.inner.move_file(src, dst).await
    }

    async fn delete(&self, path: &Path, recursive: bool) -> StoreResult<()> {
        self.record(StoreOp::Delete, path)?;
        self.inner.delete(path, recursive).await
    }

    async fn read_file(&self, path: &Path) -> StoreResult<Vec<u8>> {
        self.record(StoreOp::ReadFile, path)?;
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> StoreResult<()> {
        self.record(StoreOp::WriteFile, path)?;
        self.inner.write_file(path, content).await
    }

    async fn list_children(&self, folder: &Path) -> StoreResult<Vec<ChildEntry>> {
        self.record(StoreOp::ListChildren, folder)?;
        self.inner.list_children(folder).await
    }

    async fn exists(&self, path: &Path) -> StoreResult<bool> {
        self.record(StoreOp::Exists, path)?;
        self.inner.exists(path).await
    }
}
