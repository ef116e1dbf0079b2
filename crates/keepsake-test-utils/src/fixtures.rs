//! Test fixtures for creating reproducible test environments.
//!
//! A workspace is a temporary directory with two halves: `work/` holds the
//! tracked files and `history/` is where snapshots go.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary workspace with configurable tracked files.
///
/// # Example
///
/// ```rust
/// use keepsake_test_utils::fixtures::TestWorkspace;
///
/// let workspace = TestWorkspace::new()
///     .with_file("notes.md", "# Notes")
///     .with_file("src/main.rs", "fn main() {}")
///     .build();
///
/// assert!(workspace.file("src/main.rs").exists());
/// assert!(workspace.history_root().starts_with(workspace.root()));
/// ```
pub struct TestWorkspace {
    temp_dir: TempDir,
    files: HashMap<PathBuf, Vec<u8>>,
}

impl TestWorkspace {
    /// Create a new test workspace builder.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            files: HashMap::new(),
        }
    }

    /// Add a tracked file, relative to `work/`.
    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) -> Self {
        self.files
            .insert(path.as_ref().to_path_buf(), contents.into());
        self
    }

    /// Build the workspace, creating all files.
    pub fn build(self) -> BuiltTestWorkspace {
        let built = BuiltTestWorkspace {
            temp_dir: self.temp_dir,
        };
        fs::create_dir_all(built.work_dir()).expect("Failed to create work directory");
        for (path, contents) in &self.files {
            built.write_file(path, contents);
        }
        built
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// A built test workspace with files created on disk.
///
/// The temporary directory is automatically cleaned up when this is dropped.
pub struct BuiltTestWorkspace {
    temp_dir: TempDir,
}

impl BuiltTestWorkspace {
    /// The temporary directory itself.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Folder holding tracked files.
    pub fn work_dir(&self) -> PathBuf {
        self.root().join("work")
    }

    /// History root to hand to the service.
    pub fn history_root(&self) -> PathBuf {
        self.root().join("history")
    }

    /// Absolute path of a tracked file.
    pub fn file(&self, path: impl AsRef<Path>) -> PathBuf {
        self.work_dir().join(path)
    }

    /// Read a tracked file.
    pub fn read_file(&self, path: impl AsRef<Path>) -> String {
        let full_path = self.file(path);
        fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read file {}: {}", full_path.display(), e))
    }

    /// Write a tracked file (for simulating edits during tests).
    pub fn write_file(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let full_path = self.file(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).ok();
        }
        fs::write(&full_path, contents.as_ref())
            .unwrap_or_else(|e| panic!("Failed to write file {}: {}", full_path.display(), e));
    }

    /// Move a tracked file or folder on disk.
    pub fn rename(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) {
        let (from, to) = (self.file(from), self.file(to));
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).ok();
        }
        fs::rename(&from, &to).unwrap_or_else(|e| {
            panic!("Failed to move {} to {}: {}", from.display(), to.display(), e)
        });
    }

    /// History folders currently under the history root.
    pub fn history_folders(&self) -> Vec<PathBuf> {
        let root = self.history_root();
        if !root.exists() {
            return Vec::new();
        }
        fs::read_dir(&root)
            .unwrap_or_else(|e| panic!("Failed to read directory {}: {}", root.display(), e))
            .filter_map(|entry| {
                let entry = entry.ok()?;
                entry.file_type().ok()?.is_dir().then(|| entry.path())
            })
            .collect()
    }
}
