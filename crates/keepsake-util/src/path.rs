//! Path utilities.
//!
//! Resources are identified by lexically normalized absolute paths. None of
//! the helpers here touch the filesystem unless stated otherwise, since
//! moved or deleted resources must still compare correctly.

use std::path::{Component, Path, PathBuf};

/// Get the keepsake configuration directory.
///
/// This follows XDG conventions on Linux/macOS:
/// - `$XDG_CONFIG_HOME/keepsake` if set
/// - `~/.config/keepsake` otherwise
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("keepsake"))
}

/// Get the keepsake data directory.
///
/// This follows XDG conventions:
/// - `$XDG_DATA_HOME/keepsake` if set
/// - `~/.local/share/keepsake` otherwise
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("keepsake"))
}

/// Default local history root.
pub fn history_dir() -> Option<PathBuf> {
    data_dir().map(|p| p.join("history"))
}

/// Normalize a path by removing `.` and `..` components.
///
/// Unlike `canonicalize`, this doesn't require the path to exist.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            _ => {
                result.push(component);
            }
        }
    }

    result
}

/// Make a path relative to a base directory.
///
/// Returns `None` if the path is not within the base directory.
pub fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    path.strip_prefix(base).ok().map(|p| p.to_path_buf())
}

/// Re-root `path` from `from` onto `to`.
///
/// `/a/dir/sub/x.txt` moved from `/a/dir` to `/b/renamed` becomes
/// `/b/renamed/sub/x.txt`. Returns `None` if `path` is not within `from`.
pub fn rebase(path: &Path, from: &Path, to: &Path) -> Option<PathBuf> {
    let suffix = relative_to(path, from)?;
    if suffix.as_os_str().is_empty() {
        Some(to.to_path_buf())
    } else {
        Some(to.join(suffix))
    }
}

/// Whether two paths share the same containing folder.
pub fn same_parent(a: &Path, b: &Path) -> bool {
    a.parent() == b.parent()
}

/// The extension of `path` including its leading dot, or an empty string.
pub fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Find the project root by walking up the directory tree.
///
/// Looks for a `.keepsake/` folder, a `keepsake.json` file, or `.git/`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let markers = [".keepsake", "keepsake.json", "keepsake.jsonc", ".git"];

    let mut current = start.to_path_buf();

    loop {
        for marker in &markers {
            if current.join(marker).exists() {
                return Some(current);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}
