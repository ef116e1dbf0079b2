//! History configuration.
//!
//! Configuration is loaded from multiple sources and merged:
//! 1. Global config: `~/.config/keepsake/config.json`
//! 2. Environment variable: `KEEPSAKE_CONFIG_CONTENT`
//! 3. Project config: `keepsake.json` or `keepsake.jsonc` in the project directory
//!
//! JSONC (JSON with comments) is accepted everywhere.
//!
//! ```jsonc
//! {
//!   "maxFileEntries": 50,
//!   "mergeWindow": 10,            // seconds
//!   "exclude": ["*.lock", "*/target/*"],
//!   "overrides": { "*.md": { "maxFileEntries": 200 } }
//! }
//! ```

use crate::error::{ConfigError, HistoryResult};
use keepsake_util::wildcard;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Retained entries per resource when nothing is configured.
pub const DEFAULT_MAX_ENTRIES: u64 = 50;

/// Merge window in seconds when nothing is configured.
pub const DEFAULT_MERGE_WINDOW_SECS: u64 = 10;

/// Numeric settings the history model reads per resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    /// Maximum retained entries for a resource.
    MaxEntries,
    /// Window in seconds within which same-source entries merge.
    MergeWindowSeconds,
}

/// Resource-scoped access to numeric settings.
pub trait HistorySettings: Send + Sync {
    /// Look up a setting for `resource`. `None` means "use the default".
    fn get_number(&self, key: SettingKey, resource: &Path) -> Option<u64>;
}

/// Settings that apply to resources matching one pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScopedSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_entries: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_window: Option<u64>,
}

impl ScopedSettings {
    fn get(&self, key: SettingKey) -> Option<u64> {
        match key {
            SettingKey::MaxEntries => self.max_file_entries,
            SettingKey::MergeWindowSeconds => self.merge_window,
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            max_file_entries: other.max_file_entries.or(self.max_file_entries),
            merge_window: other.merge_window.or(self.merge_window),
        }
    }
}

/// Main history configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Whether new entries are recorded at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Maximum retained entries per resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_entries: Option<u64>,

    /// Merge window in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_window: Option<u64>,

    /// Wildcard patterns of resources that are never tracked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,

    /// History root shared with other machines, used when reachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_root: Option<PathBuf>,

    /// Replaces the default local history root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_root: Option<PathBuf>,

    /// Per-pattern settings. Each setting comes from the most specific
    /// matching pattern that sets it, then from the global value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<HashMap<String, ScopedSettings>>,
}

impl HistoryConfig {
    /// Load configuration from all sources.
    ///
    /// Loading order (later sources override earlier):
    /// 1. Global config from `~/.config/keepsake/`
    /// 2. `KEEPSAKE_CONFIG_CONTENT` environment variable
    /// 3. Project config from `project_dir`
    pub async fn load(project_dir: Option<&Path>) -> HistoryResult<(Self, Vec<PathBuf>)> {
        let mut config = HistoryConfig::default();
        let mut sources = Vec::new();

        if let Some(global_dir) = keepsake_util::path::config_dir() {
            for name in &["config.json", "keepsake.json", "keepsake.jsonc"] {
                let path = global_dir.join(name);
                if path.exists() {
                    config = config.merge(Self::load_file(&path).await?);
                    sources.push(path);
                    break;
                }
            }
        }

        if let Ok(content) = std::env::var("KEEPSAKE_CONFIG_CONTENT") {
            config = config.merge(Self::parse_jsonc(&content, "<env>")?);
        }

        if let Some(dir) = project_dir {
            for name in &["keepsake.jsonc", "keepsake.json"] {
                let path = dir.join(name);
                if path.exists() {
                    config = config.merge(Self::load_file(&path).await?);
                    sources.push(path);
                    break;
                }
            }
        }

        Ok((config, sources))
    }

    /// Load configuration from a file.
    pub async fn load_file(path: &Path) -> HistoryResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::parse_jsonc(&content, &path.display().to_string())
    }

    /// Parse JSONC (JSON with comments).
    pub fn parse_jsonc(content: &str, source: &str) -> HistoryResult<Self> {
        let stripped = Self::strip_comments(content);

        serde_json::from_str(&stripped).map_err(|e| {
            ConfigError::InvalidJson {
                path: source.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Strip `//` and `/* */` comments outside of strings.
    fn strip_comments(input: &str) -> String {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        let mut in_string = false;
        let mut escape_next = false;

        while let Some(c) = chars.next() {
            if escape_next {
                result.push(c);
                escape_next = false;
                continue;
            }

            if c == '\\' && in_string {
                result.push(c);
                escape_next = true;
                continue;
            }

            if c == '"' {
                in_string = !in_string;
                result.push(c);
                continue;
            }

            if !in_string && c == '/' {
                match chars.peek() {
                    Some('/') => {
                        for c in chars.by_ref() {
                            if c == '\n' {
                                result.push('\n');
                                break;
                            }
                        }
                        continue;
                    }
                    Some('*') => {
                        chars.next();
                        let mut prev = ' ';
                        for c in chars.by_ref() {
                            if prev == '*' && c == '/' {
                                break;
                            }
                            if c == '\n' {
                                result.push('\n');
                            }
                            prev = c;
                        }
                        continue;
                    }
                    _ => {}
                }
            }

            result.push(c);
        }

        result
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(mut self, other: Self) -> Self {
        if other.enabled.is_some() {
            self.enabled = other.enabled;
        }
        if other.max_file_entries.is_some() {
            self.max_file_entries = other.max_file_entries;
        }
        if other.merge_window.is_some() {
            self.merge_window = other.merge_window;
        }
        if other.exclude.is_some() {
            self.exclude = other.exclude;
        }
        if other.remote_root.is_some() {
            self.remote_root = other.remote_root;
        }
        if other.local_root.is_some() {
            self.local_root = other.local_root;
        }

        self.overrides = match (self.overrides, other.overrides) {
            (Some(mut base), Some(other)) => {
                for (pattern, scoped) in other {
                    let merged = match base.remove(&pattern) {
                        Some(existing) => existing.merge(scoped),
                        None => scoped,
                    };
                    base.insert(pattern, merged);
                }
                Some(base)
            }
            (base, None) => base,
            (None, other) => other,
        };

        self
    }

    /// Whether recording is enabled. Defaults to true.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// The local history root: `localRoot` or the platform data directory.
    pub fn local_root(&self) -> Option<PathBuf> {
        self.local_root
            .clone()
            .or_else(keepsake_util::path::history_dir)
    }
}

impl HistorySettings for HistoryConfig {
    fn get_number(&self, key: SettingKey, resource: &Path) -> Option<u64> {
        let scoped = self.overrides.as_ref().and_then(|overrides| {
            let patterns: Vec<&str> = overrides.keys().map(String::as_str).collect();
            let text = resource.to_string_lossy();
            wildcard::matches_by_specificity(&patterns, &text)
                .into_iter()
                .filter_map(|pattern| overrides.get(pattern))
                .find_map(|settings| settings.get(key))
        });

        scoped.or(match key {
            SettingKey::MaxEntries => self.max_file_entries,
            SettingKey::MergeWindowSeconds => self.merge_window,
        })
    }
}
