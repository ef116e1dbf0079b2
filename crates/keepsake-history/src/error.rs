//! History error types.

use keepsake_store::StoreError;
use thiserror::Error;

/// Result type for history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Errors that can occur during history operations.
///
/// Most content store failures are logged and swallowed inside the model;
/// only the initial snapshot of `add_entry` and explicit reads surface here.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Content store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Listing serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid JSON/JSONC syntax.
    #[error("invalid config at {path}: {message}")]
    InvalidJson { path: String, message: String },

    /// Config file could not be read.
    #[error("could not read config at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn history_error_wraps_store_error() {
        let err = HistoryError::from(StoreError::NotFound(PathBuf::from("/a.txt")));
        assert_eq!(err.to_string(), "store error: Not found: /a.txt");
    }

    #[test]
    fn config_error_formats_path() {
        let err = ConfigError::InvalidJson {
            path: "keepsake.json".to_string(),
            message: "expected value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid config at keepsake.json: expected value"
        );
    }
}
