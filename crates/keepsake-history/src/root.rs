//! History root discovery.
//!
//! A remote-designated root (for example a synced or mounted folder) wins
//! when it is reachable; otherwise history lives under the local data
//! directory.

use crate::error::HistoryResult;
use async_trait::async_trait;
use keepsake_store::ContentStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Probes for a remote-designated history root.
#[async_trait]
pub trait RootProbe: Send + Sync {
    /// The remote root, if one is designated and reachable.
    async fn remote_root(&self) -> HistoryResult<Option<PathBuf>>;
}

/// Never reports a remote root.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemoteRoot;

#[async_trait]
impl RootProbe for NoRemoteRoot {
    async fn remote_root(&self) -> HistoryResult<Option<PathBuf>> {
        Ok(None)
    }
}

/// Reports the configured `remoteRoot` when the store can reach it.
pub struct ConfigRootProbe {
    remote: Option<PathBuf>,
    store: Arc<dyn ContentStore>,
}

impl ConfigRootProbe {
    pub fn new(remote: Option<PathBuf>, store: Arc<dyn ContentStore>) -> Self {
        Self { remote, store }
    }
}

#[async_trait]
impl RootProbe for ConfigRootProbe {
    async fn remote_root(&self) -> HistoryResult<Option<PathBuf>> {
        let Some(remote) = &self.remote else {
            return Ok(None);
        };
        if self.store.exists(remote).await? {
            Ok(Some(remote.clone()))
        } else {
            Ok(None)
        }
    }
}
