//! Storage finalizer port.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::download::{DownloadError, ResourceKey};

/// Port for materializing a completed temporary artifact into the store.
///
/// `finalize` must atomically replace any prior artifact stored under the
/// key's derived permanent location: remove the old artifact (ignoring
/// not-found) then move the new one into place. On failure the item must
/// not be considered downloaded; disposal of the stale temporary file is
/// best-effort and only logged.
#[async_trait]
pub trait StorageFinalizerPort: Send + Sync {
    /// Move `temp_path` into the permanent location for `key`.
    ///
    /// Returns the permanent artifact path on success.
    async fn finalize(&self, key: &ResourceKey, temp_path: &Path)
        -> Result<PathBuf, DownloadError>;
}
