//! Download manager port definition.
//!
//! This port is the public interface of the download subsystem: per-item
//! start/pause/resume/cancel plus lightweight status queries. All control
//! operations are fire-and-forget; outcomes arrive asynchronously through
//! the event sink, and wrong-state calls are no-ops rather than errors.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use crate::download::{DownloadStatus, ResourceKey};

/// Configuration for creating a download manager.
#[derive(Debug, Clone)]
pub struct DownloadManagerConfig {
    /// Directory where finalized artifacts are stored, one file per key.
    pub library_dir: PathBuf,
    /// Directory where in-flight partial artifacts are written.
    pub staging_dir: PathBuf,
    /// Minimum interval between progress notifications per key.
    pub progress_interval: Duration,
}

impl Default for DownloadManagerConfig {
    fn default() -> Self {
        let library_dir = PathBuf::from(".");
        Self {
            staging_dir: library_dir.join(".staging"),
            library_dir,
            progress_interval: Duration::from_millis(100),
        }
    }
}

impl DownloadManagerConfig {
    /// Create a new config with the library directory.
    ///
    /// The staging directory defaults to `.staging` inside the library.
    #[must_use]
    pub fn new(library_dir: PathBuf) -> Self {
        Self {
            staging_dir: library_dir.join(".staging"),
            library_dir,
            ..Default::default()
        }
    }

    /// Set the staging directory.
    #[must_use]
    pub fn with_staging_dir(mut self, dir: PathBuf) -> Self {
        self.staging_dir = dir;
        self
    }

    /// Set the minimum interval between progress notifications.
    #[must_use]
    pub const fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}

/// Port for managing per-item downloads.
///
/// # Usage
///
/// ```ignore
/// let manager: Arc<dyn DownloadManagerPort> = /* ... */;
///
/// let key = ResourceKey::new("https://example.com/previews/track.m4a");
/// manager.start(key.clone(), key.as_str().to_string()).await;
/// manager.pause(&key).await;
/// manager.resume(&key).await;
/// manager.cancel(&key).await;
/// ```
#[async_trait]
pub trait DownloadManagerPort: Send + Sync {
    /// Start (or restart) a download for `key` fetching `locator`.
    ///
    /// Any existing record for the key is silently replaced and its
    /// transfer aborted; progress restarts from zero. Failure to issue the
    /// transfer surfaces as an asynchronous `Failed` event, never a
    /// synchronous error.
    async fn start(&self, key: ResourceKey, locator: String);

    /// Pause the download for `key`. No-op unless it is downloading.
    ///
    /// The resumption token (when the server supports byte ranges) is
    /// captured asynchronously after the abort is acknowledged.
    async fn pause(&self, key: &ResourceKey);

    /// Resume the download for `key`. No-op unless it is paused.
    async fn resume(&self, key: &ResourceKey);

    /// Cancel the download for `key` and forget it. Idempotent.
    async fn cancel(&self, key: &ResourceKey);

    /// Current status and progress for `key`, if it is being tracked.
    async fn snapshot(&self, key: &ResourceKey) -> Option<(DownloadStatus, f64)>;

    /// Number of records in the active registry.
    async fn active_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_staging_under_library() {
        let config = DownloadManagerConfig::new(PathBuf::from("/library"));
        assert_eq!(config.library_dir, PathBuf::from("/library"));
        assert_eq!(config.staging_dir, PathBuf::from("/library/.staging"));
    }

    #[test]
    fn config_builders_override() {
        let config = DownloadManagerConfig::new(PathBuf::from("/library"))
            .with_staging_dir(PathBuf::from("/tmp/parts"))
            .with_progress_interval(Duration::from_millis(250));
        assert_eq!(config.staging_dir, PathBuf::from("/tmp/parts"));
        assert_eq!(config.progress_interval, Duration::from_millis(250));
    }
}
