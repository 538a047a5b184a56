//! Filesystem storage finalizer.
//!
//! Moves a completed temporary artifact into its permanent location in the
//! library, replacing any prior artifact stored under the same key.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use tunevault_core::download::{DownloadError, ResourceKey};
use tunevault_core::ports::StorageFinalizerPort;

/// Finalizer that materializes artifacts as one file per key inside a
/// library directory, named deterministically from the key.
pub struct FsFinalizer {
    library_dir: PathBuf,
}

impl FsFinalizer {
    /// Create a finalizer storing artifacts under `library_dir`.
    #[must_use]
    pub fn new(library_dir: PathBuf) -> Self {
        Self { library_dir }
    }

    /// Permanent artifact path for a key.
    #[must_use]
    pub fn artifact_path(&self, key: &ResourceKey) -> PathBuf {
        self.library_dir.join(key.artifact_name())
    }

    /// Move `from` to `to`, falling back to copy+remove across filesystems.
    async fn move_into_place(from: &Path, to: &Path) -> Result<(), DownloadError> {
        if tokio::fs::rename(from, to).await.is_ok() {
            return Ok(());
        }

        tokio::fs::copy(from, to)
            .await
            .map_err(|e| DownloadError::finalize(format!("copy to {}: {e}", to.display())))?;
        if let Err(e) = tokio::fs::remove_file(from).await {
            tracing::debug!(path = %from.display(), error = %e, "Could not remove temp after copy");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageFinalizerPort for FsFinalizer {
    async fn finalize(
        &self,
        key: &ResourceKey,
        temp_path: &Path,
    ) -> Result<PathBuf, DownloadError> {
        tokio::fs::create_dir_all(&self.library_dir)
            .await
            .map_err(|e| {
                DownloadError::finalize(format!(
                    "create {}: {e}",
                    self.library_dir.display()
                ))
            })?;

        let dest = self.artifact_path(key);

        // Replace semantics: drop any prior artifact for the key first
        if let Err(e) = tokio::fs::remove_file(&dest).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(DownloadError::finalize(format!(
                    "remove prior artifact {}: {e}",
                    dest.display()
                )));
            }
        }

        match Self::move_into_place(temp_path, &dest).await {
            Ok(()) => {
                tracing::info!(key = %key, path = %dest.display(), "Artifact finalized");
                Ok(dest)
            }
            Err(error) => {
                // The temp file is stale now; disposal is best-effort
                if let Err(e) = tokio::fs::remove_file(temp_path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(
                            path = %temp_path.display(),
                            error = %e,
                            "Could not dispose of temp artifact"
                        );
                    }
                }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn finalize_moves_temp_into_library() {
        let tmp = tempfile::tempdir().unwrap();
        let library = tmp.path().join("library");
        let temp = write_temp(tmp.path(), "incoming.m4a", b"audio-bytes");

        let finalizer = FsFinalizer::new(library.clone());
        let key = ResourceKey::new("https://example.com/previews/track7.m4a");

        let dest = finalizer.finalize(&key, &temp).await.unwrap();

        assert_eq!(dest, library.join("track7.m4a"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"audio-bytes");
        assert!(!temp.exists(), "temp artifact should be gone");
    }

    #[tokio::test]
    async fn finalize_replaces_prior_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let library = tmp.path().join("library");
        std::fs::create_dir_all(&library).unwrap();
        std::fs::write(library.join("track7.m4a"), b"old-bytes").unwrap();

        let temp = write_temp(tmp.path(), "incoming.m4a", b"new-bytes");
        let finalizer = FsFinalizer::new(library.clone());
        let key = ResourceKey::new("https://example.com/previews/track7.m4a");

        let dest = finalizer.finalize(&key, &temp).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"new-bytes");
    }

    #[tokio::test]
    async fn finalize_missing_temp_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let finalizer = FsFinalizer::new(tmp.path().join("library"));
        let key = ResourceKey::new("https://example.com/previews/track7.m4a");

        let result = finalizer
            .finalize(&key, &tmp.path().join("does-not-exist.m4a"))
            .await;

        assert!(matches!(result, Err(DownloadError::Finalize { .. })));
    }

    #[test]
    fn artifact_path_derives_from_key() {
        let finalizer = FsFinalizer::new(PathBuf::from("/library"));
        let key = ResourceKey::new("https://example.com/a/b/c/song.mp3?sig=1");
        assert_eq!(
            finalizer.artifact_path(&key),
            PathBuf::from("/library/song.mp3")
        );
    }
}
