//! HTTP transport client.
//!
//! Performs the actual network transfers: streaming GET into a partial
//! artifact in the staging directory, byte-range resumption from a
//! transfer token, and cooperative abort with optional token capture.
//! Events are delivered on the channel the transport was built with; no
//! operation here blocks its caller on network I/O.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tunevault_core::download::{
    DownloadError, ResourceKey, TransferId, TransferToken, TransportEvent,
};
use tunevault_core::ports::TransportClientPort;

/// Control state for one in-flight transfer.
struct ActiveTransfer {
    cancel: CancellationToken,
    capture_token: Arc<AtomicBool>,
}

/// Mutable state a transfer accumulates while streaming.
///
/// Read back after cancellation to decide whether a resumption token can
/// be produced.
struct TransferState {
    part_path: PathBuf,
    locator: String,
    bytes_expected: u64,
    resumable: bool,
    validator: Option<String>,
}

/// reqwest-based implementation of [`TransportClientPort`].
pub struct HttpTransport {
    client: reqwest::Client,
    staging_dir: PathBuf,
    events: mpsc::UnboundedSender<TransportEvent>,
    active: Arc<Mutex<HashMap<TransferId, ActiveTransfer>>>,
}

impl HttpTransport {
    /// Create a transport writing partial artifacts under `staging_dir`
    /// and delivering events on `events`.
    #[must_use]
    pub fn new(staging_dir: PathBuf, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            client: reqwest::Client::new(),
            staging_dir,
            events,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Partial-artifact path for a key: the sanitized key plus `.part`.
    ///
    /// Stable across attempts so a resumed fetch appends to the same file.
    fn part_path_for(&self, key: &ResourceKey) -> PathBuf {
        let sanitized: String = key
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            })
            .collect();
        self.staging_dir.join(format!("{sanitized}.part"))
    }

    fn spawn_transfer(
        &self,
        id: TransferId,
        key: &ResourceKey,
        locator: String,
        resume: Option<TransferToken>,
    ) {
        let cancel = CancellationToken::new();
        let capture_token = Arc::new(AtomicBool::new(false));

        {
            let mut active = self.active.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            active.insert(
                id,
                ActiveTransfer {
                    cancel: cancel.clone(),
                    capture_token: Arc::clone(&capture_token),
                },
            );
        }

        let part_path = resume
            .as_ref()
            .map_or_else(|| self.part_path_for(key), |t| t.part_path().to_path_buf());

        let task = TransferTask {
            client: self.client.clone(),
            events: self.events.clone(),
            id,
            key: key.clone(),
            cancel,
            capture_token,
            active: Arc::clone(&self.active),
        };
        let state = TransferState {
            part_path,
            locator,
            bytes_expected: resume.as_ref().and_then(TransferToken::bytes_expected).unwrap_or(0),
            resumable: false,
            validator: resume.as_ref().and_then(|t| t.validator().map(str::to_string)),
        };

        tokio::spawn(async move {
            task.run(state, resume).await;
        });
    }
}

impl TransportClientPort for HttpTransport {
    fn begin_fetch(&self, id: TransferId, key: &ResourceKey, locator: &str) {
        self.spawn_transfer(id, key, locator.to_string(), None);
    }

    fn begin_resumed_fetch(&self, id: TransferId, key: &ResourceKey, token: TransferToken) {
        let locator = token.locator().to_string();
        self.spawn_transfer(id, key, locator, Some(token));
    }

    fn abort(&self, id: TransferId, capture_token: bool) {
        let active = self.active.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(transfer) = active.get(&id) {
            transfer.capture_token.store(capture_token, Ordering::SeqCst);
            transfer.cancel.cancel();
        } else {
            tracing::debug!(transfer = %id, "Abort for unknown transfer ignored");
        }
    }
}

/// Everything one spawned transfer needs, detached from the transport.
struct TransferTask {
    client: reqwest::Client,
    events: mpsc::UnboundedSender<TransportEvent>,
    id: TransferId,
    key: ResourceKey,
    cancel: CancellationToken,
    capture_token: Arc<AtomicBool>,
    active: Arc<Mutex<HashMap<TransferId, ActiveTransfer>>>,
}

impl TransferTask {
    async fn run(self, mut state: TransferState, resume: Option<TransferToken>) {
        let result = {
            let stream = Self::stream_into(
                &self.client,
                &self.events,
                self.id,
                &self.key,
                &mut state,
                resume,
            );
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => Err(DownloadError::Cancelled),

                result = stream => result,
            }
        };

        {
            let mut active = self
                .active
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            active.remove(&self.id);
        }

        match result {
            Ok(()) => {
                tracing::debug!(key = %self.key, transfer = %self.id, "Transfer complete");
                let _ = self.events.send(TransportEvent::Completed {
                    id: self.id,
                    key: self.key.clone(),
                    temp_path: state.part_path.clone(),
                });
            }
            Err(DownloadError::Cancelled) => {
                self.acknowledge_abort(&state).await;
            }
            Err(error) => {
                tracing::debug!(key = %self.key, transfer = %self.id, error = %error, "Transfer failed");
                remove_best_effort(&state.part_path).await;
                let _ = self.events.send(TransportEvent::Failed {
                    id: self.id,
                    key: self.key.clone(),
                    error,
                });
            }
        }
    }

    /// Handle a cancelled transfer: produce a token when requested and
    /// possible, otherwise discard the partial artifact. A plain cancel
    /// (no capture) produces no event at all.
    async fn acknowledge_abort(&self, state: &TransferState) {
        if !self.capture_token.load(Ordering::SeqCst) {
            remove_best_effort(&state.part_path).await;
            return;
        }

        // The file on disk is the source of truth for the resume offset
        let bytes_on_disk = tokio::fs::metadata(&state.part_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        let token = if state.resumable && bytes_on_disk > 0 {
            Some(TransferToken::new(
                state.locator.clone(),
                state.part_path.clone(),
                bytes_on_disk,
                (state.bytes_expected > 0).then_some(state.bytes_expected),
                state.validator.clone(),
            ))
        } else {
            remove_best_effort(&state.part_path).await;
            None
        };

        tracing::debug!(
            key = %self.key,
            transfer = %self.id,
            resumable = token.is_some(),
            "Abort acknowledged"
        );
        let _ = self.events.send(TransportEvent::Interrupted {
            id: self.id,
            key: self.key.clone(),
            token,
        });
    }

    /// Stream the response body into the partial artifact, emitting a
    /// progress event per chunk.
    async fn stream_into(
        client: &reqwest::Client,
        events: &mpsc::UnboundedSender<TransportEvent>,
        id: TransferId,
        key: &ResourceKey,
        state: &mut TransferState,
        resume: Option<TransferToken>,
    ) -> Result<(), DownloadError> {
        if let Some(parent) = state.part_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::from_io_error(&e))?;
        }

        // A resume offset only counts if the partial artifact still holds
        // exactly the bytes the token recorded
        let mut offset = 0u64;
        if let Some(token) = &resume {
            let on_disk = tokio::fs::metadata(&state.part_path)
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            if on_disk == token.bytes_written() && on_disk > 0 {
                offset = on_disk;
            }
        }

        let mut request = client.get(&state.locator);
        if offset > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={offset}-"));
            if let Some(validator) = &state.validator {
                request = request.header(reqwest::header::IF_RANGE, validator.clone());
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::network_with_status(
                format!("unexpected response for {}", state.locator),
                status.as_u16(),
            ));
        }

        // A 200 on a ranged request means the server ignored the range:
        // fall back to a fresh transfer from byte zero
        let appending = offset > 0 && status == reqwest::StatusCode::PARTIAL_CONTENT;
        if offset > 0 && !appending {
            tracing::debug!(key = %key, "Server ignored range; restarting from zero");
            offset = 0;
        }

        state.resumable = status == reqwest::StatusCode::PARTIAL_CONTENT
            || response
                .headers()
                .get(reqwest::header::ACCEPT_RANGES)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));
        state.validator = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        state.bytes_expected = total_size(&response, offset);

        let mut file = if appending {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(&state.part_path)
                .await
        } else {
            tokio::fs::File::create(&state.part_path).await
        }
        .map_err(|e| DownloadError::from_io_error(&e))?;

        let mut bytes_written = offset;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::network(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::from_io_error(&e))?;
            // Keep the on-disk file authoritative for token capture
            file.flush()
                .await
                .map_err(|e| DownloadError::from_io_error(&e))?;

            bytes_written += chunk.len() as u64;
            let _ = events.send(TransportEvent::Progress {
                id,
                key: key.clone(),
                bytes_written,
                bytes_expected: state.bytes_expected,
            });
        }

        file.sync_all()
            .await
            .map_err(|e| DownloadError::from_io_error(&e))?;
        Ok(())
    }
}

/// Total transfer size implied by the response.
///
/// For `206 Partial Content` the `Content-Range` total is authoritative;
/// otherwise the resume offset plus the body length.
fn total_size(response: &reqwest::Response, offset: u64) -> u64 {
    if response.status() == reqwest::StatusCode::PARTIAL_CONTENT {
        if let Some(total) = response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|v| v.parse::<u64>().ok())
        {
            return total;
        }
    }
    offset + response.content_length().unwrap_or(0)
}

async fn remove_best_effort(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "Could not remove partial artifact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> (HttpTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (HttpTransport::new(PathBuf::from("/tmp/staging"), tx), rx)
    }

    #[tokio::test]
    async fn abort_acknowledges_under_the_callers_id() {
        let (transport, mut rx) = transport();
        let key = ResourceKey::new("https://invalid.invalid/a.m4a");
        let id = TransferId::new(41);

        transport.begin_fetch(id, &key, key.as_str());
        transport.abort(id, true);

        match tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv()).await {
            Ok(Some(TransportEvent::Interrupted { id: got, token, .. })) => {
                assert_eq!(got, id);
                // No bytes were written, so nothing to resume from
                assert!(token.is_none());
            }
            other => panic!("expected Interrupted, got {other:?}"),
        }
    }

    #[test]
    fn part_path_is_stable_and_sanitized() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = HttpTransport::new(PathBuf::from("/staging"), tx);
        let key = ResourceKey::new("https://example.com/previews/t1.m4a");

        let path = transport.part_path_for(&key);
        assert_eq!(path, transport.part_path_for(&key));
        assert_eq!(
            path,
            PathBuf::from("/staging/https___example.com_previews_t1.m4a.part")
        );
    }

    #[test]
    fn part_paths_differ_for_colliding_filenames() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = HttpTransport::new(PathBuf::from("/staging"), tx);
        let a = transport.part_path_for(&ResourceKey::new("https://a.example.com/t.m4a"));
        let b = transport.part_path_for(&ResourceKey::new("https://b.example.com/t.m4a"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn abort_unknown_id_is_ignored() {
        let (transport, mut rx) = transport();
        transport.abort(TransferId::new(999), true);
        assert!(rx.try_recv().is_err());
    }
}
