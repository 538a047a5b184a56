//! Download manager implementation.
//!
//! This module provides the concrete implementation of
//! `DownloadManagerPort`: a registry of per-key download records, the
//! pause/resume protocol around resumption tokens, and the
//! finalize-on-completion handoff to durable storage.
//!
//! # Concurrency Model
//!
//! - Registry behind a single async `Mutex`; held only for record
//!   mutation, never across I/O
//! - Single long-lived runner consumes transport events from a channel
//!   (`runner_started` is never reset)
//! - The manager mints every `TransferId` and installs it on the record
//!   in the same critical section that plans the fetch, before the
//!   transport is invoked, so an event for an operation can never arrive
//!   ahead of the record that owns it. Event handlers verify the id
//!   against the record's live transfer and discard stale events
//! - Sink emissions happen while the registry lock is held, so the order
//!   the sink observes matches the order records were mutated
//! - After `pause`, the superseded transfer id stays installed until the
//!   `Interrupted` event delivers the token, so a concurrent `resume`
//!   defers instead of racing ahead of token capture

mod record;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use tunevault_core::download::{
    DownloadError, DownloadEvent, DownloadStatus, ResourceKey, TransferId, TransferToken,
    TransportEvent, format_bytes,
};
use tunevault_core::ports::{
    DownloadManagerConfig, DownloadManagerPort, EventSinkPort, StorageFinalizerPort,
    TransportClientPort,
};

pub use record::DownloadRecord;

/// What a control operation decided to do once the registry lock dropped.
enum FetchPlan {
    Fresh(String),
    Resumed(TransferToken),
}

/// Dependencies for creating a download manager.
///
/// Bundles the ports and configuration needed to construct a
/// `DownloadManagerImpl`. The receiver must be the counterpart of the
/// sender the transport client was built with.
pub struct DownloadManagerDeps<T, F, E>
where
    T: TransportClientPort + 'static,
    F: StorageFinalizerPort + 'static,
    E: EventSinkPort + 'static,
{
    /// Port issuing byte-range-resumable fetches.
    pub transport: Arc<T>,
    /// Port materializing completed artifacts into the store.
    pub finalizer: Arc<F>,
    /// Port receiving progress/completion notifications (the UI).
    pub event_sink: Arc<E>,
    /// Channel on which the transport delivers its events.
    pub transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    /// Configuration for the download manager.
    pub config: DownloadManagerConfig,
}

/// Build a download manager from its dependencies and start its runner.
///
/// Returns an implementation of `DownloadManagerPort` that can be stored
/// as `Arc<dyn DownloadManagerPort>` in adapters.
pub fn build_download_manager<T, F, E>(deps: DownloadManagerDeps<T, F, E>) -> Arc<DownloadManagerImpl>
where
    T: TransportClientPort + 'static,
    F: StorageFinalizerPort + 'static,
    E: EventSinkPort + 'static,
{
    let manager = Arc::new(DownloadManagerImpl::new(
        deps.transport,
        deps.finalizer,
        deps.event_sink,
        deps.transport_events,
        deps.config,
    ));
    manager.ensure_runner();
    manager
}

/// Concrete implementation of the download manager.
pub struct DownloadManagerImpl {
    /// Transport client for issuing and aborting fetches.
    transport: Arc<dyn TransportClientPort>,
    /// Finalizer moving completed artifacts into the library.
    finalizer: Arc<dyn StorageFinalizerPort>,
    /// Sink receiving progress/status notifications.
    event_sink: Arc<dyn EventSinkPort>,
    /// Active-or-pausable records keyed by resource.
    registry: Mutex<HashMap<ResourceKey, DownloadRecord>>,
    /// Transport event receiver, taken by the runner on first start.
    transport_events: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    /// Whether the runner has been started (never reset).
    runner_started: AtomicBool,
    /// Source of transfer ids; minted under the registry lock.
    next_transfer_id: AtomicU64,
    /// Configuration.
    config: DownloadManagerConfig,
}

impl DownloadManagerImpl {
    fn new<T, F, E>(
        transport: Arc<T>,
        finalizer: Arc<F>,
        event_sink: Arc<E>,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        config: DownloadManagerConfig,
    ) -> Self
    where
        T: TransportClientPort + 'static,
        F: StorageFinalizerPort + 'static,
        E: EventSinkPort + 'static,
    {
        Self {
            transport,
            finalizer,
            event_sink,
            registry: Mutex::new(HashMap::new()),
            transport_events: Mutex::new(Some(transport_events)),
            runner_started: AtomicBool::new(false),
            next_transfer_id: AtomicU64::new(1),
            config,
        }
    }

    /// Ensure the runner is started.
    ///
    /// Idempotent: the runner runs for the lifetime of the manager and
    /// exits only when the transport drops its event sender.
    pub fn ensure_runner(self: &Arc<Self>) {
        if self
            .runner_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                manager.run_loop().await;
            });
        }
    }

    /// The main runner loop: applies transport events in arrival order.
    async fn run_loop(&self) {
        let receiver = self.transport_events.lock().await.take();
        let Some(mut rx) = receiver else {
            tracing::warn!("Runner started twice; transport events already claimed");
            return;
        };

        while let Some(event) = rx.recv().await {
            self.apply_transport_event(event).await;
        }

        tracing::debug!("Transport event channel closed; runner exiting");
    }

    async fn apply_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Progress {
                id,
                key,
                bytes_written,
                bytes_expected,
            } => {
                self.on_progress(id, &key, bytes_written, bytes_expected)
                    .await;
            }
            TransportEvent::Completed { id, key, temp_path } => {
                self.on_completed(id, &key, &temp_path).await;
            }
            TransportEvent::Failed { id, key, error } => {
                self.on_failed(id, &key, &error).await;
            }
            TransportEvent::Interrupted { id, key, token } => {
                self.on_interrupted(id, &key, token).await;
            }
        }
    }

    fn mint_transfer_id(&self) -> TransferId {
        TransferId::new(self.next_transfer_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Install a fresh transfer id on the record and plan its fetch.
    ///
    /// Must be called with the registry lock held: installing the id before
    /// the transport runs is what lets the staleness check accept the
    /// operation's earliest events. Emits the Downloading transition here so
    /// the sink sees it in mutation order.
    fn begin_attempt(
        &self,
        key: &ResourceKey,
        record: &mut DownloadRecord,
    ) -> (TransferId, FetchPlan) {
        let id = self.mint_transfer_id();
        record.transfer = Some(id);
        record.status = DownloadStatus::Downloading;

        let plan = if let Some(token) = record.resume_token.take() {
            FetchPlan::Resumed(token)
        } else {
            // Fresh transfer: the old percentage belongs to bytes we no
            // longer have
            record.progress = 0.0;
            FetchPlan::Fresh(record.locator.clone())
        };

        self.event_sink
            .emit(DownloadEvent::status_changed(key, DownloadStatus::Downloading));
        (id, plan)
    }

    /// Hand the planned fetch to the transport.
    ///
    /// The id is already installed on the record, so events from the new
    /// operation are owned from its first moment. If the record was removed
    /// or superseded between install and issue (a racing `cancel` or
    /// `start`), the freshly issued operation is aborted so no orphan
    /// transfer survives.
    async fn issue_fetch(&self, key: &ResourceKey, id: TransferId, plan: FetchPlan) {
        match plan {
            FetchPlan::Fresh(locator) => self.transport.begin_fetch(id, key, &locator),
            FetchPlan::Resumed(token) => self.transport.begin_resumed_fetch(id, key, token),
        }

        let superseded = {
            let registry = self.registry.lock().await;
            !registry.get(key).is_some_and(|record| record.owns_transfer(id))
        };
        if superseded {
            tracing::debug!(key = %key, transfer = %id, "Transfer superseded before issue; aborting");
            self.transport.abort(id, false);
        }
    }

    /// Apply a progress event to the matching record and forward it,
    /// rate-limited, to the sink.
    async fn on_progress(
        &self,
        id: TransferId,
        key: &ResourceKey,
        bytes_written: u64,
        bytes_expected: u64,
    ) {
        let mut registry = self.registry.lock().await;
        let Some(record) = registry.get_mut(key) else {
            tracing::debug!(key = %key, transfer = %id, "Discarding progress for unknown key");
            return;
        };
        if !record.owns_transfer(id) {
            tracing::debug!(key = %key, transfer = %id, "Discarding stale progress");
            return;
        }
        if bytes_expected == 0 {
            // No expected size: leave progress untouched, nothing to divide by
            return;
        }

        #[allow(clippy::cast_precision_loss)]
        let ratio = (bytes_written as f64 / bytes_expected as f64).clamp(0.0, 1.0);
        if ratio > record.progress {
            record.progress = ratio;
        }

        if record.throttle.allow() {
            self.event_sink.emit(DownloadEvent::Progress {
                key: key.as_str().to_string(),
                progress: record.progress,
                downloaded: bytes_written,
                total: bytes_expected,
                total_size: format_bytes(bytes_expected),
            });
        }
    }

    /// Remove the completed record and hand the artifact to the finalizer.
    ///
    /// A finalize failure is reported through the sink but does not
    /// resurrect the record; the item is simply not marked downloaded.
    async fn on_completed(&self, id: TransferId, key: &ResourceKey, temp_path: &std::path::Path) {
        {
            let mut registry = self.registry.lock().await;
            let owns = registry.get(key).is_some_and(|r| r.owns_transfer(id));
            if !owns {
                tracing::debug!(key = %key, transfer = %id, "Discarding stale completion");
                return;
            }
            registry.remove(key);
        }

        let outcome = self.finalizer.finalize(key, temp_path).await;

        // Re-acquire the lock for the notifications so they serialize with
        // every other sink emission
        let _registry = self.registry.lock().await;
        match outcome {
            Ok(artifact_path) => {
                tracing::info!(key = %key, path = %artifact_path.display(), "Download completed");
                self.event_sink
                    .emit(DownloadEvent::status_changed(key, DownloadStatus::Completed));
                self.event_sink
                    .emit(DownloadEvent::completed(key, artifact_path));
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Finalize failed");
                self.event_sink
                    .emit(DownloadEvent::status_changed(key, DownloadStatus::Failed));
                self.event_sink
                    .emit(DownloadEvent::failed(key, e.user_message()));
            }
        }
    }

    /// Remove the failed record and forward the error.
    ///
    /// No resumable handle remains after a failure, so the record is
    /// removed; the caller retries with `start`.
    async fn on_failed(&self, id: TransferId, key: &ResourceKey, error: &DownloadError) {
        let mut registry = self.registry.lock().await;
        let owns = registry.get(key).is_some_and(|r| r.owns_transfer(id));
        if !owns {
            tracing::debug!(key = %key, transfer = %id, "Discarding stale failure");
            return;
        }
        registry.remove(key);

        tracing::warn!(key = %key, error = %error, "Download failed");
        self.event_sink
            .emit(DownloadEvent::status_changed(key, DownloadStatus::Failed));
        self.event_sink
            .emit(DownloadEvent::failed(key, error.user_message()));
    }

    /// Store the captured token on the paused record, or perform the
    /// deferred resume if one was requested while capture was in flight.
    async fn on_interrupted(&self, id: TransferId, key: &ResourceKey, token: Option<TransferToken>) {
        let planned = {
            let mut registry = self.registry.lock().await;
            let Some(record) = registry.get_mut(key) else {
                tracing::debug!(key = %key, transfer = %id, "Discarding interrupt for unknown key");
                return;
            };
            if !record.owns_transfer(id) {
                tracing::debug!(key = %key, transfer = %id, "Discarding stale interrupt");
                return;
            }

            record.transfer = None;
            record.resume_token = token;
            tracing::debug!(
                key = %key,
                resumable = record.resume_token.is_some(),
                "Pause acknowledged"
            );

            if !record.resume_requested {
                return;
            }
            record.resume_requested = false;
            self.begin_attempt(key, record)
        };

        self.issue_fetch(key, planned.0, planned.1).await;
    }
}

#[async_trait]
impl DownloadManagerPort for DownloadManagerImpl {
    async fn start(&self, key: ResourceKey, locator: String) {
        let (id, plan, superseded) = {
            let mut registry = self.registry.lock().await;
            let mut record = DownloadRecord::new(locator, self.config.progress_interval);
            let (id, plan) = self.begin_attempt(&key, &mut record);
            let old = registry.insert(key.clone(), record);
            (id, plan, old.and_then(|r| r.transfer))
        };

        if let Some(old_id) = superseded {
            tracing::debug!(key = %key, transfer = %old_id, "Restart: aborting superseded transfer");
            self.transport.abort(old_id, false);
        }

        tracing::info!(key = %key, "Download started");
        self.issue_fetch(&key, id, plan).await;
    }

    async fn pause(&self, key: &ResourceKey) {
        let to_abort = {
            let mut registry = self.registry.lock().await;
            match registry.get_mut(key) {
                Some(record) if record.status == DownloadStatus::Downloading => {
                    record.status = DownloadStatus::Paused;
                    record.throttle.force_next();
                    // Transfer id stays installed until the Interrupted
                    // event delivers the token; see on_interrupted.
                    self.event_sink
                        .emit(DownloadEvent::status_changed(key, DownloadStatus::Paused));
                    record.transfer
                }
                _ => return,
            }
        };

        if let Some(id) = to_abort {
            self.transport.abort(id, true);
        }

        tracing::info!(key = %key, "Download paused");
    }

    async fn resume(&self, key: &ResourceKey) {
        let planned = {
            let mut registry = self.registry.lock().await;
            let Some(record) = registry.get_mut(key) else {
                return;
            };
            if record.status != DownloadStatus::Paused {
                return;
            }

            if record.transfer.is_some() {
                // Token capture still in flight; defer to on_interrupted
                record.resume_requested = true;
                tracing::debug!(key = %key, "Resume deferred until token capture completes");
                return;
            }

            self.begin_attempt(key, record)
        };

        tracing::info!(key = %key, "Download resumed");
        self.issue_fetch(key, planned.0, planned.1).await;
    }

    async fn cancel(&self, key: &ResourceKey) {
        let to_abort = {
            let mut registry = self.registry.lock().await;
            let Some(record) = registry.remove(key) else {
                return;
            };
            self.event_sink
                .emit(DownloadEvent::status_changed(key, DownloadStatus::Cancelled));
            record.transfer
        };

        if let Some(id) = to_abort {
            self.transport.abort(id, false);
        }

        tracing::info!(key = %key, "Download cancelled");
    }

    async fn snapshot(&self, key: &ResourceKey) -> Option<(DownloadStatus, f64)> {
        let registry = self.registry.lock().await;
        registry
            .get(key)
            .map(|record| (record.status, record.progress))
    }

    async fn active_count(&self) -> usize {
        self.registry.lock().await.len()
    }
}
