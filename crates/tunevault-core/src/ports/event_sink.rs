//! Event sink port.
//!
//! This port abstracts notification delivery, allowing the download manager
//! to report progress and final state without coupling to any rendering
//! framework. A UI registers a sink; the manager is the only producer.

use tokio::sync::mpsc;

use crate::download::DownloadEvent;

/// Port for receiving download notifications.
///
/// Implementations handle the actual delivery (channels, UI event loops).
/// `emit` must not block; the manager calls it while holding its registry
/// lock so that notification order matches mutation order.
pub trait EventSinkPort: Send + Sync {
    /// Deliver a download event.
    fn emit(&self, event: DownloadEvent);
}

/// A no-op event sink for tests and headless contexts.
#[derive(Debug, Clone, Default)]
pub struct NoopEventSink;

impl NoopEventSink {
    /// Create a new no-op sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EventSinkPort for NoopEventSink {
    fn emit(&self, _event: DownloadEvent) {
        // Intentionally do nothing
    }
}

/// Sink that forwards events onto a tokio channel.
///
/// The receiving half is what a UI task consumes to drive its rendering.
#[derive(Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<DownloadEvent>,
}

impl ChannelEventSink {
    /// Create a sink together with the receiver a UI consumes.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DownloadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSinkPort for ChannelEventSink {
    fn emit(&self, event: DownloadEvent) {
        // A dropped receiver means the UI went away; events are then moot
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{DownloadStatus, ResourceKey};

    #[test]
    fn noop_sink_discards() {
        let sink = NoopEventSink::new();
        let key = ResourceKey::new("https://example.com/t.m4a");
        sink.emit(DownloadEvent::status_changed(&key, DownloadStatus::Idle));
    }

    #[tokio::test]
    async fn channel_sink_forwards() {
        let (sink, mut rx) = ChannelEventSink::channel();
        let key = ResourceKey::new("https://example.com/t.m4a");

        sink.emit(DownloadEvent::status_changed(
            &key,
            DownloadStatus::Downloading,
        ));

        match rx.recv().await {
            Some(DownloadEvent::StatusChanged { key: k, status }) => {
                assert_eq!(k, key.as_str());
                assert_eq!(status, DownloadStatus::Downloading);
            }
            other => panic!("expected StatusChanged, got {other:?}"),
        }
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelEventSink::channel();
        drop(rx);
        let key = ResourceKey::new("https://example.com/t.m4a");
        // Must not panic
        sink.emit(DownloadEvent::failed(&key, "gone"));
    }
}
