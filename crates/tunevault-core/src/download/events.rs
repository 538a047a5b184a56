//! Download events - discriminated union for all download state changes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::errors::DownloadError;
use super::progress::format_bytes;
use super::types::{ResourceKey, TransferId, TransferToken};

/// Status of a download record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Created but no transfer issued yet.
    Idle,
    /// Transfer in flight.
    Downloading,
    /// Transfer aborted with (possible) resumption token captured.
    Paused,
    /// Completed and finalized successfully.
    Completed,
    /// Failed with an error.
    Failed,
    /// Cancelled by the caller.
    Cancelled,
}

impl DownloadStatus {
    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "downloading" => Self::Downloading,
            "paused" => Self::Paused,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            // "idle" or unknown values default to Idle
            _ => Self::Idle,
        }
    }

    /// Whether this status ends the record instance.
    ///
    /// A new `start` after a terminal status begins a fresh instance.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Single discriminated union for all events delivered to the event sink.
///
/// UIs handle this as a tagged union; the manager is the only producer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// A record changed status.
    StatusChanged {
        /// Resource key of the download.
        key: String,
        /// The new status.
        status: DownloadStatus,
    },

    /// Byte-level progress update.
    Progress {
        /// Resource key of the download.
        key: String,
        /// Progress ratio in `[0.0, 1.0]`.
        progress: f64,
        /// Bytes written so far.
        downloaded: u64,
        /// Total bytes expected.
        total: u64,
        /// Human-readable total size (e.g., "4.2 MB").
        total_size: String,
    },

    /// Download completed and its artifact was finalized.
    Completed {
        /// Resource key of the download.
        key: String,
        /// Permanent location of the artifact.
        artifact_path: PathBuf,
    },

    /// Download failed (transfer error or finalize error).
    Failed {
        /// Resource key of the download.
        key: String,
        /// Error message describing what went wrong.
        error: String,
    },
}

impl DownloadEvent {
    /// Create a status change event.
    #[must_use]
    pub fn status_changed(key: &ResourceKey, status: DownloadStatus) -> Self {
        Self::StatusChanged {
            key: key.as_str().to_string(),
            status,
        }
    }

    /// Create a progress event.
    ///
    /// The ratio is computed here so every producer applies the same
    /// divide-by-zero guard.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(key: &ResourceKey, downloaded: u64, total: u64) -> Self {
        let progress = if total > 0 {
            (downloaded as f64 / total as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self::Progress {
            key: key.as_str().to_string(),
            progress,
            downloaded,
            total,
            total_size: format_bytes(total),
        }
    }

    /// Create a completed event.
    #[must_use]
    pub fn completed(key: &ResourceKey, artifact_path: impl Into<PathBuf>) -> Self {
        Self::Completed {
            key: key.as_str().to_string(),
            artifact_path: artifact_path.into(),
        }
    }

    /// Create a failed event.
    pub fn failed(key: &ResourceKey, error: impl Into<String>) -> Self {
        Self::Failed {
            key: key.as_str().to_string(),
            error: error.into(),
        }
    }

    /// The resource key this event refers to.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::StatusChanged { key, .. }
            | Self::Progress { key, .. }
            | Self::Completed { key, .. }
            | Self::Failed { key, .. } => key,
        }
    }
}

/// Events delivered asynchronously by the transport client to the manager.
///
/// Every event is tagged with the [`TransferId`] of the operation that
/// produced it; the manager discards events whose id no longer matches the
/// record's current transfer.
#[derive(Clone, Debug)]
pub enum TransportEvent {
    /// Bytes written so far for an in-flight transfer.
    Progress {
        /// Identity of the transport operation.
        id: TransferId,
        /// Resource key the operation belongs to.
        key: ResourceKey,
        /// Bytes written so far (monotonically non-decreasing per id).
        bytes_written: u64,
        /// Total bytes expected; `0` when the server sent no length.
        bytes_expected: u64,
    },

    /// Transfer finished successfully; exactly once per id.
    Completed {
        /// Identity of the transport operation.
        id: TransferId,
        /// Resource key the operation belongs to.
        key: ResourceKey,
        /// Temporary artifact awaiting finalization.
        temp_path: PathBuf,
    },

    /// Transfer failed; never followed by `Completed` for the same id.
    Failed {
        /// Identity of the transport operation.
        id: TransferId,
        /// Resource key the operation belongs to.
        key: ResourceKey,
        /// What went wrong.
        error: DownloadError,
    },

    /// Transfer was aborted with token capture requested.
    ///
    /// `token` is `None` when the server does not support byte-range
    /// resumption; the next transfer for the key starts fresh.
    Interrupted {
        /// Identity of the transport operation.
        id: TransferId,
        /// Resource key the operation belongs to.
        key: ResourceKey,
        /// Resumption token, if one could be captured.
        token: Option<TransferToken>,
    },
}

impl TransportEvent {
    /// The transfer id this event is tagged with.
    #[must_use]
    pub const fn transfer_id(&self) -> TransferId {
        match self {
            Self::Progress { id, .. }
            | Self::Completed { id, .. }
            | Self::Failed { id, .. }
            | Self::Interrupted { id, .. } => *id,
        }
    }

    /// The resource key this event belongs to.
    #[must_use]
    pub const fn key(&self) -> &ResourceKey {
        match self {
            Self::Progress { key, .. }
            | Self::Completed { key, .. }
            | Self::Failed { key, .. }
            | Self::Interrupted { key, .. } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            DownloadStatus::Idle,
            DownloadStatus::Downloading,
            DownloadStatus::Paused,
            DownloadStatus::Completed,
            DownloadStatus::Failed,
            DownloadStatus::Cancelled,
        ] {
            assert_eq!(DownloadStatus::parse(status.as_str()), status);
        }
        assert_eq!(DownloadStatus::parse("garbage"), DownloadStatus::Idle);
    }

    #[test]
    fn terminal_statuses() {
        assert!(DownloadStatus::Completed.is_terminal());
        assert!(DownloadStatus::Failed.is_terminal());
        assert!(DownloadStatus::Cancelled.is_terminal());
        assert!(!DownloadStatus::Downloading.is_terminal());
        assert!(!DownloadStatus::Paused.is_terminal());
    }

    #[test]
    fn progress_event_computes_ratio() {
        let key = ResourceKey::new("https://example.com/t.m4a");
        match DownloadEvent::progress(&key, 500, 1000) {
            DownloadEvent::Progress {
                progress,
                downloaded,
                total,
                ..
            } => {
                assert!((progress - 0.5).abs() < f64::EPSILON);
                assert_eq!(downloaded, 500);
                assert_eq!(total, 1000);
            }
            other => panic!("expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn progress_event_guards_zero_total() {
        let key = ResourceKey::new("https://example.com/t.m4a");
        match DownloadEvent::progress(&key, 0, 0) {
            DownloadEvent::Progress { progress, .. } => {
                assert!((progress - 0.0).abs() < f64::EPSILON);
            }
            other => panic!("expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let key = ResourceKey::new("https://example.com/t.m4a");
        let json =
            serde_json::to_string(&DownloadEvent::status_changed(&key, DownloadStatus::Paused))
                .unwrap();
        assert!(json.contains("\"type\":\"status_changed\""));
        assert!(json.contains("\"status\":\"paused\""));
    }

    #[test]
    fn transport_event_accessors() {
        let key = ResourceKey::new("https://example.com/t.m4a");
        let event = TransportEvent::Progress {
            id: TransferId::new(3),
            key: key.clone(),
            bytes_written: 10,
            bytes_expected: 100,
        };
        assert_eq!(event.transfer_id(), TransferId::new(3));
        assert_eq!(event.key(), &key);
    }
}
