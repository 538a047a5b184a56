//! Per-item download state.

use std::time::Duration;

use tunevault_core::download::{DownloadStatus, TransferId, TransferToken};

use crate::progress::ProgressThrottle;

/// Mutable state for one tracked download.
///
/// Lives in the manager's registry for the duration of a download attempt:
/// created on `start`, cycled through Downloading/Paused, removed on
/// cancel, failure, or successful finalize.
#[derive(Debug)]
pub struct DownloadRecord {
    /// Source locator fetched for this record. Immutable once created.
    pub locator: String,
    /// Current status.
    pub status: DownloadStatus,
    /// Progress ratio in `[0.0, 1.0]`; non-decreasing while Downloading,
    /// reset only on a fresh start.
    pub progress: f64,
    /// Resumption token, present only while Paused against a server that
    /// supports byte ranges.
    pub resume_token: Option<TransferToken>,
    /// Identity of the live transport operation. At most one per key;
    /// cleared when the operation ends.
    pub transfer: Option<TransferId>,
    /// A `resume` arrived while the pause's token capture was still in
    /// flight; the `Interrupted` handler performs the deferred resume.
    pub resume_requested: bool,
    /// Rate-limiter for progress notifications toward the event sink.
    pub throttle: ProgressThrottle,
}

impl DownloadRecord {
    /// Create a fresh record for a new download attempt.
    pub fn new(locator: impl Into<String>, progress_interval: Duration) -> Self {
        Self {
            locator: locator.into(),
            status: DownloadStatus::Idle,
            progress: 0.0,
            resume_token: None,
            transfer: None,
            resume_requested: false,
            throttle: ProgressThrottle::new(progress_interval),
        }
    }

    /// Whether the given transfer id is this record's live operation.
    #[must_use]
    pub fn owns_transfer(&self, id: TransferId) -> bool {
        self.transfer == Some(id)
    }
}
