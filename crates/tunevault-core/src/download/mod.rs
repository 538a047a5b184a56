//! Download domain types, events, and errors.
//!
//! This module contains pure data types for the download system. No I/O,
//! networking, or runtime dependencies allowed.
//!
//! # Structure
//!
//! - `types` - Core identifiers and data structures (`ResourceKey`, `TransferId`, `TransferToken`)
//! - `events` - Download events and status types (`DownloadEvent`, `DownloadStatus`, `TransportEvent`)
//! - `errors` - Error types for download operations
//! - `progress` - Byte-count formatting helpers

pub mod errors;
pub mod events;
pub mod progress;
pub mod types;

// Re-export commonly used types
pub use errors::{DownloadError, DownloadResult};
pub use events::{DownloadEvent, DownloadStatus, TransportEvent};
pub use progress::format_bytes;
pub use types::{ResourceKey, TransferId, TransferToken};
