//! Core domain types and port definitions for tunevault.
//!
//! This crate contains pure data types and trait definitions for the
//! download subsystem. No networking or filesystem I/O lives here; the
//! implementation crate (`tunevault-download`) provides the adapters.
//!
//! # Structure
//!
//! - `download` - domain types, events, and errors
//! - `ports` - trait seams between the manager and its collaborators

pub mod download;
pub mod ports;

// Re-export commonly used types at the crate root
pub use download::{
    DownloadError, DownloadEvent, DownloadResult, DownloadStatus, ResourceKey, TransferId,
    TransferToken, TransportEvent,
};
pub use ports::{
    DownloadManagerConfig, DownloadManagerPort, EventSinkPort, StorageFinalizerPort,
    TransportClientPort,
};
