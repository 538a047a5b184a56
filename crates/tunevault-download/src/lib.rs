//! Download manager implementation for tunevault.
//!
//! Wires the pieces defined by `tunevault-core` into a working subsystem:
//!
//! - `manager` - registry, state machine, and event routing
//! - `transport` - reqwest-based byte-range-resumable HTTP transfers
//! - `finalize` - atomic artifact materialization into the library
//! - `progress` - rate-limiting for UI progress notifications

// Re-export core types for convenience
pub use tunevault_core::download::{
    DownloadError, DownloadEvent, DownloadResult, DownloadStatus, ResourceKey, TransferId,
    TransferToken, TransportEvent,
};
pub use tunevault_core::ports::{
    ChannelEventSink, DownloadManagerConfig, DownloadManagerPort, EventSinkPort, NoopEventSink,
    StorageFinalizerPort, TransportClientPort,
};

mod finalize;
mod manager;
mod transport;

pub(crate) mod progress;

pub use finalize::FsFinalizer;
pub use manager::{DownloadManagerDeps, DownloadManagerImpl, build_download_manager};
pub use progress::ProgressThrottle;
pub use transport::HttpTransport;
