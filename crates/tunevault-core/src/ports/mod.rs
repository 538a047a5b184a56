//! Port definitions - trait seams between the manager and its collaborators.
//!
//! Ports keep the download manager free of transport, storage, and UI
//! concerns. Implementations live in `tunevault-download` (or in a host
//! application for the event sink).

pub mod download_manager;
pub mod event_sink;
pub mod finalizer;
pub mod transport;

pub use download_manager::{DownloadManagerConfig, DownloadManagerPort};
pub use event_sink::{ChannelEventSink, EventSinkPort, NoopEventSink};
pub use finalizer::StorageFinalizerPort;
pub use transport::TransportClientPort;
