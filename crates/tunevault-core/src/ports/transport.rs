//! Transport client port definition.
//!
//! The transport performs the actual network transfer: full fetch from a
//! locator, resumed fetch from a resumption token, and cooperative abort
//! with optional token production. Outcomes are delivered asynchronously
//! as [`TransportEvent`]s on the channel the implementation was built with;
//! none of the operations below block on network I/O.

use crate::download::{ResourceKey, TransferId, TransferToken};

/// Port for issuing and controlling byte-range-resumable fetches.
///
/// The caller mints the [`TransferId`] for each operation and records it
/// before invoking `begin_fetch`/`begin_resumed_fetch`. Every event the
/// operation produces is tagged with that id, so an event can never arrive
/// before its id is known to the caller.
///
/// # Event contract
///
/// - `Progress` may be delivered any number of times per id, with
///   `bytes_written` monotonically non-decreasing.
/// - `Completed` is delivered exactly once per successful id, and never
///   after `Failed` or `Interrupted` for the same id.
/// - `abort(id, capture_token: true)` is acknowledged by exactly one
///   `Interrupted` event carrying the captured token (or `None` when the
///   server cannot resume). `abort(id, capture_token: false)` produces no
///   event at all; the operation just stops.
pub trait TransportClientPort: Send + Sync {
    /// Issue a fresh fetch for `locator` under the caller-minted id.
    fn begin_fetch(&self, id: TransferId, key: &ResourceKey, locator: &str);

    /// Issue a resumed fetch continuing from the token's byte offset.
    ///
    /// If the server rejects or ignores the range, the implementation falls
    /// back transparently to a fresh fetch from byte zero; the caller sees
    /// ordinary progress events, not an error.
    fn begin_resumed_fetch(&self, id: TransferId, key: &ResourceKey, token: TransferToken);

    /// Abort an in-flight operation without blocking.
    ///
    /// Unknown ids are ignored. Teardown completes asynchronously; events
    /// for the aborted id may still be in flight and are the caller's to
    /// discard via the staleness rule.
    fn abort(&self, id: TransferId, capture_token: bool);
}
