//! Core domain types for downloads.
//!
//! Pure data types with no I/O dependencies.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::errors::DownloadError;

/// Stable unique identifier for a downloadable item.
///
/// The key is the item's source URL. Two records with the same key refer to
/// the same logical download; the manager never tracks both at once.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Create a new resource key from a source URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the deterministic artifact file name for this key.
    ///
    /// Uses the last path segment of the URL, with any query string or
    /// fragment stripped, so that "is this key downloaded" stays a plain
    /// filesystem existence check for the caller that owns the item list.
    #[must_use]
    pub fn artifact_name(&self) -> String {
        let path = self
            .0
            .split(['?', '#'])
            .next()
            .unwrap_or(&self.0)
            .trim_end_matches('/');

        let segment = path.rsplit('/').next().unwrap_or(path);
        if segment.is_empty() || segment.contains(':') {
            // Bare scheme/host URLs have no usable segment
            "download".to_string()
        } else {
            segment.to_string()
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identity of a single transport operation.
///
/// Every fetch carries a fresh id, minted monotonically by the manager and
/// installed on the record before the transport runs. Event handlers compare
/// an event's id against the record's current transfer before mutating
/// state; stale events are discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(u64);

impl TransferId {
    /// Create a transfer id from a raw counter value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw counter value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque resumption payload for an interrupted transfer.
///
/// Produced when a paused transfer is aborted against a server that
/// advertises byte-range support. Callers treat it as opaque; the
/// transport reconstructs the byte offset and validator from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferToken {
    locator: String,
    part_path: PathBuf,
    bytes_written: u64,
    bytes_expected: Option<u64>,
    validator: Option<String>,
}

impl TransferToken {
    /// Create a new transfer token.
    pub fn new(
        locator: impl Into<String>,
        part_path: impl Into<PathBuf>,
        bytes_written: u64,
        bytes_expected: Option<u64>,
        validator: Option<String>,
    ) -> Self {
        Self {
            locator: locator.into(),
            part_path: part_path.into(),
            bytes_written,
            bytes_expected,
            validator,
        }
    }

    /// The source locator the interrupted transfer was fetching.
    #[must_use]
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Path of the partial artifact holding the bytes written so far.
    #[must_use]
    pub fn part_path(&self) -> &Path {
        &self.part_path
    }

    /// Bytes already written to the partial artifact.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Total expected bytes, if the server reported a length.
    #[must_use]
    pub const fn bytes_expected(&self) -> Option<u64> {
        self.bytes_expected
    }

    /// HTTP validator (ETag) for `If-Range`, if the server sent one.
    #[must_use]
    pub fn validator(&self) -> Option<&str> {
        self.validator.as_deref()
    }

    /// Encode into an opaque string for callers that persist tokens.
    #[must_use]
    pub fn into_opaque(&self) -> String {
        // Serialization of a plain data struct cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        BASE64.encode(json)
    }

    /// Decode a token previously produced by [`into_opaque`](Self::into_opaque).
    pub fn from_opaque(opaque: &str) -> Result<Self, DownloadError> {
        let bytes = BASE64
            .decode(opaque)
            .map_err(|e| DownloadError::other(format!("malformed transfer token: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| DownloadError::other(format!("malformed transfer token: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_name_uses_last_path_segment() {
        let key = ResourceKey::new("https://example.com/previews/track42.m4a");
        assert_eq!(key.artifact_name(), "track42.m4a");
    }

    #[test]
    fn artifact_name_strips_query_and_fragment() {
        let key = ResourceKey::new("https://example.com/a/b.mp3?sig=abc#t=30");
        assert_eq!(key.artifact_name(), "b.mp3");
    }

    #[test]
    fn artifact_name_falls_back_for_bare_host() {
        let key = ResourceKey::new("https://example.com/");
        assert_eq!(key.artifact_name(), "download");
    }

    #[test]
    fn transfer_id_display_and_value() {
        let id = TransferId::new(7);
        assert_eq!(id.value(), 7);
        assert_eq!(id.to_string(), "#7");
    }

    #[test]
    fn token_opaque_round_trip() {
        let token = TransferToken::new(
            "https://example.com/t.m4a",
            "/tmp/t.m4a.part",
            4096,
            Some(10_000),
            Some("\"etag-1\"".to_string()),
        );

        let opaque = token.into_opaque();
        let parsed = TransferToken::from_opaque(&opaque).unwrap();
        assert_eq!(parsed, token);
    }

    #[test]
    fn token_from_garbage_is_an_error() {
        assert!(TransferToken::from_opaque("not base64 at all!!").is_err());
        // Valid base64, invalid payload
        let opaque = BASE64.encode(b"{\"nope\":1}");
        assert!(TransferToken::from_opaque(&opaque).is_err());
    }
}
