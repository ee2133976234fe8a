//! Typed errors for the library surface.
//!
//! Network trouble never reaches [`ResolveError`]: failed probes become
//! status codes and failed listings become empty candidate lists.

use thiserror::Error;

/// Errors from [`crate::resolver::AssetResolver::resolve_audio_url`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The track record is malformed (empty id or title).
    #[error("invalid track: {0}")]
    InvalidTrack(String),
}

/// Errors from a storage listing call.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("listing request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("listing for bucket '{bucket}' returned HTTP {status}")]
    Status { bucket: String, status: u16 },
}

/// Errors from a playback history backing store.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("history snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("history store lock poisoned")]
    Poisoned,
}
