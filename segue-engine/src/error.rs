//! Error types for the Segue engine
//!
//! Module-specific error types using thiserror. Every failure mode the
//! engine recovers from has its own variant so callers can match on it;
//! nothing here is allowed to escape the engine boundary as a panic.

use thiserror::Error;

/// Main error type for the Segue engine
#[derive(Error, Debug)]
pub enum Error {
    /// Stream URL is malformed, expired, or carries encoding artifacts
    #[error("Invalid stream URL: {0}")]
    InvalidStreamUrl(String),

    /// Output device reports the operation was superseded by a newer one.
    /// Always benign; swallowed at the engine boundary, never surfaced.
    #[error("Device operation aborted: {0}")]
    DeviceAbort(String),

    /// Processing graph was already built for this output handle
    #[error("Processing graph already built for this output handle")]
    GraphConflict,

    /// No playable URL found after all fallback attempts
    #[error("Stream resolution exhausted for track: {0}")]
    ResolutionExhausted(String),

    /// Queue empty and continuity search found nothing
    #[error("Queue starved: no playable tracks remain")]
    QueueStarved,

    /// Device-level decode or network failure for the current source
    #[error("Decode error: {0}")]
    Decode(String),

    /// Output device errors other than abort/decode
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider/network errors during resolution or search
    #[error("HTTP error: {0}")]
    Http(String),

    /// Invalid request from the API layer
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Abort-class errors are expected during rapid transport changes and
    /// must not be propagated as user-visible failures.
    pub fn is_benign(&self) -> bool {
        matches!(self, Error::DeviceAbort(_) | Error::GraphConflict)
    }
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;
