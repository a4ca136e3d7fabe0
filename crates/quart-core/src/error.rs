//! Error types for the Quart core library.

use thiserror::Error;

/// Result type alias using Quart core `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Quart operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Packed bit buffer could not be decoded
    #[error("Bit codec error: {0}")]
    Codec(String),

    /// Peer sent a message that does not fit the current protocol step
    #[error("Protocol desync: expected {expected}, got {got}")]
    ProtocolDesync { expected: String, got: String },

    /// Two sequences that must be parallel have different lengths
    #[error("Length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Disclosure sample cannot be drawn from the sifted key
    #[error("Cannot sample {requested} distinct indices from a key of length {available}")]
    SampleTooLarge { requested: usize, available: usize },

    /// Peer link closed or failed underneath the protocol
    #[error("Peer link error: {0}")]
    Link(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a [`Error::ProtocolDesync`] from what the current step wanted and what arrived.
    pub fn desync(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::ProtocolDesync {
            expected: expected.into(),
            got: got.into(),
        }
    }
}
