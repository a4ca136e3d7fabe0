//! Crypto error types.

/// Errors from signing, verification and key storage.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Signature verification failed")]
    InvalidSignature,

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Key encoding error: {0}")]
    KeyEncoding(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
