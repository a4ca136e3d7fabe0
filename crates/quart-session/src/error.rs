//! Session error types.

use std::time::Duration;

use quart_crypto::CryptoError;

/// Errors that end a key-exchange session.
///
/// An exchange rejected by the security gate is not an error; it is reported
/// as [`crate::SessionOutcome::Aborted`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Protocol desync: expected {expected}, got {got}")]
    ProtocolDesync { expected: String, got: String },

    #[error("Timed out after {after:?} waiting for {operation}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Session cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Core(quart_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub fn desync(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::ProtocolDesync {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub(crate) fn transport(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Transport(format!("{context}: {err}"))
    }
}

impl From<quart_core::Error> for SessionError {
    fn from(err: quart_core::Error) -> Self {
        match err {
            quart_core::Error::ProtocolDesync { expected, got } => {
                Self::ProtocolDesync { expected, got }
            }
            // Parallel sequences only disagree in length when the peer sent the wrong amount.
            quart_core::Error::LengthMismatch { expected, actual } => Self::ProtocolDesync {
                expected: format!("{expected} items"),
                got: format!("{actual} items"),
            },
            quart_core::Error::Config(msg) => Self::Config(msg),
            other => Self::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_desync_stays_a_desync() {
        let err: SessionError = quart_core::Error::desync("bases", "located").into();
        assert!(matches!(err, SessionError::ProtocolDesync { .. }));
        let err: SessionError = quart_core::Error::LengthMismatch {
            expected: 3,
            actual: 2,
        }
        .into();
        assert_eq!(err.to_string(), "Protocol desync: expected 3 items, got 2 items");
    }

    #[test]
    fn other_core_errors_are_wrapped() {
        let err: SessionError = quart_core::Error::Codec("bad".into()).into();
        assert!(matches!(err, SessionError::Core(_)));
        assert_eq!(err.to_string(), "Bit codec error: bad");
    }
}
