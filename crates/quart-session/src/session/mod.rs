//! BB84 session orchestration.
//!
//! Each party walks the same fixed pipeline:
//!
//! ```text
//! Init -> ExchangeQubits -> Sift -> EstimateError -> { Abort
//!       | CorrectErrors -> Amplify -> TransferPayload -> Done }
//! ```
//!
//! No phase is revisited. The material produced by one phase is moved into
//! the next as a distinct type, so a phase cannot run on stale or
//! half-processed key bits.

mod phases;
mod receiver;
mod sender;

use std::fmt;
use std::path::{Path, PathBuf};

use quart_core::SharedKey;
use quart_core::cascade::CascadeReport;
use quart_core::estimation::{ErrorEstimate, GateDecision};

use crate::error::SessionError;

pub use receiver::{ReceiverOptions, run_receiver};
pub use sender::{Payload, run_sender};

/// Pipeline position, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    ExchangeQubits,
    Sift,
    EstimateError,
    CorrectErrors,
    Amplify,
    TransferPayload,
    Done,
    Abort,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::ExchangeQubits => "exchange_qubits",
            Self::Sift => "sift",
            Self::EstimateError => "estimate_error",
            Self::CorrectErrors => "correct_errors",
            Self::Amplify => "amplify",
            Self::TransferPayload => "transfer_payload",
            Self::Done => "done",
            Self::Abort => "abort",
        })
    }
}

/// Which end of the exchange this party is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Prepares qubits, drives every exchange, holds the reference key.
    Sender,
    /// Measures qubits and corrects its key towards the sender's.
    Receiver,
}

/// A finished exchange.
#[derive(Debug)]
pub struct Exchange {
    pub key: SharedKey,
    pub estimate: ErrorEstimate,
    pub decision: GateDecision,
    pub cascade: CascadeReport,
    /// Receiver only: where the decrypted file was written.
    pub delivered: Option<PathBuf>,
}

/// How a session ended when no fatal error occurred.
#[derive(Debug)]
pub enum SessionOutcome {
    Completed(Exchange),
    /// The security gate refused to extract a key. Nothing was encrypted.
    Aborted(GateDecision),
}

impl SessionOutcome {
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// `<out_dir>/<receiver>-<basename(filename)>`.
///
/// Directory components of the peer-supplied name are dropped.
pub fn output_path(out_dir: &Path, receiver: &str, filename: &str) -> Result<PathBuf, SessionError> {
    let base = Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| SessionError::desync("file name", format!("{filename:?}")))?;
    Ok(out_dir.join(format!("{receiver}-{base}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn output_path_prefixes_receiver_name() {
        let path = output_path(Path::new("/tmp/out"), "bob", "report.pdf").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/out/bob-report.pdf"));
    }

    #[test]
    fn output_path_strips_directories() {
        let path = output_path(Path::new("out"), "bob", "../../etc/passwd").unwrap();
        assert_eq!(path, PathBuf::from("out/bob-passwd"));
        let path = output_path(Path::new("out"), "bob", "/abs/dir/note.txt").unwrap();
        assert_eq!(path, PathBuf::from("out/bob-note.txt"));
    }

    #[test]
    fn output_path_rejects_nameless_input() {
        assert!(output_path(Path::new("out"), "bob", "..").is_err());
        assert!(output_path(Path::new("out"), "bob", "").is_err());
    }

    #[test]
    fn phase_names_are_snake_case() {
        assert_eq!(Phase::EstimateError.to_string(), "estimate_error");
        assert_eq!(Phase::TransferPayload.to_string(), "transfer_payload");
    }
}
