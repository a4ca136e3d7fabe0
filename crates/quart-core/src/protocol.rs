//! Classical control messages exchanged between sender and receiver, and the
//! [`PeerLink`] seam the protocol phases talk through.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::basis::{Basis, packed_bases};
use crate::bits::packed_bits;
use crate::error::Error;

/// Session parameters announced by the sender before any qubit is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Final key length in bits (payload bit length in file mode).
    pub n: usize,
    pub security_param: f64,
    pub correctness_param: f64,
    /// Original file name; `None` for a key-only exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl SessionMetadata {
    /// Number of raw qubits both sides agree to exchange.
    pub fn raw_qubit_count(&self) -> usize {
        raw_qubit_count(self.n, self.correctness_param)
    }
}

/// `ceil((4 + correctness) * n) + 25`.
pub fn raw_qubit_count(n: usize, correctness_param: f64) -> usize {
    ((4.0 + correctness_param) * n as f64).ceil() as usize + 25
}

/// Which half of a bisection range holds the odd parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Half {
    First,
    Second,
}

/// Every message that crosses the authenticated channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum Message {
    Metadata(SessionMetadata),
    /// Receiver has measured all qubits.
    QubitsReceived { count: usize },
    Bases(#[serde(with = "packed_bases")] Vec<Basis>),
    /// Sender's disclosed sample: positions and its bits at those positions.
    Disclosure {
        indices: Vec<usize>,
        #[serde(with = "packed_bits")]
        bits: Vec<bool>,
    },
    /// Receiver's bits at the disclosed positions.
    DisclosureReply(#[serde(with = "packed_bits")] Vec<bool>),
    /// Index order for a Cascade iteration after the first.
    Permutation { iteration: usize, order: Vec<usize> },
    BlockParities {
        iteration: usize,
        #[serde(with = "packed_bits")]
        parities: Vec<bool>,
    },
    /// Corrector asks to bisect a dirty block.
    Bisect { iteration: usize, block: usize },
    /// Reference parity of the first half of the current bisection range.
    HalfParity(bool),
    Descend(Half),
    /// The erroneous bit of the current bisection was flipped.
    Located,
    /// Corrector finished the current Cascade iteration.
    RoundDone,
    /// Sender's universal-hash seed and its tag over the reconciled key.
    KeyCheck {
        #[serde(with = "packed_bits")]
        seed: Vec<bool>,
        #[serde(with = "packed_bits")]
        tag: Vec<bool>,
    },
    /// Receiver's tag under the same seed.
    KeyCheckReply(#[serde(with = "packed_bits")] Vec<bool>),
    ToeplitzSeed(#[serde(with = "packed_bits")] Vec<bool>),
    Ciphertext(#[serde(with = "packed_bits")] Vec<bool>),
}

impl Message {
    /// Short name used in desync errors and logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Metadata(_) => "metadata",
            Self::QubitsReceived { .. } => "qubits_received",
            Self::Bases(_) => "bases",
            Self::Disclosure { .. } => "disclosure",
            Self::DisclosureReply(_) => "disclosure_reply",
            Self::Permutation { .. } => "permutation",
            Self::BlockParities { .. } => "block_parities",
            Self::Bisect { .. } => "bisect",
            Self::HalfParity(_) => "half_parity",
            Self::Descend(_) => "descend",
            Self::Located => "located",
            Self::RoundDone => "round_done",
            Self::KeyCheck { .. } => "key_check",
            Self::KeyCheckReply(_) => "key_check_reply",
            Self::ToeplitzSeed(_) => "toeplitz_seed",
            Self::Ciphertext(_) => "ciphertext",
        }
    }

    /// Desync error for a message that arrived where `expected` was due.
    pub fn unexpected(&self, expected: &str) -> Error {
        Error::desync(expected, self.kind())
    }
}

/// Ordered, reliable message link to the other party.
///
/// Implementations block (await) until a send is delivered or a message
/// arrives. `checkpoint` is called by long-running phases between steps so
/// an implementation can surface cancellation.
pub trait PeerLink {
    type Error: From<Error> + Send;

    fn send(&mut self, message: Message) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn recv(&mut self) -> impl Future<Output = Result<Message, Self::Error>> + Send;

    fn checkpoint(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}
