//! Sender side of a session.

use quart_core::config::ProtocolParams;
use quart_core::{Message, PeerLink, SessionMetadata};
use rand::Rng;
use tracing::info;

use super::phases::{Estimation, RawMaterial};
use super::{Exchange, Phase, SessionOutcome, Side};
use crate::error::SessionError;
use crate::quantum::QuantumLink;

/// What the sender wants to share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Encrypt and deliver a file; the key is as long as the file in bits.
    File { name: String, contents: Vec<u8> },
    /// Only agree on a key of `bits` bits.
    KeyOnly { bits: usize },
}

impl Payload {
    /// Final key length needed for this payload.
    pub fn key_bits(&self) -> usize {
        match self {
            Self::File { contents, .. } => contents.len() * 8,
            Self::KeyOnly { bits } => *bits,
        }
    }

    fn filename(&self) -> Option<String> {
        match self {
            Self::File { name, .. } => Some(name.clone()),
            Self::KeyOnly { .. } => None,
        }
    }
}

/// Run the sender pipeline to completion.
pub async fn run_sender<L, Q, R>(
    link: &mut L,
    quantum: &mut Q,
    params: &ProtocolParams,
    payload: Payload,
    rng: &mut R,
) -> Result<SessionOutcome, SessionError>
where
    L: PeerLink<Error = SessionError> + Send,
    Q: QuantumLink + Send,
    R: Rng + Send,
{
    let n = payload.key_bits();
    if n == 0 {
        return Err(SessionError::Config("nothing to send: payload is empty".into()));
    }

    let metadata = SessionMetadata {
        n,
        security_param: params.security,
        correctness_param: params.correctness,
        filename: payload.filename(),
    };
    let count = metadata.raw_qubit_count();
    info!(phase = %Phase::Init, n, qubits = count, filename = ?metadata.filename, "Starting session as sender");
    link.checkpoint()?;
    link.send(Message::Metadata(metadata)).await?;

    let raw = RawMaterial::prepare(count, rng);
    quantum.transmit(&raw.qubits()).await?;
    match link.recv().await? {
        Message::QubitsReceived { count: received } if received == count => {}
        Message::QubitsReceived { count: received } => {
            return Err(SessionError::desync(
                format!("{count} qubits received"),
                format!("{received} qubits received"),
            ));
        }
        other => return Err(other.unexpected("qubits_received").into()),
    }
    info!(phase = %Phase::ExchangeQubits, count, "Qubits delivered");

    let sifted = raw.sift(Side::Sender, link).await?;
    let estimated = match sifted
        .estimate(Side::Sender, link, n, params.security, rng)
        .await?
    {
        Estimation::Proceed(material) => material,
        Estimation::Abort(decision) => {
            info!(phase = %Phase::Abort, "Security gate rejected the exchange");
            return Ok(SessionOutcome::Aborted(decision));
        }
    };
    let (estimate, decision) = (estimated.estimate, estimated.decision);
    let reconciled = estimated.reconcile(Side::Sender, link, rng).await?;
    reconciled.confirm(Side::Sender, link, rng).await?;
    let (key, cascade) = reconciled.amplify(Side::Sender, link, n, rng).await?;

    if let Payload::File { name, contents } = &payload {
        link.checkpoint()?;
        let ciphertext = key.encrypt(contents)?;
        link.send(Message::Ciphertext(ciphertext)).await?;
        info!(phase = %Phase::TransferPayload, file = %name, bytes = contents.len(), "Sent encrypted file");
    }

    info!(phase = %Phase::Done, fingerprint = %key.fingerprint(), "Session complete");
    Ok(SessionOutcome::Completed(Exchange {
        key,
        estimate,
        decision,
        cascade,
        delivered: None,
    }))
}
