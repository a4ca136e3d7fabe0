//! Receiver side of a session.

use std::path::PathBuf;

use quart_core::{Message, PeerLink, SessionMetadata};
use rand::Rng;
use tracing::info;

use super::phases::{Estimation, RawMaterial};
use super::{Exchange, Phase, SessionOutcome, Side, output_path};
use crate::error::SessionError;
use crate::quantum::QuantumLink;

/// Where and under which name the receiver stores a delivered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverOptions {
    pub name: String,
    pub out_dir: PathBuf,
    /// Refuse sessions whose raw qubit count exceeds this.
    pub max_qubits: usize,
}

/// Run the receiver pipeline to completion.
pub async fn run_receiver<L, Q, R>(
    link: &mut L,
    quantum: &mut Q,
    options: &ReceiverOptions,
    rng: &mut R,
) -> Result<SessionOutcome, SessionError>
where
    L: PeerLink<Error = SessionError> + Send,
    Q: QuantumLink + Send,
    R: Rng + Send,
{
    link.checkpoint()?;
    let metadata = match link.recv().await? {
        Message::Metadata(metadata) => metadata,
        other => return Err(other.unexpected("metadata").into()),
    };
    let count = check_metadata(&metadata, options.max_qubits)?;
    let n = metadata.n;
    info!(phase = %Phase::Init, n, qubits = count, filename = ?metadata.filename, "Starting session as receiver");

    let qubits = quantum.receive(count).await?;
    let raw = RawMaterial::measure(qubits, rng);
    link.send(Message::QubitsReceived { count }).await?;
    info!(phase = %Phase::ExchangeQubits, count, "Measured qubits");

    let sifted = raw.sift(Side::Receiver, link).await?;
    let estimated = match sifted
        .estimate(Side::Receiver, link, n, metadata.security_param, rng)
        .await?
    {
        Estimation::Proceed(material) => material,
        Estimation::Abort(decision) => {
            info!(phase = %Phase::Abort, "Security gate rejected the exchange");
            return Ok(SessionOutcome::Aborted(decision));
        }
    };
    let (estimate, decision) = (estimated.estimate, estimated.decision);
    let reconciled = estimated.reconcile(Side::Receiver, link, rng).await?;
    reconciled.confirm(Side::Receiver, link, rng).await?;
    let (key, cascade) = reconciled.amplify(Side::Receiver, link, n, rng).await?;

    let delivered = match &metadata.filename {
        Some(filename) => {
            let target = output_path(&options.out_dir, &options.name, filename)?;
            let ciphertext = match link.recv().await? {
                Message::Ciphertext(bits) if bits.len() == n => bits,
                Message::Ciphertext(bits) => {
                    return Err(SessionError::desync(
                        format!("{n} ciphertext bits"),
                        format!("{} bits", bits.len()),
                    ));
                }
                other => return Err(other.unexpected("ciphertext").into()),
            };
            let plaintext = key.decrypt(&ciphertext)?;
            tokio::fs::create_dir_all(&options.out_dir).await?;
            tokio::fs::write(&target, &plaintext).await?;
            info!(phase = %Phase::TransferPayload, path = %target.display(), bytes = plaintext.len(), "Wrote decrypted file");
            Some(target)
        }
        None => None,
    };

    info!(phase = %Phase::Done, fingerprint = %key.fingerprint(), "Session complete");
    Ok(SessionOutcome::Completed(Exchange {
        key,
        estimate,
        decision,
        cascade,
        delivered,
    }))
}

/// Validate announced parameters and return the raw qubit count.
fn check_metadata(metadata: &SessionMetadata, max_qubits: usize) -> Result<usize, SessionError> {
    if metadata.n == 0 {
        return Err(SessionError::desync("positive key length", "0"));
    }
    if !(metadata.security_param > 0.0 && metadata.security_param <= 1.0) {
        return Err(SessionError::desync(
            "security parameter in (0, 1]",
            metadata.security_param.to_string(),
        ));
    }
    if !metadata.correctness_param.is_finite() || metadata.correctness_param < 0.0 {
        return Err(SessionError::desync(
            "non-negative correctness parameter",
            metadata.correctness_param.to_string(),
        ));
    }
    if metadata.filename.as_ref().is_some_and(|_| metadata.n % 8 != 0) {
        return Err(SessionError::desync(
            "whole-byte file length",
            format!("{} bits", metadata.n),
        ));
    }
    let count = metadata.raw_qubit_count();
    if count > max_qubits {
        return Err(SessionError::desync(
            format!("at most {max_qubits} qubits"),
            format!("{count} qubits"),
        ));
    }
    Ok(count)
}
