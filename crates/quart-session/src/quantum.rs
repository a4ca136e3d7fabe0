//! Quantum channel seam and a simulated implementation.
//!
//! The simulator carries polarization states as ordinary frames. Measuring a
//! qubit in the basis it was prepared in returns the prepared bit; measuring
//! in the other basis returns a coin flip. Channel noise and an optional
//! intercept-resend eavesdropper are applied on the transmitting side.

use std::future::Future;
use std::time::Duration;

use quart_core::Basis;
use quart_core::basis::packed_bases;
use quart_core::bits::packed_bits;
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::channel::guarded;
use crate::error::SessionError;
use crate::transport::FramedStream;

/// Qubits per frame.
const BATCH: usize = 8192;

/// A single prepared photon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Qubit {
    value: bool,
    basis: Basis,
}

impl Qubit {
    pub const fn encode(bit: bool, basis: Basis) -> Self {
        Self { value: bit, basis }
    }

    /// Measure in `basis`. Consumes the qubit.
    pub fn measure<R: Rng + ?Sized>(self, basis: Basis, rng: &mut R) -> bool {
        if basis == self.basis {
            self.value
        } else {
            rng.r#gen()
        }
    }
}

/// Sender-to-receiver qubit transport.
pub trait QuantumLink {
    fn transmit(&mut self, qubits: &[Qubit]) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Receive exactly `count` qubits.
    fn receive(&mut self, count: usize) -> impl Future<Output = Result<Vec<Qubit>, SessionError>> + Send;
}

/// Physical imperfections applied to transmitted qubits.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelModel {
    /// Probability that a qubit's bit is flipped in transit.
    pub noise: f64,
    /// Measure every qubit in a random basis and resend the result.
    pub intercept_resend: bool,
}

impl ChannelModel {
    /// `noise` as a usable probability: NaN and negatives count as no noise.
    fn flip_probability(&self) -> f64 {
        if self.noise.is_nan() {
            0.0
        } else {
            self.noise.clamp(0.0, 1.0)
        }
    }

    fn disturb<R: Rng + ?Sized>(&self, qubit: Qubit, rng: &mut R) -> Qubit {
        let qubit = if self.intercept_resend {
            let basis = Basis::random(rng);
            Qubit::encode(qubit.measure(basis, rng), basis)
        } else {
            qubit
        };
        let flip = self.flip_probability();
        if flip > 0.0 && rng.gen_bool(flip) {
            Qubit::encode(!qubit.value, qubit.basis)
        } else {
            qubit
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct QubitBatch {
    #[serde(with = "packed_bits")]
    values: Vec<bool>,
    #[serde(with = "packed_bases")]
    bases: Vec<Basis>,
}

/// [`QuantumLink`] that ships simulated qubits over a framed byte stream.
pub struct SimulatedQuantumLink<S> {
    stream: FramedStream<S>,
    model: ChannelModel,
    rng: StdRng,
    receive_timeout: Duration,
    cancel: CancellationToken,
}

impl<S> std::fmt::Debug for SimulatedQuantumLink<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedQuantumLink")
            .field("model", &self.model)
            .field("receive_timeout", &self.receive_timeout)
            .finish_non_exhaustive()
    }
}

impl<S> SimulatedQuantumLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub const fn new(
        stream: FramedStream<S>,
        model: ChannelModel,
        rng: StdRng,
        receive_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stream,
            model,
            rng,
            receive_timeout,
            cancel,
        }
    }
}

impl<S> QuantumLink for SimulatedQuantumLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn transmit(&mut self, qubits: &[Qubit]) -> Result<(), SessionError> {
        if self.model.intercept_resend {
            info!(count = qubits.len(), "Eavesdropper intercepting qubits");
        }
        for chunk in qubits.chunks(BATCH) {
            let (values, bases): (Vec<bool>, Vec<Basis>) = chunk
                .iter()
                .map(|&q| {
                    let q = self.model.disturb(q, &mut self.rng);
                    (q.value, q.basis)
                })
                .unzip();
            let frame = serde_json::to_vec(&QubitBatch { values, bases })
                .map_err(quart_core::Error::from)?;
            guarded(
                &self.cancel,
                self.receive_timeout,
                "qubit acknowledgement",
                self.stream.send_frame(&frame),
            )
            .await?;
        }
        debug!(count = qubits.len(), "Transmitted qubits");
        Ok(())
    }

    async fn receive(&mut self, count: usize) -> Result<Vec<Qubit>, SessionError> {
        let mut qubits = Vec::with_capacity(count);
        while qubits.len() < count {
            let frame = guarded(
                &self.cancel,
                self.receive_timeout,
                "qubits",
                self.stream.recv_frame(),
            )
            .await?;
            let batch: QubitBatch = serde_json::from_slice(&frame)
                .map_err(|e| SessionError::desync("qubit batch", e.to_string()))?;
            if batch.values.len() != batch.bases.len() {
                return Err(SessionError::desync(
                    format!("{} bases", batch.values.len()),
                    format!("{} bases", batch.bases.len()),
                ));
            }
            qubits.extend(
                batch
                    .values
                    .into_iter()
                    .zip(batch.bases)
                    .map(|(value, basis)| Qubit::encode(value, basis)),
            );
        }
        if qubits.len() != count {
            return Err(SessionError::desync(
                format!("{count} qubits"),
                format!("{} qubits", qubits.len()),
            ));
        }
        debug!(count, "Received qubits");
        Ok(qubits)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use tokio::io::{DuplexStream, duplex};

    use super::*;

    fn link_pair(
        model: ChannelModel,
    ) -> (
        SimulatedQuantumLink<DuplexStream>,
        SimulatedQuantumLink<DuplexStream>,
    ) {
        let (a, b) = duplex(1 << 16);
        let make = |stream, model, seed| {
            SimulatedQuantumLink::new(
                FramedStream::new(stream, 1 << 24),
                model,
                StdRng::seed_from_u64(seed),
                Duration::from_secs(5),
                CancellationToken::new(),
            )
        };
        (make(a, model, 1), make(b, ChannelModel::default(), 2))
    }

    fn prepare(count: usize, rng: &mut StdRng) -> Vec<Qubit> {
        (0..count)
            .map(|_| Qubit::encode(rng.r#gen(), Basis::random(rng)))
            .collect()
    }

    #[test]
    fn matching_basis_measurement_is_exact() {
        let mut rng = StdRng::seed_from_u64(0);
        for bit in [false, true] {
            for basis in [Basis::Rectilinear, Basis::Diagonal] {
                assert_eq!(Qubit::encode(bit, basis).measure(basis, &mut rng), bit);
            }
        }
    }

    #[test]
    fn wrong_basis_measurement_is_random() {
        let mut rng = StdRng::seed_from_u64(9);
        let ones = (0..2000)
            .filter(|_| Qubit::encode(true, Basis::Rectilinear).measure(Basis::Diagonal, &mut rng))
            .count();
        assert!((800..1200).contains(&ones), "got {ones} ones");
    }

    #[test]
    fn out_of_range_noise_is_clamped() {
        let mut rng = StdRng::seed_from_u64(4);
        let qubit = Qubit::encode(true, Basis::Diagonal);
        for noise in [-0.5, f64::NAN, f64::NEG_INFINITY] {
            let model = ChannelModel {
                noise,
                intercept_resend: false,
            };
            for _ in 0..100 {
                assert_eq!(model.disturb(qubit, &mut rng), qubit);
            }
        }
        let always = ChannelModel {
            noise: 3.0,
            intercept_resend: false,
        };
        for _ in 0..100 {
            assert_eq!(always.disturb(qubit, &mut rng), Qubit::encode(false, Basis::Diagonal));
        }
    }

    #[tokio::test]
    async fn clean_channel_delivers_qubits_unchanged() {
        let (mut alice, mut bob) = link_pair(ChannelModel::default());
        let qubits = prepare(20_000, &mut StdRng::seed_from_u64(3));
        let (sent, got) = tokio::join!(alice.transmit(&qubits), bob.receive(qubits.len()));
        sent.unwrap();
        assert_eq!(got.unwrap(), qubits);
    }

    #[tokio::test]
    async fn noise_flips_about_the_configured_fraction() {
        let model = ChannelModel {
            noise: 0.1,
            intercept_resend: false,
        };
        let (mut alice, mut bob) = link_pair(model);
        let qubits = prepare(10_000, &mut StdRng::seed_from_u64(4));
        let (sent, got) = tokio::join!(alice.transmit(&qubits), bob.receive(qubits.len()));
        sent.unwrap();
        let got = got.unwrap();
        let flipped = qubits.iter().zip(&got).filter(|(a, b)| a.value != b.value).count();
        assert!((800..1200).contains(&flipped), "flipped {flipped}");
        assert!(qubits.iter().zip(&got).all(|(a, b)| a.basis == b.basis));
    }

    #[tokio::test]
    async fn eavesdropper_disturbs_a_quarter_of_matching_measurements() {
        let model = ChannelModel {
            noise: 0.0,
            intercept_resend: true,
        };
        let (mut alice, mut bob) = link_pair(model);
        let mut rng = StdRng::seed_from_u64(5);
        let qubits = prepare(8000, &mut rng);
        let (sent, got) = tokio::join!(alice.transmit(&qubits), bob.receive(qubits.len()));
        sent.unwrap();
        let errors = qubits
            .iter()
            .zip(got.unwrap())
            .filter(|(sent, received)| received.measure(sent.basis, &mut rng) != sent.value)
            .count();
        // Expect ~25% of 8000.
        assert!((1700..2300).contains(&errors), "errors {errors}");
    }

    #[tokio::test]
    async fn overlong_batch_is_a_desync() {
        let (mut alice, mut bob) = link_pair(ChannelModel::default());
        let qubits = prepare(10, &mut StdRng::seed_from_u64(6));
        let (sent, got) = tokio::join!(alice.transmit(&qubits), bob.receive(4));
        sent.unwrap();
        assert!(matches!(got, Err(SessionError::ProtocolDesync { .. })));
    }
}
