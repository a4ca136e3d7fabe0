//! Phase steps shared by both sides.

use std::collections::HashSet;

use quart_core::amplification::ToeplitzSeed;
use quart_core::cascade::{self, CascadeReport, Role};
use quart_core::estimation::{
    BasisErrorReport, ErrorEstimate, GateDecision, SecurityGate, disclose, discard_disclosed,
    sample_indices,
};
use quart_core::sifting::{Sifted, sift};
use quart_core::{Basis, Message, PeerLink, SharedKey};
use rand::Rng;
use tracing::info;

use super::{Phase, Side};
use crate::error::SessionError;
use crate::quantum::Qubit;

/// Length of the tag both sides compare after Cascade.
pub const KEY_CHECK_BITS: usize = 32;

/// Raw bits and the bases they were prepared or measured in.
pub(super) struct RawMaterial {
    key: Vec<bool>,
    bases: Vec<Basis>,
}

/// Bits that survived sifting.
pub(super) struct SiftedMaterial {
    sifted: Sifted,
}

/// Sifted bits minus the disclosed sample, cleared by the security gate.
pub(super) struct EstimatedMaterial {
    key: Vec<bool>,
    pub estimate: ErrorEstimate,
    pub decision: GateDecision,
}

/// Key after Cascade, identical on both sides.
pub(super) struct ReconciledMaterial {
    key: Vec<bool>,
    pub cascade: CascadeReport,
}

pub(super) enum Estimation {
    Proceed(EstimatedMaterial),
    Abort(GateDecision),
}

impl RawMaterial {
    /// Sender: random bits in random bases.
    pub fn prepare<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Self {
        let key: Vec<bool> = (0..count).map(|_| rng.r#gen()).collect();
        let bases = (0..count).map(|_| Basis::random(rng)).collect();
        Self { key, bases }
    }

    pub fn qubits(&self) -> Vec<Qubit> {
        self.key
            .iter()
            .zip(&self.bases)
            .map(|(&bit, &basis)| Qubit::encode(bit, basis))
            .collect()
    }

    /// Receiver: measure each qubit in a freshly chosen basis.
    pub fn measure<R: Rng + ?Sized>(qubits: Vec<Qubit>, rng: &mut R) -> Self {
        let (key, bases): (Vec<bool>, Vec<Basis>) = qubits
            .into_iter()
            .map(|qubit| {
                let basis = Basis::random(rng);
                (qubit.measure(basis, rng), basis)
            })
            .unzip();
        Self { key, bases }
    }

    /// Exchange full basis lists and keep the positions where they agree.
    /// The sender speaks first.
    pub async fn sift<L>(self, side: Side, link: &mut L) -> Result<SiftedMaterial, SessionError>
    where
        L: PeerLink<Error = SessionError> + Send,
    {
        link.checkpoint()?;
        let peer_bases = match side {
            Side::Sender => {
                link.send(Message::Bases(self.bases.clone())).await?;
                expect_bases(link).await?
            }
            Side::Receiver => {
                let peer = expect_bases(link).await?;
                link.send(Message::Bases(self.bases.clone())).await?;
                peer
            }
        };
        let sifted = sift(&self.key, &self.bases, &peer_bases)?;
        info!(phase = %Phase::Sift, raw = self.key.len(), sifted = sifted.len(), "Sifted key");
        Ok(SiftedMaterial { sifted })
    }
}

async fn expect_bases<L>(link: &mut L) -> Result<Vec<Basis>, SessionError>
where
    L: PeerLink<Error = SessionError> + Send,
{
    match link.recv().await? {
        Message::Bases(bases) => Ok(bases),
        other => Err(other.unexpected("bases").into()),
    }
}

impl SiftedMaterial {
    /// Disclose a sample of `requested` bits, measure the error rate on it,
    /// drop it, and ask the security gate for a verdict.
    ///
    /// When the sifted key is not longer than `requested`, both sides abort
    /// without exchanging anything; each knows both numbers.
    pub async fn estimate<L, R>(
        self,
        side: Side,
        link: &mut L,
        requested: usize,
        security_param: f64,
        rng: &mut R,
    ) -> Result<Estimation, SessionError>
    where
        L: PeerLink<Error = SessionError> + Send,
        R: Rng + Send,
    {
        link.checkpoint()?;
        let available = self.sifted.len();
        let gate = SecurityGate::new(security_param);
        if requested >= available {
            let decision = GateDecision {
                accepted: false,
                ..gate.evaluate(
                    0,
                    &ErrorEstimate {
                        mismatches: 0,
                        sample_size: 0,
                    },
                    requested,
                )
            };
            info!(phase = %Phase::Abort, requested, available, "Sifted key too short to sample");
            return Ok(Estimation::Abort(decision));
        }

        let (indices, own, peer) = match side {
            Side::Sender => {
                let indices = sample_indices(rng, available, requested)?;
                let own = disclose(&self.sifted.key, &indices)?;
                link.send(Message::Disclosure {
                    indices: indices.clone(),
                    bits: own.clone(),
                })
                .await?;
                let peer = match link.recv().await? {
                    Message::DisclosureReply(bits) => bits,
                    other => return Err(other.unexpected("disclosure_reply").into()),
                };
                (indices, own, peer)
            }
            Side::Receiver => {
                let (indices, peer) = match link.recv().await? {
                    Message::Disclosure { indices, bits } => (indices, bits),
                    other => return Err(other.unexpected("disclosure").into()),
                };
                check_sample(&indices, requested)?;
                let own = disclose(&self.sifted.key, &indices)?;
                link.send(Message::DisclosureReply(own.clone())).await?;
                (indices, own, peer)
            }
        };

        let estimate = ErrorEstimate::from_samples(&own, &peer)?;
        let by_basis = BasisErrorReport::new(&self.sifted.bases, &indices, &own, &peer);
        info!(
            phase = %Phase::EstimateError,
            errors = estimate.mismatches,
            sample = estimate.sample_size,
            rate = estimate.rate(),
            rectilinear_rate = by_basis.rectilinear_rate(),
            diagonal_rate = by_basis.diagonal_rate(),
            "Estimated error rate"
        );

        let remaining = discard_disclosed(self.sifted, &indices);
        let decision = gate.evaluate(remaining.len(), &estimate, requested);
        info!(
            remaining = decision.remaining,
            min_entropy = decision.min_entropy,
            max_key = decision.max_key,
            requested,
            accepted = decision.accepted,
            "Security gate decision"
        );
        if !decision.accepted {
            return Ok(Estimation::Abort(decision));
        }
        Ok(Estimation::Proceed(EstimatedMaterial {
            key: remaining.key,
            estimate,
            decision,
        }))
    }
}

fn check_sample(indices: &[usize], requested: usize) -> Result<(), SessionError> {
    if indices.len() != requested {
        return Err(SessionError::desync(
            format!("{requested} disclosed indices"),
            format!("{} indices", indices.len()),
        ));
    }
    let distinct: HashSet<_> = indices.iter().collect();
    if distinct.len() != indices.len() {
        return Err(SessionError::desync("distinct disclosed indices", "repeated index"));
    }
    Ok(())
}

impl EstimatedMaterial {
    /// Run Cascade. The sender is the reference, the receiver corrects.
    pub async fn reconcile<L, R>(
        self,
        side: Side,
        link: &mut L,
        rng: &mut R,
    ) -> Result<ReconciledMaterial, SessionError>
    where
        L: PeerLink<Error = SessionError> + Send,
        R: Rng + Send,
    {
        link.checkpoint()?;
        let role = match side {
            Side::Sender => Role::Reference,
            Side::Receiver => Role::Corrector,
        };
        let mut key = self.key;
        let cascade = cascade::reconcile(role, &mut key, self.estimate.rate(), link, rng).await?;
        info!(
            phase = %Phase::CorrectErrors,
            bisections = cascade.bisections,
            corrected = cascade.flipped.len(),
            "Reconciled key"
        );
        Ok(ReconciledMaterial { key, cascade })
    }
}

impl ReconciledMaterial {
    /// Compare a short Toeplitz-hash tag of both reconciled keys.
    ///
    /// The sender picks a fresh seed and sends its tag; the receiver answers
    /// with its own tag before comparing, so both sides see a mismatch and
    /// fail with a desync instead of deriving different keys.
    pub async fn confirm<L, R>(&self, side: Side, link: &mut L, rng: &mut R) -> Result<(), SessionError>
    where
        L: PeerLink<Error = SessionError> + Send,
        R: Rng + Send,
    {
        link.checkpoint()?;
        let (own, peer) = match side {
            Side::Sender => {
                let seed = ToeplitzSeed::generate(rng, KEY_CHECK_BITS, self.key.len());
                let tag = seed.hash(&self.key)?;
                link.send(Message::KeyCheck {
                    seed: seed.bits().to_vec(),
                    tag: tag.clone(),
                })
                .await?;
                let peer = match link.recv().await? {
                    Message::KeyCheckReply(tag) => tag,
                    other => return Err(other.unexpected("key_check_reply").into()),
                };
                (tag, peer)
            }
            Side::Receiver => {
                let (seed, peer) = match link.recv().await? {
                    Message::KeyCheck { seed, tag } => (seed, tag),
                    other => return Err(other.unexpected("key_check").into()),
                };
                let seed = ToeplitzSeed::from_bits(seed, KEY_CHECK_BITS, self.key.len())?;
                let tag = seed.hash(&self.key)?;
                link.send(Message::KeyCheckReply(tag.clone())).await?;
                (tag, peer)
            }
        };
        if own != peer {
            return Err(SessionError::desync("matching reconciled keys", "different key check tags"));
        }
        info!(phase = %Phase::CorrectErrors, tag_bits = KEY_CHECK_BITS, "Reconciled keys confirmed");
        Ok(())
    }

    /// Compress to `output_len` bits with a Toeplitz hash seeded by the sender.
    pub async fn amplify<L, R>(
        self,
        side: Side,
        link: &mut L,
        output_len: usize,
        rng: &mut R,
    ) -> Result<(SharedKey, CascadeReport), SessionError>
    where
        L: PeerLink<Error = SessionError> + Send,
        R: Rng + Send,
    {
        link.checkpoint()?;
        let seed = match side {
            Side::Sender => {
                let seed = ToeplitzSeed::generate(rng, output_len, self.key.len());
                link.send(Message::ToeplitzSeed(seed.bits().to_vec())).await?;
                seed
            }
            Side::Receiver => match link.recv().await? {
                Message::ToeplitzSeed(bits) => ToeplitzSeed::from_bits(bits, output_len, self.key.len())?,
                other => return Err(other.unexpected("toeplitz_seed").into()),
            },
        };
        let key = SharedKey::new(seed.hash(&self.key)?);
        info!(phase = %Phase::Amplify, bits = key.len(), fingerprint = %key.fingerprint(), "Derived final key");
        Ok((key, self.cascade))
    }
}
