//! Error-rate estimation and the min-entropy security gate.
//!
//! The sender discloses a random sample of its sifted key, the receiver
//! answers with its own bits at the same positions, and both sides count
//! mismatches. The sample is public afterwards, so both parties drop it from
//! the key before the gate decides whether an `n`-bit secret can still be
//! extracted.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::basis::Basis;
use crate::error::{Error, Result};
use crate::sifting::Sifted;

/// Draw `count` distinct indices from `0..len` by rejection sampling.
///
/// Indices come back in draw order; that order is the order the matching
/// bits are disclosed in.
pub fn sample_indices<R: Rng + ?Sized>(rng: &mut R, len: usize, count: usize) -> Result<Vec<usize>> {
    if count > len {
        return Err(Error::SampleTooLarge {
            requested: count,
            available: len,
        });
    }
    let mut seen = HashSet::with_capacity(count);
    let mut indices = Vec::with_capacity(count);
    while indices.len() < count {
        let candidate = rng.gen_range(0..len);
        if seen.insert(candidate) {
            indices.push(candidate);
        }
    }
    Ok(indices)
}

/// Read the bits at `indices` out of `key`.
pub fn disclose(key: &[bool], indices: &[usize]) -> Result<Vec<bool>> {
    indices
        .iter()
        .map(|&i| {
            key.get(i).copied().ok_or_else(|| {
                Error::desync(format!("disclosure index below {}", key.len()), i.to_string())
            })
        })
        .collect()
}

/// Mismatch count over a disclosed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEstimate {
    pub mismatches: usize,
    pub sample_size: usize,
}

impl ErrorEstimate {
    /// Compare two parallel disclosed samples.
    pub fn from_samples(own: &[bool], peer: &[bool]) -> Result<Self> {
        if own.len() != peer.len() {
            return Err(Error::LengthMismatch {
                expected: own.len(),
                actual: peer.len(),
            });
        }
        let mismatches = own.iter().zip(peer).filter(|(a, b)| a != b).count();
        Ok(Self {
            mismatches,
            sample_size: own.len(),
        })
    }

    /// Measured error rate in `[0, 1]`; an empty sample reads as zero.
    pub fn rate(&self) -> f64 {
        if self.sample_size == 0 {
            0.0
        } else {
            self.mismatches as f64 / self.sample_size as f64
        }
    }
}

/// Error rate of a disclosed sample split by the basis each bit was sifted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BasisErrorReport {
    pub rectilinear: (usize, usize),
    pub diagonal: (usize, usize),
}

impl BasisErrorReport {
    pub fn new(bases: &[Basis], indices: &[usize], own: &[bool], peer: &[bool]) -> Self {
        let mut report = Self::default();
        for ((&i, a), b) in indices.iter().zip(own).zip(peer) {
            let slot = match bases.get(i) {
                Some(Basis::Rectilinear) => &mut report.rectilinear,
                Some(Basis::Diagonal) => &mut report.diagonal,
                None => continue,
            };
            slot.1 += 1;
            if a != b {
                slot.0 += 1;
            }
        }
        report
    }

    pub fn rectilinear_rate(&self) -> f64 {
        ratio(self.rectilinear)
    }

    pub fn diagonal_rate(&self) -> f64 {
        ratio(self.diagonal)
    }
}

fn ratio((errors, total): (usize, usize)) -> f64 {
    if total == 0 { 0.0 } else { errors as f64 / total as f64 }
}

/// Remove disclosed positions from the sifted key and bases.
pub fn discard_disclosed(sifted: Sifted, indices: &[usize]) -> Sifted {
    let disclosed: HashSet<usize> = indices.iter().copied().collect();
    let (key, bases) = sifted
        .key
        .into_iter()
        .zip(sifted.bases)
        .enumerate()
        .filter(|(i, _)| !disclosed.contains(i))
        .map(|(_, pair)| pair)
        .unzip();
    Sifted { key, bases }
}

/// Binary Shannon entropy, with `H(0) = H(1) = 0`.
pub fn binary_entropy(p: f64) -> f64 {
    if p <= 0.0 || p >= 1.0 {
        return 0.0;
    }
    -p * p.log2() - (1.0 - p) * (1.0 - p).log2()
}

/// Outcome of the min-entropy check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateDecision {
    /// Sifted bits left after removing the disclosed sample.
    pub remaining: usize,
    pub min_entropy: f64,
    /// Largest key length that may be extracted at the configured security.
    pub max_key: f64,
    /// Requested final key length.
    pub requested: usize,
    pub accepted: bool,
}

/// Decides whether enough min-entropy survives to extract the requested key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecurityGate {
    security_param: f64,
}

impl SecurityGate {
    pub const fn new(security_param: f64) -> Self {
        Self { security_param }
    }

    /// `remaining` is the sifted key length after the disclosed sample was removed.
    pub fn evaluate(&self, remaining: usize, estimate: &ErrorEstimate, requested: usize) -> GateDecision {
        let min_entropy = remaining as f64 * (1.0 - binary_entropy(estimate.rate()));
        let max_key = min_entropy - 2.0 * (1.0 / self.security_param).log2() - 1.0;
        GateDecision {
            remaining,
            min_entropy,
            max_key,
            requested,
            accepted: requested as f64 <= max_key,
        }
    }
}
