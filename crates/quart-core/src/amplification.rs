//! Toeplitz-hash privacy amplification.
//!
//! A Toeplitz matrix is fixed by its first column and first row, so the
//! whole `n x m` matrix travels as a single `n + m` bit seed. Both parties
//! multiply it by their corrected key (mod 2) and obtain the same `n`-bit
//! final key. A seed is used for exactly one session.

use rand::Rng;

use crate::error::{Error, Result};

/// Column and row seed of an `n x m` Toeplitz matrix, stored concatenated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToeplitzSeed {
    bits: Vec<bool>,
    rows: usize,
}

impl ToeplitzSeed {
    /// Fresh random seed for an `output_len x key_len` matrix.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, output_len: usize, key_len: usize) -> Self {
        Self {
            bits: (0..output_len + key_len).map(|_| rng.r#gen()).collect(),
            rows: output_len,
        }
    }

    /// Rebuild a seed received from the peer, checking its length.
    pub fn from_bits(bits: Vec<bool>, output_len: usize, key_len: usize) -> Result<Self> {
        if bits.len() != output_len + key_len {
            return Err(Error::desync(
                format!("toeplitz seed of {} bits", output_len + key_len),
                format!("{} bits", bits.len()),
            ));
        }
        Ok(Self {
            bits,
            rows: output_len,
        })
    }

    /// Concatenated seed bits as sent on the wire.
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    fn columns(&self) -> usize {
        self.bits.len() - self.rows
    }

    /// Matrix entry `T[i][j] = seed[i - j + m - 1]`.
    pub fn entry(&self, i: usize, j: usize) -> bool {
        self.bits[i + self.columns() - 1 - j]
    }

    /// Compress `key` to `output_len` bits.
    pub fn hash(&self, key: &[bool]) -> Result<Vec<bool>> {
        let m = self.columns();
        if key.len() != m {
            return Err(Error::LengthMismatch {
                expected: m,
                actual: key.len(),
            });
        }
        Ok((0..self.rows)
            .map(|i| {
                key.iter()
                    .enumerate()
                    .filter(|&(_, &k)| k)
                    .fold(false, |acc, (j, _)| acc ^ self.entry(i, j))
            })
            .collect())
    }
}
