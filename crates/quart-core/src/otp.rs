//! Final shared key and one-time-pad encryption.

use std::fmt;

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::bits::{bits_to_bytes, bytes_to_bits};
use crate::error::{Error, Result};

/// Final key produced by privacy amplification. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey {
    bits: Vec<bool>,
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKey")
            .field("len", &self.bits.len())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl SharedKey {
    pub const fn new(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Key bits. Handle with care.
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    /// Hex SHA-256 of the sentinel-packed key, safe to log and compare.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(crate::bits::pack_bits(&self.bits));
        hex::encode(&digest[..8])
    }

    /// Key bits as lowercase hex, MSB-first, padded to whole bytes with zeros.
    pub fn to_hex(&self) -> String {
        let mut padded = self.bits.clone();
        padded.resize(self.bits.len().div_ceil(8) * 8, false);
        let mut bytes = bytes_of(&padded);
        let out = hex::encode(&bytes);
        bytes.zeroize();
        padded.zeroize();
        out
    }

    /// `plaintext_bits XOR key`, one key bit per plaintext bit.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<bool>> {
        let mut bits = bytes_to_bits(plaintext);
        let cipher = self.xor(&bits);
        bits.zeroize();
        cipher
    }

    /// Inverse of [`SharedKey::encrypt`].
    pub fn decrypt(&self, ciphertext: &[bool]) -> Result<Vec<u8>> {
        let mut bits = self.xor(ciphertext)?;
        let plain = bits_to_bytes(&bits);
        bits.zeroize();
        plain
    }

    fn xor(&self, data: &[bool]) -> Result<Vec<bool>> {
        if data.len() > self.bits.len() {
            return Err(Error::LengthMismatch {
                expected: self.bits.len(),
                actual: data.len(),
            });
        }
        Ok(data.iter().zip(&self.bits).map(|(d, k)| d ^ k).collect())
    }
}

fn bytes_of(bits: &[bool]) -> Vec<u8> {
    // Callers pad to whole bytes first.
    bits_to_bytes(bits).unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn random_key(len: usize, seed: u64) -> SharedKey {
        let mut rng = StdRng::seed_from_u64(seed);
        SharedKey::new((0..len).map(|_| rng.r#gen()).collect())
    }

    #[test]
    fn encrypt_then_decrypt_roundtrips() {
        for (i, payload) in [&b""[..], b"x", b"hello quantum world", &[0u8, 255, 17, 128]]
            .iter()
            .enumerate()
        {
            let key = random_key(payload.len() * 8, i as u64);
            let cipher = key.encrypt(payload).unwrap();
            assert_eq!(cipher.len(), payload.len() * 8);
            assert_eq!(key.decrypt(&cipher).unwrap(), *payload);
        }
    }

    #[test]
    fn ciphertext_differs_from_plaintext_for_nonzero_key() {
        let key = SharedKey::new(vec![true; 8]);
        let cipher = key.encrypt(&[0b1010_1010]).unwrap();
        assert_eq!(bits_to_bytes(&cipher).unwrap(), vec![0b0101_0101]);
    }

    #[test]
    fn short_key_is_rejected() {
        let key = SharedKey::new(vec![true; 7]);
        assert!(key.encrypt(b"a").is_err());
    }

    #[test]
    fn hex_pads_partial_bytes() {
        let key = SharedKey::new(vec![true, true, true, true, false, false, false, true, true]);
        assert_eq!(key.to_hex(), "f180");
    }

    #[test]
    fn debug_redacts_bits() {
        let key = SharedKey::new(vec![true, false, true]);
        let shown = format!("{key:?}");
        assert!(shown.contains("fingerprint"));
        assert!(!shown.contains("true"));
    }

    #[test]
    fn equal_keys_share_fingerprint() {
        let a = random_key(64, 3);
        let b = SharedKey::new(a.bits().to_vec());
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), random_key(64, 4).fingerprint());
    }
}
