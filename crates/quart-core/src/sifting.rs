//! Basis reconciliation.

use crate::basis::Basis;
use crate::error::{Error, Result};

/// Key bits and bases left after dropping mismatched-basis rounds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sifted {
    pub key: Vec<bool>,
    pub bases: Vec<Basis>,
}

impl Sifted {
    pub fn len(&self) -> usize {
        self.key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

/// Keep only the rounds where `own_bases` and `peer_bases` agree.
///
/// Both parties call this with the same pair of basis lists, so both remove
/// the same index set and end with equally long keys.
pub fn sift(raw_key: &[bool], own_bases: &[Basis], peer_bases: &[Basis]) -> Result<Sifted> {
    if own_bases.len() != raw_key.len() {
        return Err(Error::LengthMismatch {
            expected: raw_key.len(),
            actual: own_bases.len(),
        });
    }
    if peer_bases.len() != own_bases.len() {
        return Err(Error::LengthMismatch {
            expected: own_bases.len(),
            actual: peer_bases.len(),
        });
    }

    let (key, bases) = raw_key
        .iter()
        .zip(own_bases.iter().zip(peer_bases))
        .filter(|(_, (own, peer))| own == peer)
        .map(|(&bit, (&own, _))| (bit, own))
        .unzip();
    Ok(Sifted { key, bases })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use Basis::{Diagonal as D, Rectilinear as R};

    #[test]
    fn drops_mismatched_rounds() {
        let raw = [true, false, true, true, false];
        let own = [R, D, D, R, R];
        let peer = [R, R, D, D, R];
        let sifted = sift(&raw, &own, &peer).unwrap();
        assert_eq!(sifted.key, vec![true, true, false]);
        assert_eq!(sifted.bases, vec![R, D, R]);
    }

    #[test]
    fn length_equals_matching_count_and_order_is_kept() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let len = rng.gen_range(0..200);
            let raw: Vec<bool> = (0..len).map(|_| rng.r#gen()).collect();
            let own: Vec<Basis> = (0..len).map(|_| Basis::random(&mut rng)).collect();
            let peer: Vec<Basis> = (0..len).map(|_| Basis::random(&mut rng)).collect();

            let matching: Vec<usize> = (0..len).filter(|&i| own[i] == peer[i]).collect();
            let sifted = sift(&raw, &own, &peer).unwrap();

            assert_eq!(sifted.len(), matching.len());
            let expected: Vec<bool> = matching.iter().map(|&i| raw[i]).collect();
            assert_eq!(sifted.key, expected);
        }
    }

    #[test]
    fn both_parties_agree_on_length() {
        let alice_bases = [R, D, R, D];
        let bob_bases = [D, D, R, R];
        let alice = sift(&[true, true, false, false], &alice_bases, &bob_bases).unwrap();
        let bob = sift(&[false, true, false, true], &bob_bases, &alice_bases).unwrap();
        assert_eq!(alice.len(), bob.len());
        assert_eq!(alice.key, bob.key);
    }

    #[test]
    fn unequal_lengths_are_rejected() {
        let err = sift(&[true, false], &[R, D], &[R]).unwrap_err();
        assert!(matches!(
            err,
            Error::LengthMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }
}
