//! Encoding bases.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Basis a qubit was prepared or measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Basis {
    /// Computational basis, |0> and |1>.
    Rectilinear,
    /// Hadamard basis, |+> and |->.
    Diagonal,
}

impl Basis {
    /// Pick a basis uniformly at random.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_bit(rng.r#gen())
    }

    /// Wire representation: `false` is rectilinear, `true` diagonal.
    pub const fn as_bit(self) -> bool {
        matches!(self, Self::Diagonal)
    }

    pub const fn from_bit(bit: bool) -> Self {
        if bit { Self::Diagonal } else { Self::Rectilinear }
    }
}

/// `serde` adapter packing a basis list with the sentinel bit codec.
pub mod packed_bases {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Basis;

    pub fn serialize<S: Serializer>(bases: &[Basis], serializer: S) -> Result<S::Ok, S::Error> {
        let bits: Vec<bool> = bases.iter().map(|b| b.as_bit()).collect();
        serializer.serialize_bytes(&crate::bits::pack_bits(&bits))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Basis>, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        let bits = crate::bits::unpack_bits(&bytes).map_err(serde::de::Error::custom)?;
        Ok(bits.into_iter().map(Basis::from_bit).collect())
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn bit_mapping_roundtrips() {
        for basis in [Basis::Rectilinear, Basis::Diagonal] {
            assert_eq!(Basis::from_bit(basis.as_bit()), basis);
        }
    }

    #[test]
    fn random_basis_uses_both_values() {
        let mut rng = StdRng::seed_from_u64(7);
        let diagonal = (0..1000)
            .filter(|_| Basis::random(&mut rng) == Basis::Diagonal)
            .count();
        assert!((350..650).contains(&diagonal), "diagonal count {diagonal}");
    }
}
