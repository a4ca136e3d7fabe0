//! Bit/byte codec.
//!
//! Bit lists travel over the wire packed MSB-first with a single `1` sentinel
//! bit appended after the last real bit, then zero padding up to the byte
//! boundary. The decoder strips everything from the last set bit onwards, so
//! the true length is recovered without a separate length field.
//!
//! Byte-aligned payloads (the one-time-pad plaintext) use the plain
//! [`bytes_to_bits`] / [`bits_to_bytes`] pair instead.

use crate::error::{Error, Result};

/// Pack a bit list into bytes, appending the sentinel bit.
///
/// When `bits.len()` is a multiple of 8 the sentinel needs a byte of its own,
/// so the output is always `bits.len() / 8 + 1` bytes long.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bits.len() / 8 + 1);
    let mut chunks = bits.chunks_exact(8);
    for chunk in &mut chunks {
        out.push(fold_byte(chunk));
    }
    let rest = chunks.remainder();
    let mut last = fold_byte(rest);
    last |= 0x80 >> rest.len();
    out.push(last);
    out
}

/// Unpack a sentinel-terminated byte buffer back into its bit list.
pub fn unpack_bits(bytes: &[u8]) -> Result<Vec<bool>> {
    let mut bits = bytes_to_bits(bytes);
    let sentinel = bits
        .iter()
        .rposition(|&b| b)
        .ok_or_else(|| Error::Codec("packed bits carry no sentinel".into()))?;
    bits.truncate(sentinel);
    Ok(bits)
}

/// Expand bytes MSB-first into exactly `8 * bytes.len()` bits.
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<bool> {
    bytes
        .iter()
        .flat_map(|&byte| (0..8).map(move |i| byte & (0x80 >> i) != 0))
        .collect()
}

/// Fold a byte-aligned bit list back into bytes, MSB-first.
pub fn bits_to_bytes(bits: &[bool]) -> Result<Vec<u8>> {
    if bits.len() % 8 != 0 {
        return Err(Error::Codec(format!(
            "{} bits do not fill whole bytes",
            bits.len()
        )));
    }
    Ok(bits.chunks_exact(8).map(fold_byte).collect())
}

fn fold_byte(chunk: &[bool]) -> u8 {
    chunk
        .iter()
        .enumerate()
        .fold(0u8, |acc, (i, &bit)| acc | (u8::from(bit) << (7 - i)))
}

/// `serde` adapter that sends `Vec<bool>` fields through [`pack_bits`].
pub mod packed_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bits: &[bool], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&super::pack_bits(bits))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<bool>, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        super::unpack_bits(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn bits(s: &str) -> Vec<bool> {
        s.chars().map(|c| c == '1').collect()
    }

    #[test]
    fn sentinel_marks_partial_byte() {
        assert_eq!(pack_bits(&bits("101")), vec![0b1011_0000]);
    }

    #[test]
    fn full_byte_gets_extra_sentinel_byte() {
        assert_eq!(pack_bits(&bits("11110000")), vec![0b1111_0000, 0x80]);
    }

    #[test]
    fn empty_list_is_just_the_sentinel() {
        assert_eq!(pack_bits(&[]), vec![0x80]);
        assert!(unpack_bits(&[0x80]).unwrap().is_empty());
    }

    #[test]
    fn roundtrip_odd_lengths() {
        for len in [1usize, 3, 7, 9, 13, 31, 100] {
            let input: Vec<bool> = (0..len).map(|i| i % 3 == 0).collect();
            assert_eq!(unpack_bits(&pack_bits(&input)).unwrap(), input, "len {len}");
        }
    }

    #[test]
    fn trailing_zero_bits_survive() {
        let input = bits("1000000000");
        assert_eq!(unpack_bits(&pack_bits(&input)).unwrap(), input);
    }

    #[test]
    fn missing_sentinel_is_rejected() {
        assert!(matches!(unpack_bits(&[0, 0]), Err(Error::Codec(_))));
        assert!(matches!(unpack_bits(&[]), Err(Error::Codec(_))));
    }

    #[test]
    fn byte_aligned_conversion() {
        let data = b"qkd";
        let b = bytes_to_bits(data);
        assert_eq!(b.len(), 24);
        assert_eq!(bits_to_bytes(&b).unwrap(), data);
        assert!(bits_to_bytes(&b[..5]).is_err());
    }

    #[test]
    fn serde_adapter_packs_bits() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Wrapper {
            #[serde(with = "packed_bits")]
            bits: Vec<bool>,
        }
        let w = Wrapper {
            bits: bits("1101"),
        };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"bits":[216]}"#);
        assert_eq!(serde_json::from_str::<Wrapper>(&json).unwrap(), w);
    }
}
