//! Signed message envelope.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::identity::SigningIdentity;

/// A payload and its detached Ed25519 signature.
///
/// Both fields are hex strings in the JSON encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl SignedEnvelope {
    /// Sign `payload` with `identity`.
    pub fn seal(identity: &SigningIdentity, payload: Vec<u8>) -> Self {
        let signature = identity.sign(&payload).to_bytes().to_vec();
        Self { payload, signature }
    }

    /// Verify against `key` and hand back the payload.
    pub fn open(self, key: &VerifyingKey) -> Result<Vec<u8>, CryptoError> {
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| CryptoError::InvalidSignature)?;
        key.verify(&self.payload, &signature)
            .map_err(|_| CryptoError::InvalidSignature)?;
        Ok(self.payload)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        serde_json::to_vec(self).map_err(|e| CryptoError::SerializationError(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        serde_json::from_slice(bytes).map_err(|e| CryptoError::SerializationError(e.to_string()))
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
