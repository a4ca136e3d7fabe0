//! Signing identity management.
//!
//! Each party signs every classical message with an Ed25519 key. The key is
//! usually fresh for one session; a long-lived identity can be kept on disk
//! as 32 raw secret bytes readable only by the owner.

use std::path::Path;

use ed25519_dalek::pkcs8::EncodePublicKey;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// An Ed25519 signing keypair for one party.
pub struct SigningIdentity {
    signing: SigningKey,
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("public", &hex::encode(self.public_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl SigningIdentity {
    /// Generate a new random identity.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild from the 32-byte Ed25519 seed.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let mut arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        let signing = SigningKey::from_bytes(&arr);
        arr.zeroize();
        Ok(Self { signing })
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// The 32-byte seed, as stored on disk.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }

    /// Public key as a PEM SubjectPublicKeyInfo document.
    pub fn public_key_pem(&self) -> Result<String, CryptoError> {
        self.verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))
    }

    /// Colon-separated SHA-256 fingerprint of the public key.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.public_bytes())
    }

    /// Write the seed to `path` (mode `0600` on Unix), creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> Result<(), CryptoError> {
        let dir = path.parent().ok_or_else(|| {
            CryptoError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "identity path has no parent directory",
            ))
        })?;
        std::fs::create_dir_all(dir)?;

        let mut bytes = self.secret_bytes();
        std::fs::write(path, bytes)?;
        bytes.zeroize();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Load an identity from a file holding exactly 32 secret bytes.
    ///
    /// On Unix, refuses files readable by anyone but the owner.
    pub fn load_from_file(path: &Path) -> Result<Self, CryptoError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(path)?.permissions().mode() & 0o777;
            if mode != 0o600 {
                return Err(CryptoError::IoError(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    format!("{} is accessible to other users (mode {mode:o})", path.display()),
                )));
            }
        }

        let mut bytes = std::fs::read(path)?;
        let result = Self::from_secret_bytes(&bytes);
        bytes.zeroize();
        result
    }

    /// Load from file, or generate a new identity and save it.
    pub fn load_or_generate(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            let identity = Self::generate();
            identity.save_to_file(path)?;
            tracing::info!(path = %path.display(), fingerprint = %identity.fingerprint(), "Generated signing identity");
            Ok(identity)
        }
    }
}

/// `aa:bb:...` form of the SHA-256 digest of a public key.
pub fn fingerprint_of(pubkey_bytes: &[u8; 32]) -> String {
    use sha2::{Digest, Sha256};
    Sha256::digest(pubkey_bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use ed25519_dalek::Verifier;
    use ed25519_dalek::pkcs8::DecodePublicKey;

    use super::*;

    #[test]
    fn secret_bytes_roundtrip() {
        let identity = SigningIdentity::generate();
        let restored = SigningIdentity::from_secret_bytes(&identity.secret_bytes()).unwrap();
        assert_eq!(restored.public_bytes(), identity.public_bytes());
    }

    #[test]
    fn from_secret_bytes_rejects_wrong_length() {
        match SigningIdentity::from_secret_bytes(&[0u8; 16]).unwrap_err() {
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16,
            } => {}
            err => panic!("wrong error: {err:?}"),
        }
    }

    #[test]
    fn signature_verifies_under_own_key_only() {
        let alice = SigningIdentity::generate();
        let mallory = SigningIdentity::generate();
        let sig = alice.sign(b"bases");
        assert!(alice.verifying_key().verify(b"bases", &sig).is_ok());
        assert!(alice.verifying_key().verify(b"bases!", &sig).is_err());
        assert!(mallory.verifying_key().verify(b"bases", &sig).is_err());
    }

    #[test]
    fn pem_parses_back_to_same_key() {
        let identity = SigningIdentity::generate();
        let pem = identity.public_key_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        let parsed = VerifyingKey::from_public_key_pem(&pem).unwrap();
        assert_eq!(parsed, identity.verifying_key());
    }

    #[test]
    fn fingerprint_is_colon_separated_sha256() {
        let fp = SigningIdentity::generate().fingerprint();
        assert_eq!(fp.len(), 95);
        assert!(fp.split(':').all(|s| s.len() == 2));
    }

    #[test]
    fn save_and_load_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("alice.key");
        let identity = SigningIdentity::load_or_generate(&path).unwrap();
        assert!(path.exists());
        let again = SigningIdentity::load_or_generate(&path).unwrap();
        assert_eq!(again.public_bytes(), identity.public_bytes());
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alice.key");
        std::fs::write(&path, [7u8; 20]).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        }
        assert!(SigningIdentity::load_from_file(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn load_rejects_world_readable_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alice.key");
        SigningIdentity::generate().save_to_file(&path).unwrap();
        assert_eq!(
            std::fs::metadata(&path).unwrap().permissions().mode() & 0o777,
            0o600
        );
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(SigningIdentity::load_from_file(&path).is_err());
    }

    #[test]
    fn debug_impl_redacts_secret() {
        let identity = SigningIdentity::generate();
        let shown = format!("{identity:?}");
        assert!(shown.contains("[REDACTED]"));
        assert!(!shown.contains(&hex::encode(identity.secret_bytes())));
    }
}
