//! File-backed public-key directory.
//!
//! Each party publishes `<party>_pkey.pem` into a shared directory and reads
//! its peer's file from there. Files are written to a hidden temporary name
//! and renamed into place, so a visible file is always complete.

use std::path::{Path, PathBuf};

use ed25519_dalek::VerifyingKey;
use ed25519_dalek::pkcs8::DecodePublicKey;

use crate::error::CryptoError;
use crate::identity::SigningIdentity;

#[derive(Debug, Clone)]
pub struct KeyDirectory {
    root: PathBuf,
}

impl KeyDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<party>_pkey.pem`.
    pub fn path_for(&self, party: &str) -> PathBuf {
        self.root.join(format!("{party}_pkey.pem"))
    }

    /// Publish `identity`'s public key under `party`, replacing any older file.
    pub fn publish(&self, party: &str, identity: &SigningIdentity) -> Result<PathBuf, CryptoError> {
        std::fs::create_dir_all(&self.root)?;
        let pem = identity.public_key_pem()?;
        let target = self.path_for(party);
        let staging = self.root.join(format!(".{party}_pkey.pem.tmp"));
        std::fs::write(&staging, pem)?;
        std::fs::rename(&staging, &target)?;
        tracing::debug!(party, path = %target.display(), "Published public key");
        Ok(target)
    }

    /// The key published under `party`, or `None` if nothing is there yet.
    pub fn lookup(&self, party: &str) -> Result<Option<VerifyingKey>, CryptoError> {
        let path = self.path_for(party);
        let pem = match std::fs::read_to_string(&path) {
            Ok(pem) => pem,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        VerifyingKey::from_public_key_pem(&pem)
            .map(Some)
            .map_err(|e| CryptoError::KeyEncoding(format!("{}: {e}", path.display())))
    }
}
