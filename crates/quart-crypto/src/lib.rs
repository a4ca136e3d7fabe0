//! Quart Signing Library
//!
//! Authenticates the classical channel between the two parties of a key
//! exchange. Messages are not encrypted, only signed.
//!
//! ## Crypto primitives
//!
//! - **Identity**: Ed25519 signing keypair per party, fresh per session or
//!   loaded from a `0600` file
//! - **Envelope**: `{payload, signature}` record, JSON encoded
//! - **Directory**: public keys published as PEM SubjectPublicKeyInfo files
//!   named `<party>_pkey.pem`

pub mod directory;
pub mod envelope;
pub mod error;
pub mod identity;

pub use directory::KeyDirectory;
pub use ed25519_dalek::VerifyingKey;
pub use envelope::SignedEnvelope;
pub use error::CryptoError;
pub use identity::{SigningIdentity, fingerprint_of};
