//! Quart Core Library
//!
//! Transport-independent half of the BB84 key exchange:
//! - Bit codec and basis types
//! - Sifting, error estimation and the min-entropy security gate
//! - Cascade information reconciliation
//! - Toeplitz privacy amplification and the one-time pad
//! - Wire messages and the `PeerLink` seam
//! - Configuration resolution and tracing setup

pub mod amplification;
pub mod basis;
pub mod bits;
pub mod cascade;
pub mod config;
pub mod error;
pub mod estimation;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod otp;
pub mod protocol;
pub mod sifting;
pub mod tracing_init;

pub use basis::Basis;
pub use config::Config;
pub use error::{Error, Result};
pub use otp::SharedKey;
pub use protocol::{Message, PeerLink, SessionMetadata};
