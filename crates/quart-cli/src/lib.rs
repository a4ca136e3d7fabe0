//! Quart CLI
//!
//! `quart send` and `quart receive` run the two ends of a BB84 exchange over
//! TCP and share a file (or just a key) under a one-time pad.

pub mod args;
pub mod run;
