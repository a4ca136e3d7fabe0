//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "quart")]
#[command(version, about = "Share files over a BB84 quantum key exchange", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by both roles. Unset values fall back to role defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// This party's name; also names the published key file
    #[arg(long, global = true)]
    pub name: Option<String>,

    /// Name the peer publishes its key under
    #[arg(long, global = true)]
    pub peer: Option<String>,

    /// Address to accept the peer's classical connection on
    #[arg(long, global = true)]
    pub listen: Option<String>,

    /// Peer's classical listen address
    #[arg(long, global = true)]
    pub peer_addr: Option<String>,

    /// Shared directory for `<name>_pkey.pem` files
    #[arg(long, global = true, env = "QUART_KEYS_DIR")]
    pub keys_dir: Option<PathBuf>,

    /// Keep the signing key in this file instead of generating one per session
    #[arg(long, global = true)]
    pub identity: Option<PathBuf>,

    /// Keep the signing key under the user config directory
    #[arg(long, global = true, conflicts_with = "identity")]
    pub persistent_identity: bool,

    /// Security parameter in (0, 1]
    #[arg(long, global = true)]
    pub security: Option<f64>,

    /// Raw qubit over-provisioning factor
    #[arg(long, global = true)]
    pub correctness: Option<f64>,

    /// Receive timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Log level for Quart crates (overridden by `RUST_LOG`)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Prepare qubits and send an encrypted payload (the "alice" side).
    Send(SendArgs),
    /// Measure qubits and decrypt the payload (the "bob" side).
    Receive(ReceiveArgs),
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("payload").required(true).args(["file", "text", "bits"])))]
pub struct SendArgs {
    /// File to send
    pub file: Option<PathBuf>,

    /// Send this text instead of a file
    #[arg(long)]
    pub text: Option<String>,

    /// Only agree on a key of this many bits
    #[arg(long)]
    pub bits: Option<usize>,

    /// Receiver's quantum channel address
    #[arg(long, default_value = "127.0.0.1:7702")]
    pub quantum_addr: String,

    /// Probability that a qubit is flipped in transit
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Simulate an intercept-resend eavesdropper on the quantum channel
    #[arg(long)]
    pub eavesdrop: bool,
}

#[derive(Args, Debug)]
pub struct ReceiveArgs {
    /// Address to accept the sender's qubit stream on
    #[arg(long, default_value = "127.0.0.1:7702")]
    pub quantum_listen: String,

    /// Directory for received files
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,
}

/// Defaults that differ between the two roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleDefaults {
    pub name: &'static str,
    pub peer: &'static str,
    pub listen: &'static str,
    pub peer_addr: &'static str,
}

pub const SENDER_DEFAULTS: RoleDefaults = RoleDefaults {
    name: "alice",
    peer: "bob",
    listen: "127.0.0.1:7700",
    peer_addr: "127.0.0.1:7701",
};

pub const RECEIVER_DEFAULTS: RoleDefaults = RoleDefaults {
    name: "bob",
    peer: "alice",
    listen: "127.0.0.1:7701",
    peer_addr: "127.0.0.1:7700",
};
