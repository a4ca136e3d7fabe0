//! Quart Session Library
//!
//! Runs a BB84 key exchange between two processes:
//! - Framed TCP transport with acknowledgements and reconnect backoff
//! - Ed25519-authenticated classical channel
//! - Simulated quantum link with noise and an optional eavesdropper
//! - Sender and receiver orchestrators

pub mod channel;
pub mod config;
pub mod connect;
pub mod error;
pub mod quantum;
pub mod session;
pub mod transport;

pub use channel::{AuthenticatedChannel, await_peer_key};
pub use config::{ChannelConfig, ReconnectPolicy};
pub use connect::{Connected, Endpoints, QuantumEndpoint, connect};
pub use error::SessionError;
pub use quantum::{ChannelModel, QuantumLink, Qubit, SimulatedQuantumLink};
pub use session::{
    Exchange, Payload, Phase, ReceiverOptions, SessionOutcome, output_path, run_receiver,
    run_sender,
};
pub use transport::{FramedStream, Transport};
