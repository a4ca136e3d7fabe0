//! Session bootstrap over TCP: key rendezvous, classical and quantum links.

use quart_crypto::{KeyDirectory, SigningIdentity};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::channel::{AuthenticatedChannel, await_peer_key};
use crate::config::ChannelConfig;
use crate::error::SessionError;
use crate::quantum::{ChannelModel, SimulatedQuantumLink};
use crate::transport::{FramedStream, Transport, accept, dial};

/// How this party reaches the quantum channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuantumEndpoint {
    /// Sender: connect to the receiver's quantum listener.
    Dial(String),
    /// Receiver: accept the sender's qubit stream here.
    Listen(String),
}

/// Addresses and names for one party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub name: String,
    pub peer: String,
    /// Local address for the peer's classical connection.
    pub listen: String,
    pub peer_addr: String,
    pub quantum: QuantumEndpoint,
}

/// Both links of a connected party.
#[derive(Debug)]
pub struct Connected {
    pub channel: AuthenticatedChannel<TcpStream>,
    pub quantum: SimulatedQuantumLink<TcpStream>,
}

/// Publish our key, connect both ways to the peer, wait for its key, and
/// open the quantum link.
pub async fn connect(
    endpoints: &Endpoints,
    identity: SigningIdentity,
    keys: &KeyDirectory,
    config: &ChannelConfig,
    model: ChannelModel,
    cancel: CancellationToken,
) -> Result<Connected, SessionError> {
    let listener = bind(&endpoints.listen).await?;
    let quantum_listener = match &endpoints.quantum {
        QuantumEndpoint::Listen(addr) => Some(bind(addr).await?),
        QuantumEndpoint::Dial(_) => None,
    };

    keys.publish(&endpoints.name, &identity)?;
    info!(name = %endpoints.name, fingerprint = %identity.fingerprint(), "Published signing key");

    let transport = Transport::establish(
        &listener,
        &endpoints.peer_addr,
        &config.reconnect,
        config.receive_timeout,
        config.max_frame_bytes,
        &cancel,
    )
    .await?;
    let peer_key = await_peer_key(
        keys,
        &endpoints.peer,
        config.key_poll_interval,
        config.key_wait_timeout,
        &cancel,
    )
    .await?;

    let stream = match (&endpoints.quantum, quantum_listener) {
        (QuantumEndpoint::Listen(_), Some(listener)) => {
            accept(&listener, config.receive_timeout, &cancel).await?
        }
        (QuantumEndpoint::Dial(addr), _) => dial(addr, &config.reconnect, &cancel).await?,
        (QuantumEndpoint::Listen(addr), None) => {
            return Err(SessionError::Transport(format!("no quantum listener on {addr}")));
        }
    };
    info!("Quantum channel established");

    let quantum = SimulatedQuantumLink::new(
        FramedStream::new(stream, config.max_frame_bytes),
        model,
        StdRng::from_entropy(),
        config.receive_timeout,
        cancel.clone(),
    );
    let channel = AuthenticatedChannel::new(
        transport,
        identity,
        peer_key,
        config.receive_timeout,
        cancel,
    );
    Ok(Connected { channel, quantum })
}

async fn bind(addr: &str) -> Result<TcpListener, SessionError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| SessionError::transport(&format!("cannot listen on {addr}"), e))
}
