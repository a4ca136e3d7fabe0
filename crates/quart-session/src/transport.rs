//! Length-prefixed, acknowledged framing over byte streams.
//!
//! A frame is an 8-byte big-endian body length, then the body. The reading
//! side answers `ACK` after the length and again after the body; the writer
//! waits for both before returning, so a completed send means the peer holds
//! the whole frame.
//!
//! Each party owns two TCP connections: one it dialed (outbound, write
//! frames) and one it accepted (inbound, read frames). Frames and ACKs of
//! the two directions never share a socket.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ReconnectPolicy;
use crate::error::SessionError;

/// Acknowledgement sent by the reading side.
pub const ACK: &[u8; 3] = b"ACK";

/// One direction of framed traffic over a stream.
#[derive(Debug)]
pub struct FramedStream<S> {
    stream: S,
    max_frame_bytes: u64,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub const fn new(stream: S, max_frame_bytes: u64) -> Self {
        Self {
            stream,
            max_frame_bytes,
        }
    }

    /// Write one frame and wait for both acknowledgements.
    pub async fn send_frame(&mut self, body: &[u8]) -> Result<(), SessionError> {
        let len = body.len() as u64;
        if len > self.max_frame_bytes {
            return Err(SessionError::Transport(format!(
                "refusing to send {len}-byte frame (limit {})",
                self.max_frame_bytes
            )));
        }
        self.write(&len.to_be_bytes()).await?;
        self.expect_ack().await?;
        self.write(body).await?;
        self.expect_ack().await
    }

    /// Read one frame, acknowledging its length and its body.
    pub async fn recv_frame(&mut self) -> Result<Vec<u8>, SessionError> {
        let mut header = [0u8; 8];
        self.read(&mut header).await?;
        let len = u64::from_be_bytes(header);
        if len > self.max_frame_bytes {
            return Err(SessionError::Transport(format!(
                "peer announced {len}-byte frame (limit {})",
                self.max_frame_bytes
            )));
        }
        self.write(ACK).await?;
        let mut body = vec![0u8; len as usize];
        self.read(&mut body).await?;
        self.write(ACK).await?;
        Ok(body)
    }

    async fn expect_ack(&mut self) -> Result<(), SessionError> {
        let mut ack = [0u8; 3];
        self.read(&mut ack).await?;
        if &ack != ACK {
            return Err(SessionError::Transport(format!(
                "bad acknowledgement {ack:?}"
            )));
        }
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(|e| SessionError::transport("write failed", e))?;
        self.stream
            .flush()
            .await
            .map_err(|e| SessionError::transport("flush failed", e))
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<(), SessionError> {
        self.stream
            .read_exact(buf)
            .await
            .map(|_| ())
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => {
                    SessionError::Transport("connection closed by peer".into())
                }
                _ => SessionError::transport("read failed", e),
            })
    }
}

/// A party's pair of framed connections to its peer.
#[derive(Debug)]
pub struct Transport<S> {
    outbound: FramedStream<S>,
    inbound: FramedStream<S>,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub const fn new(outbound: S, inbound: S, max_frame_bytes: u64) -> Self {
        Self {
            outbound: FramedStream::new(outbound, max_frame_bytes),
            inbound: FramedStream::new(inbound, max_frame_bytes),
        }
    }

    pub async fn send(&mut self, body: &[u8]) -> Result<(), SessionError> {
        self.outbound.send_frame(body).await
    }

    pub async fn recv(&mut self) -> Result<Vec<u8>, SessionError> {
        self.inbound.recv_frame().await
    }
}

impl Transport<TcpStream> {
    /// Dial `peer_addr` and accept the peer's connection on `listener`
    /// concurrently.
    pub async fn establish(
        listener: &TcpListener,
        peer_addr: &str,
        policy: &ReconnectPolicy,
        accept_timeout: Duration,
        max_frame_bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<Self, SessionError> {
        let (outbound, inbound) = tokio::try_join!(
            dial(peer_addr, policy, cancel),
            accept(listener, accept_timeout, cancel),
        )?;
        info!(peer = peer_addr, "Classical channel established");
        Ok(Self::new(outbound, inbound, max_frame_bytes))
    }
}

/// Connect to `addr`, retrying refused connections with backoff.
pub async fn dial(
    addr: &str,
    policy: &ReconnectPolicy,
    cancel: &CancellationToken,
) -> Result<TcpStream, SessionError> {
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream
                    .set_nodelay(true)
                    .map_err(|e| SessionError::transport("set_nodelay", e))?;
                debug!(addr, attempt, "Connected");
                return Ok(stream);
            }
            Err(e) => {
                if !policy.should_retry(attempt) {
                    error!(error = %e, addr, attempt, "Max connect attempts reached");
                    return Err(SessionError::transport(
                        &format!("could not connect to {addr} after {attempt} retries"),
                        e,
                    ));
                }

                let delay = policy.delay_for_attempt(attempt);
                warn!(error = %e, addr, attempt, delay_ms = delay.as_millis(), "Retrying connect");

                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancel.cancelled() => return Err(SessionError::Cancelled),
                }

                attempt = attempt.saturating_add(1);
            }
        }
    }
}

/// Accept one connection on `listener`.
pub async fn accept(
    listener: &TcpListener,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<TcpStream, SessionError> {
    tokio::select! {
        accepted = tokio::time::timeout(timeout, listener.accept()) => {
            let (stream, from) = accepted
                .map_err(|_| SessionError::Timeout { operation: "inbound connection", after: timeout })?
                .map_err(|e| SessionError::transport("accept failed", e))?;
            stream
                .set_nodelay(true)
                .map_err(|e| SessionError::transport("set_nodelay", e))?;
            debug!(%from, "Accepted connection");
            Ok(stream)
        }
        () = cancel.cancelled() => Err(SessionError::Cancelled),
    }
}
