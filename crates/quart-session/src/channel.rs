//! Authenticated classical channel.
//!
//! Every [`Message`] is JSON encoded, signed with the local identity and sent
//! as a [`SignedEnvelope`] frame. Inbound frames are verified against the
//! peer's published key before they are decoded.

use std::future::Future;
use std::time::Duration;

use quart_core::{Message, PeerLink};
use quart_crypto::{KeyDirectory, SignedEnvelope, SigningIdentity, VerifyingKey, fingerprint_of};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::error::SessionError;
use crate::transport::Transport;

/// Run `fut` under a deadline, giving up early if `cancel` fires.
pub(crate) async fn guarded<T>(
    cancel: &CancellationToken,
    limit: Duration,
    operation: &'static str,
    fut: impl Future<Output = Result<T, SessionError>>,
) -> Result<T, SessionError> {
    tokio::select! {
        () = cancel.cancelled() => Err(SessionError::Cancelled),
        outcome = tokio::time::timeout(limit, fut) => outcome.map_err(|_| SessionError::Timeout {
            operation,
            after: limit,
        })?,
    }
}

pub struct AuthenticatedChannel<S> {
    transport: Transport<S>,
    identity: SigningIdentity,
    peer_key: VerifyingKey,
    receive_timeout: Duration,
    cancel: CancellationToken,
}

impl<S> std::fmt::Debug for AuthenticatedChannel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedChannel")
            .field("identity", &self.identity)
            .field("peer", &fingerprint_of(self.peer_key.as_bytes()))
            .field("receive_timeout", &self.receive_timeout)
            .finish_non_exhaustive()
    }
}

impl<S> AuthenticatedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub const fn new(
        transport: Transport<S>,
        identity: SigningIdentity,
        peer_key: VerifyingKey,
        receive_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            identity,
            peer_key,
            receive_timeout,
            cancel,
        }
    }

    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn open(&self, frame: &[u8]) -> Result<Message, SessionError> {
        let envelope = SignedEnvelope::from_bytes(frame)
            .map_err(|e| SessionError::Authentication(format!("corrupted envelope: {e}")))?;
        let payload = envelope
            .open(&self.peer_key)
            .map_err(|e| SessionError::Authentication(e.to_string()))?;
        serde_json::from_slice(&payload)
            .map_err(|e| SessionError::desync("protocol message", format!("undecodable payload ({e})")))
    }
}

impl<S> PeerLink for AuthenticatedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    type Error = SessionError;

    async fn send(&mut self, message: Message) -> Result<(), SessionError> {
        trace!(kind = message.kind(), "send");
        let payload = serde_json::to_vec(&message).map_err(quart_core::Error::from)?;
        let frame = SignedEnvelope::seal(&self.identity, payload).to_bytes()?;
        guarded(
            &self.cancel,
            self.receive_timeout,
            "peer acknowledgement",
            self.transport.send(&frame),
        )
        .await
    }

    async fn recv(&mut self) -> Result<Message, SessionError> {
        let frame = guarded(
            &self.cancel,
            self.receive_timeout,
            "peer message",
            self.transport.recv(),
        )
        .await?;
        let message = self.open(&frame)?;
        trace!(kind = message.kind(), "recv");
        Ok(message)
    }

    fn checkpoint(&self) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            Err(SessionError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Poll `directory` until `party` has published a key.
pub async fn await_peer_key(
    directory: &KeyDirectory,
    party: &str,
    poll_interval: Duration,
    wait_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<VerifyingKey, SessionError> {
    guarded(
        cancel,
        wait_timeout,
        "peer public key",
        poll_for_key(directory, party, poll_interval),
    )
    .await
}

async fn poll_for_key(
    directory: &KeyDirectory,
    party: &str,
    poll_interval: Duration,
) -> Result<VerifyingKey, SessionError> {
    loop {
        if let Some(key) = directory.lookup(party)? {
            info!(party, fingerprint = %fingerprint_of(key.as_bytes()), "Found peer key");
            return Ok(key);
        }
        debug!(party, "Peer key not published yet");
        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use quart_core::protocol::Half;
    use tokio::io::{DuplexStream, duplex};

    use super::*;

    fn pair_with(
        alice_id: SigningIdentity,
        bob_id: SigningIdentity,
        alice_sees_bob_as: VerifyingKey,
        timeout: Duration,
    ) -> (
        AuthenticatedChannel<DuplexStream>,
        AuthenticatedChannel<DuplexStream>,
    ) {
        let (a_out, b_in) = duplex(4096);
        let (b_out, a_in) = duplex(4096);
        let alice_key = alice_id.verifying_key();
        let alice = AuthenticatedChannel::new(
            Transport::new(a_out, a_in, 1 << 20),
            alice_id,
            alice_sees_bob_as,
            timeout,
            CancellationToken::new(),
        );
        let bob = AuthenticatedChannel::new(
            Transport::new(b_out, b_in, 1 << 20),
            bob_id,
            alice_key,
            timeout,
            CancellationToken::new(),
        );
        (alice, bob)
    }

    fn honest_pair(timeout: Duration) -> (
        AuthenticatedChannel<DuplexStream>,
        AuthenticatedChannel<DuplexStream>,
    ) {
        let alice = SigningIdentity::generate();
        let bob = SigningIdentity::generate();
        let bob_key = bob.verifying_key();
        pair_with(alice, bob, bob_key, timeout)
    }

    #[tokio::test]
    async fn signed_messages_arrive_intact() {
        let (mut alice, mut bob) = honest_pair(Duration::from_secs(5));
        let (sent, got) = tokio::join!(alice.send(Message::Descend(Half::Second)), bob.recv());
        sent.unwrap();
        assert_eq!(got.unwrap(), Message::Descend(Half::Second));

        let (sent, got) = tokio::join!(bob.send(Message::Located), alice.recv());
        sent.unwrap();
        assert_eq!(got.unwrap(), Message::Located);
    }

    #[tokio::test]
    async fn message_from_wrong_key_fails_authentication() {
        let alice = SigningIdentity::generate();
        let bob = SigningIdentity::generate();
        let impostor = SigningIdentity::generate().verifying_key();
        let (mut alice, mut bob) = pair_with(alice, bob, impostor, Duration::from_secs(5));

        let (sent, got) = tokio::join!(bob.send(Message::RoundDone), alice.recv());
        sent.unwrap();
        assert!(matches!(got, Err(SessionError::Authentication(_))));
    }

    #[tokio::test]
    async fn garbage_frame_fails_authentication() {
        let (a_out, b_in) = duplex(4096);
        let (_b_out, a_in) = duplex(4096);
        let mut raw = Transport::new(a_out, a_in, 1 << 20);
        let (_unused_out, unused_in) = duplex(16);
        let mut bob = AuthenticatedChannel::new(
            Transport::new(unused_in, b_in, 1 << 20),
            SigningIdentity::generate(),
            SigningIdentity::generate().verifying_key(),
            Duration::from_secs(5),
            CancellationToken::new(),
        );
        let (sent, got) = tokio::join!(raw.send(b"definitely not json"), bob.recv());
        sent.unwrap();
        assert!(matches!(got, Err(SessionError::Authentication(_))));
    }

    #[tokio::test]
    async fn signed_non_message_is_a_desync() {
        let alice_id = SigningIdentity::generate();
        let frame = SignedEnvelope::seal(&alice_id, b"{\"type\":\"bogus\"}".to_vec())
            .to_bytes()
            .unwrap();
        let alice_key = alice_id.verifying_key();

        let (a_out, b_in) = duplex(4096);
        let (_b_out, a_in) = duplex(4096);
        let mut raw = Transport::new(a_out, a_in, 1 << 20);
        let (_unused_out, unused_in) = duplex(16);
        let mut bob = AuthenticatedChannel::new(
            Transport::new(unused_in, b_in, 1 << 20),
            SigningIdentity::generate(),
            alice_key,
            Duration::from_secs(5),
            CancellationToken::new(),
        );
        let (sent, got) = tokio::join!(raw.send(&frame), bob.recv());
        sent.unwrap();
        assert!(matches!(got, Err(SessionError::ProtocolDesync { .. })));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (mut alice, _bob) = honest_pair(Duration::from_millis(50));
        assert!(matches!(
            alice.recv().await,
            Err(SessionError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn cancellation_interrupts_recv_and_checkpoint() {
        let (mut alice, _bob) = honest_pair(Duration::from_secs(5));
        alice.checkpoint().unwrap();
        alice.cancel_token().cancel();
        assert!(matches!(alice.checkpoint(), Err(SessionError::Cancelled)));
        assert!(matches!(alice.recv().await, Err(SessionError::Cancelled)));
    }

    #[tokio::test]
    async fn peer_key_is_found_once_published() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyDirectory::new(dir.path());
        let bob = SigningIdentity::generate();
        let expected = bob.verifying_key();

        let publish = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            keys.publish("bob", &bob).unwrap();
        };
        let cancel = CancellationToken::new();
        let wait = await_peer_key(
            &keys,
            "bob",
            Duration::from_millis(5),
            Duration::from_secs(5),
            &cancel,
        );
        let ((), found) = tokio::join!(publish, wait);
        assert_eq!(found.unwrap(), expected);
    }

    #[tokio::test]
    async fn missing_peer_key_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyDirectory::new(dir.path());
        let err = await_peer_key(
            &keys,
            "nobody",
            Duration::from_millis(10),
            Duration::from_millis(60),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SessionError::Timeout { .. }));
    }
}
