//! In-process [`PeerLink`] pair for exercising two-party phases without a network.

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::protocol::{Message, PeerLink};

/// One end of an in-memory link. Messages are delivered in order.
#[derive(Debug)]
pub struct MemoryLink {
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
}

/// Create two connected link ends.
pub fn memory_pair() -> (MemoryLink, MemoryLink) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        MemoryLink { tx: a_tx, rx: a_rx },
        MemoryLink { tx: b_tx, rx: b_rx },
    )
}

impl PeerLink for MemoryLink {
    type Error = Error;

    async fn send(&mut self, message: Message) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::Link("peer end dropped".into()))
    }

    async fn recv(&mut self) -> Result<Message> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| Error::Link("peer end dropped".into()))
    }
}
