//! Transferable message port pairs.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::{Message, MessagingError};

/// A bidirectional channel made of two entangled ports.
///
/// A message posted on `port1` is received on `port2` and vice versa.
#[derive(Debug)]
pub struct MessageChannel {
    /// First end
    pub port1: MessagePort,
    /// Second end
    pub port2: MessagePort,
}

impl MessageChannel {
    /// Create a new entangled port pair
    pub fn new() -> Self {
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        Self {
            port1: MessagePort::new(tx2, rx1),
            port2: MessagePort::new(tx1, rx2),
        }
    }
}

impl Default for MessageChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// One end of a [`MessageChannel`]
#[derive(Debug)]
pub struct MessagePort {
    id: u64,
    peer: mpsc::UnboundedSender<Message>,
    inbox: mpsc::UnboundedReceiver<Message>,
}

impl MessagePort {
    fn new(peer: mpsc::UnboundedSender<Message>, inbox: mpsc::UnboundedReceiver<Message>) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            peer,
            inbox,
        }
    }

    /// Unique port id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Post a message to the entangled port
    pub fn post_message(&self, message: Message) -> Result<(), MessagingError> {
        self.peer
            .send(message)
            .map_err(|e| MessagingError::PortClosed { action: e.0.action })
    }

    /// A cloneable handle that can only post to the entangled port
    pub fn sender(&self) -> PortSender {
        PortSender {
            peer: self.peer.clone(),
        }
    }

    /// Receive the next message; `None` once the other end is gone
    pub async fn recv(&mut self) -> Option<Message> {
        self.inbox.recv().await
    }

    /// Close this end, releasing both directions
    pub fn close(mut self) {
        self.inbox.close();
    }
}

/// Posting half of a [`MessagePort`], used to reply after the event that
/// carried the port has been dropped
#[derive(Debug, Clone)]
pub struct PortSender {
    peer: mpsc::UnboundedSender<Message>,
}

impl PortSender {
    /// Post a message to the entangled port
    pub fn post_message(&self, message: Message) -> Result<(), MessagingError> {
        self.peer
            .send(message)
            .map_err(|e| MessagingError::PortClosed { action: e.0.action })
    }
}
