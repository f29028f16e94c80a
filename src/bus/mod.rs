//! Message Bus Module
//!
//! Transport adapters publish normalized inbound messages; the engine feeds
//! them to the queue. Outbound side effects flow back the same way.
//!
//! ```text
//! ┌───────────┐ inbound  ┌────────────┐        ┌────────┐
//! │ Transport │────────> │ MessageBus │──────> │ Engine │
//! │  adapter  │ <─────── │            │ <───── │        │
//! └───────────┘ outbound └────────────┘        └────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use murmur::bus::{MessageBus, InboundMessage};
//!
//! # tokio_test::block_on(async {
//! let bus = MessageBus::new();
//! bus.publish_inbound(InboundMessage::private("alice", "hi")).await.unwrap();
//! let received = bus.consume_inbound().await.unwrap();
//! assert_eq!(received.text, "hi");
//! # });
//! ```

pub mod message;

pub use message::{
    ConversationId, ConversationKind, InboundMessage, OutboundKind, OutboundMessage, ReplyRef,
    UserId,
};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::error::{MurmurError, Result};

/// Default buffer size for message channels
const DEFAULT_BUFFER_SIZE: usize = 100;

/// Two MPSC channels: inbound (transport to engine) and outbound (engine to
/// transport).
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Arc<Mutex<mpsc::Receiver<InboundMessage>>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Arc<Mutex<mpsc::Receiver<OutboundMessage>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer_size);
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer_size);

        Self {
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
        }
    }

    /// Publishes an inbound message to the bus.
    ///
    /// # Errors
    /// Returns `MurmurError::BusClosed` if the receiver has been dropped.
    pub async fn publish_inbound(&self, msg: InboundMessage) -> Result<()> {
        self.inbound_tx
            .send(msg)
            .await
            .map_err(|_| MurmurError::BusClosed)
    }

    /// Next inbound message, or `None` once every sender is gone.
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        self.inbound_rx.lock().await.recv().await
    }

    pub async fn publish_outbound(&self, msg: OutboundMessage) -> Result<()> {
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|_| MurmurError::BusClosed)
    }

    pub async fn consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound_rx.lock().await.recv().await
    }

    /// Cloneable sender for transport adapters.
    pub fn inbound_sender(&self) -> mpsc::Sender<InboundMessage> {
        self.inbound_tx.clone()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Outbound side effects
// ============================================================================

/// Outbound side effects of a run. Fire-and-forget from the engine's view:
/// callers log failures and carry on.
#[async_trait]
pub trait OutboundSink: Send + Sync {
    async fn send_response(
        &self,
        id: &ConversationId,
        texts: Vec<String>,
        sticker: Option<String>,
    ) -> Result<()>;

    async fn send_refusal(&self, id: &ConversationId, text: &str) -> Result<()>;

    /// "Still busy" / "resting" acknowledgment.
    async fn send_busy(&self, id: &ConversationId, text: &str) -> Result<()>;
}

/// [`OutboundSink`] that publishes onto the bus's outbound channel.
pub struct BusSink {
    bus: Arc<MessageBus>,
}

impl BusSink {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl OutboundSink for BusSink {
    async fn send_response(
        &self,
        id: &ConversationId,
        texts: Vec<String>,
        sticker: Option<String>,
    ) -> Result<()> {
        self.bus
            .publish_outbound(OutboundMessage {
                conversation_id: id.clone(),
                kind: OutboundKind::Response,
                texts,
                sticker,
            })
            .await
    }

    async fn send_refusal(&self, id: &ConversationId, text: &str) -> Result<()> {
        self.bus
            .publish_outbound(OutboundMessage::new(id, OutboundKind::Refusal, text))
            .await
    }

    async fn send_busy(&self, id: &ConversationId, text: &str) -> Result<()> {
        self.bus
            .publish_outbound(OutboundMessage::new(id, OutboundKind::Busy, text))
            .await
    }
}
