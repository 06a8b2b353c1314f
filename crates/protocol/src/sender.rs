//! Outbound messaging with self-delivery.
//!
//! The endpoint never delivers to its own oracle, so the sender mirrors
//! every message addressed to us onto a bounded loopback channel. A full
//! loopback drops the message.

use crate::messages::ProtocolMessage;
use crate::taper::Taper;
use ocr_core::NetworkEndpoint;
use ocr_types::OracleId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Endpoint wrapper shared by every protocol task.
#[derive(Clone)]
pub struct MessageSender {
    id: OracleId,
    endpoint: Arc<dyn NetworkEndpoint<ProtocolMessage>>,
    loopback: mpsc::Sender<ProtocolMessage>,
    dropped: Arc<Taper>,
}

impl MessageSender {
    /// Wrap `endpoint` for oracle `id`, looping self-addressed messages into `loopback`.
    pub fn new(
        id: OracleId,
        endpoint: Arc<dyn NetworkEndpoint<ProtocolMessage>>,
        loopback: mpsc::Sender<ProtocolMessage>,
    ) -> Self {
        Self {
            id,
            endpoint,
            loopback,
            dropped: Arc::new(Taper::new()),
        }
    }

    /// Our oracle id
    pub fn id(&self) -> OracleId {
        self.id
    }

    /// Send to one oracle, possibly ourselves.
    pub fn send_to(&self, message: ProtocolMessage, to: OracleId) {
        if to == self.id {
            self.loop_back(message);
        } else {
            self.endpoint.send_to(message, to);
        }
    }

    /// Send to every oracle, ourselves included.
    pub fn broadcast(&self, message: ProtocolMessage) {
        self.endpoint.broadcast(message.clone());
        self.loop_back(message);
    }

    /// Send to every oracle except ourselves.
    pub fn broadcast_to_others(&self, message: ProtocolMessage) {
        self.endpoint.broadcast(message);
    }

    fn loop_back(&self, message: ProtocolMessage) {
        match self.loopback.try_send(message) {
            Ok(()) => self.dropped.reset(|dropped| {
                warn!(dropped, "Loopback recovered after dropping messages");
            }),
            Err(mpsc::error::TrySendError::Full(message)) => self.dropped.trigger(|dropped| {
                warn!(
                    kind = message.kind(),
                    dropped, "Loopback full, dropping message"
                );
            }),
            // Receiver gone: the oracle is shutting down.
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

impl std::fmt::Debug for MessageSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSender")
            .field("id", &self.id)
            .field("dropped", &self.dropped.count())
            .finish_non_exhaustive()
    }
}
