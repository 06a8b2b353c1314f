//! In-process transports.

use ocr_core::NetworkEndpoint;
use ocr_types::OracleId;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// A message handed to a [`RecordingEndpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound<M> {
    /// Point-to-point
    To(OracleId, M),
    /// Broadcast
    Broadcast(M),
}

/// Endpoint that records outbound messages and delivers nothing.
#[derive(Debug)]
pub struct RecordingEndpoint<M> {
    sent: Mutex<Vec<Outbound<M>>>,
}

impl<M> Default for RecordingEndpoint<M> {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl<M> RecordingEndpoint<M> {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything recorded so far.
    pub fn take(&self) -> Vec<Outbound<M>> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Number of recorded messages
    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl<M: Send + 'static> NetworkEndpoint<M> for RecordingEndpoint<M> {
    fn send_to(&self, message: M, to: OracleId) {
        self.sent.lock().push(Outbound::To(to, message));
    }

    fn broadcast(&self, message: M) {
        self.sent.lock().push(Outbound::Broadcast(message));
    }
}

/// Fully connected in-memory network of `n` oracles.
///
/// Delivery is a `try_send` into the recipient's bounded inbox; a full inbox
/// drops the message like a congested link would. An offline oracle neither
/// sends nor receives.
#[derive(Debug)]
pub struct MemoryNetwork<M> {
    inboxes: RwLock<Vec<mpsc::Sender<(M, OracleId)>>>,
    online: Vec<AtomicBool>,
    capacity: usize,
    dropped: AtomicU64,
}

impl<M: Clone + Send + 'static> MemoryNetwork<M> {
    /// Create a network and the inbound receivers of every oracle, in index order.
    pub fn new(n: usize, capacity: usize) -> (Arc<Self>, Vec<mpsc::Receiver<(M, OracleId)>>) {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..n).map(|_| mpsc::channel(capacity)).unzip();
        let network = Arc::new(Self {
            inboxes: RwLock::new(senders),
            online: (0..n).map(|_| AtomicBool::new(true)).collect(),
            capacity,
            dropped: AtomicU64::new(0),
        });
        (network, receivers)
    }

    /// Endpoint for oracle `id`.
    pub fn endpoint(self: &Arc<Self>, id: OracleId) -> MemoryEndpoint<M> {
        MemoryEndpoint {
            network: Arc::clone(self),
            id,
        }
    }

    /// Committee size
    pub fn n(&self) -> usize {
        self.online.len()
    }

    /// Take oracle `id` offline or bring it back.
    pub fn set_online(&self, id: OracleId, online: bool) {
        self.online[id as usize].store(online, Ordering::SeqCst);
    }

    /// Give oracle `id` a fresh inbox, as after a process restart.
    pub fn reconnect(&self, id: OracleId) -> mpsc::Receiver<(M, OracleId)> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.inboxes.write()[id as usize] = tx;
        rx
    }

    /// Messages dropped because an inbox was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn is_online(&self, id: OracleId) -> bool {
        self.online
            .get(id as usize)
            .map(|online| online.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn deliver(&self, from: OracleId, to: OracleId, message: M) {
        if from == to || !self.is_online(from) || !self.is_online(to) {
            return;
        }
        let inboxes = self.inboxes.read();
        let Some(inbox) = inboxes.get(to as usize) else {
            return;
        };
        if inbox.try_send((message, from)).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(from, to, "Dropped message");
        }
    }
}

/// One oracle's view of a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryEndpoint<M> {
    network: Arc<MemoryNetwork<M>>,
    id: OracleId,
}

impl<M: Clone + Send + Sync + 'static> NetworkEndpoint<M> for MemoryEndpoint<M> {
    fn send_to(&self, message: M, to: OracleId) {
        self.network.deliver(self.id, to, message);
    }

    fn broadcast(&self, message: M) {
        for to in 0..self.network.n() as OracleId {
            if to != self.id {
                self.network.deliver(self.id, to, message.clone());
            }
        }
    }
}
