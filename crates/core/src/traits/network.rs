//! Network endpoint.
//!
//! Delivery is best effort and unordered. The endpoint authenticates
//! senders: every inbound message is paired with the [`OracleId`] it came
//! from on the `mpsc::Receiver<(M, OracleId)>` handed to the oracle at
//! construction.

use ocr_types::OracleId;

/// Outbound half of a committee transport.
///
/// Both methods must return immediately. A slow or unreachable peer is the
/// endpoint's problem; it may drop messages for it.
///
/// An endpoint never delivers to its own oracle. The protocol handles
/// self-delivery through a local loopback.
pub trait NetworkEndpoint<M>: Send + Sync + 'static {
    /// Send `message` to oracle `to`.
    fn send_to(&self, message: M, to: OracleId);

    /// Send `message` to every other oracle.
    fn broadcast(&self, message: M);
}
