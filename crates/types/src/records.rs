//! Attributed values and the records persisted across restarts.

use crate::{Epoch, Hash, OracleId};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// An observation together with the oracle that made it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributedObservation {
    /// Observing oracle
    pub observer: OracleId,
    /// Plugin-defined observation bytes
    pub observation: Vec<u8>,
}

/// An onchain report signature together with its signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributedOnchainSignature {
    /// Signing oracle
    pub signer: OracleId,
    /// Signature bytes
    pub signature: Vec<u8>,
}

/// A report scheduled for transmission.
///
/// Keyed by its `ReportTimestamp` in the database. Written when the report
/// is accepted, deleted when its timer fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransmission {
    /// Wall-clock time the transmission is due
    pub time: SystemTime,
    /// Extra hash of the report context
    pub extra_hash: Hash,
    /// Report bytes
    pub report: Vec<u8>,
    /// Quorum of signatures over the report
    pub attributed_signatures: Vec<AttributedOnchainSignature>,
}

/// Pacemaker state restored after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PacemakerState {
    /// Current epoch
    pub epoch: Epoch,
    /// Highest epoch this oracle has broadcast a NewEpoch for
    pub highest_sent_epoch: Epoch,
    /// Leader of `epoch`
    pub leader: OracleId,
}
