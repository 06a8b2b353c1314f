//! Protocol coordinates: epochs, rounds and the contexts reports are signed in.

use crate::{ConfigDigest, Hash};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Epoch number. One leader per epoch.
pub type Epoch = u32;

/// Round number within an epoch. Rounds start at 1.
pub type Round = u8;

/// An (epoch, round) pair, ordered lexicographically.
///
/// Field order matters: the derived `Ord` compares `epoch` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EpochRound {
    /// Epoch
    pub epoch: Epoch,
    /// Round within the epoch
    pub round: Round,
}

impl EpochRound {
    /// Creates a new epoch/round pair.
    pub const fn new(epoch: Epoch, round: Round) -> Self {
        Self { epoch, round }
    }
}

impl fmt::Display for EpochRound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.epoch, self.round)
    }
}

/// Identifies one protocol round under one configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReportTimestamp {
    /// Configuration the round belongs to
    pub config_digest: ConfigDigest,
    /// Epoch
    pub epoch: Epoch,
    /// Round
    pub round: Round,
}

impl ReportTimestamp {
    /// Creates a new report timestamp.
    pub const fn new(config_digest: ConfigDigest, epoch: Epoch, round: Round) -> Self {
        Self {
            config_digest,
            epoch,
            round,
        }
    }

    /// The (epoch, round) part of this timestamp.
    pub const fn epoch_round(&self) -> EpochRound {
        EpochRound::new(self.epoch, self.round)
    }
}

impl fmt::Display for ReportTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.config_digest, self.epoch, self.round)
    }
}

/// Everything a report signature commits to besides the report itself.
///
/// `extra_hash` commits to the query and the observations the report was
/// derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportContext {
    /// Round the report was produced in
    pub report_timestamp: ReportTimestamp,
    /// Hash over the query and attributed observations
    pub extra_hash: Hash,
}

impl ReportContext {
    /// Creates a new report context.
    pub const fn new(report_timestamp: ReportTimestamp, extra_hash: Hash) -> Self {
        Self {
            report_timestamp,
            extra_hash,
        }
    }

    /// Fixed-width encoding:
    /// digest (32) ‖ 27 zero bytes ‖ epoch (4, BE) ‖ round (1) ‖ extra hash (32).
    pub fn to_bytes(&self) -> [u8; 96] {
        let mut out = [0u8; 96];
        out[0..32].copy_from_slice(self.report_timestamp.config_digest.as_bytes());
        out[59..63].copy_from_slice(&self.report_timestamp.epoch.to_be_bytes());
        out[63] = self.report_timestamp.round;
        out[64..96].copy_from_slice(&self.extra_hash);
        out
    }
}
