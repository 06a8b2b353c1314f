//! Wire messages.
//!
//! Messages do not carry the config digest: an endpoint serves exactly one
//! configuration, and every signature commits to the digest anyway.
//! `FinalEcho` is the exception because it hands a full timestamp to
//! finalization.

use crate::attested_report::{
    AttestedReportMany, AttestedReportOne, AttributedSignedObservation, SignedObservation,
};
use ocr_types::{Epoch, Hash, ReportTimestamp, Round};
use serde::{Deserialize, Serialize};

/// Messages exchanged by the committee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolMessage {
    /// Pacemaker: the sender wants to move to `epoch`
    NewEpoch {
        /// Requested epoch
        epoch: Epoch,
    },
    /// Leader → all: start of a round
    ObserveReq {
        /// Epoch
        epoch: Epoch,
        /// Round
        round: Round,
        /// Plugin query for this round
        query: Vec<u8>,
    },
    /// Follower → leader: signed observation
    Observe {
        /// Epoch
        epoch: Epoch,
        /// Round
        round: Round,
        /// The observation and its offchain signature
        signed_observation: SignedObservation,
    },
    /// Leader → all: build a report from these observations
    ReportReq {
        /// Epoch
        epoch: Epoch,
        /// Round
        round: Round,
        /// The round's query
        query: Vec<u8>,
        /// More than 2F signed observations, sorted by observer
        attributed_signed_observations: Vec<AttributedSignedObservation>,
    },
    /// Follower → leader: signed report or skip
    Report {
        /// Epoch
        epoch: Epoch,
        /// Round
        round: Round,
        /// The follower's attestation
        attested_report: AttestedReportOne,
    },
    /// Leader → all: report with a quorum of signatures
    Final {
        /// Epoch
        epoch: Epoch,
        /// Round
        round: Round,
        /// Extra hash of the report context
        extra_hash: Hash,
        /// Quorum-signed report
        attested_report: AttestedReportMany,
    },
    /// Finalization → all: relay of a finalized report
    FinalEcho {
        /// Where the report was produced
        timestamp: ReportTimestamp,
        /// Extra hash of the report context
        extra_hash: Hash,
        /// Quorum-signed report
        attested_report: AttestedReportMany,
    },
}

impl ProtocolMessage {
    /// Epoch the message refers to
    pub fn epoch(&self) -> Epoch {
        match self {
            Self::NewEpoch { epoch }
            | Self::ObserveReq { epoch, .. }
            | Self::Observe { epoch, .. }
            | Self::ReportReq { epoch, .. }
            | Self::Report { epoch, .. }
            | Self::Final { epoch, .. } => *epoch,
            Self::FinalEcho { timestamp, .. } => timestamp.epoch,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewEpoch { .. } => "new_epoch",
            Self::ObserveReq { .. } => "observe_req",
            Self::Observe { .. } => "observe",
            Self::ReportReq { .. } => "report_req",
            Self::Report { .. } => "report",
            Self::Final { .. } => "final",
            Self::FinalEcho { .. } => "final_echo",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_json_shape() {
        let msg = ProtocolMessage::NewEpoch { epoch: 4 };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"NewEpoch":{"epoch":4}}"#);
        assert_eq!(msg.kind(), "new_epoch");
        assert_eq!(msg.epoch(), 4);
    }
}
