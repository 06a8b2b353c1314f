//! Events passed between protocol tasks.

use crate::attested_report::AttestedReportMany;
use ocr_types::{Epoch, Hash, ReportContext, ReportTimestamp};

/// Report Generation → Pacemaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventToPacemaker {
    /// A round of `epoch` completed; restart the progress timer.
    Progress {
        /// Epoch the event was produced in
        epoch: Epoch,
    },
    /// The leader of `epoch` exhausted its rounds; ask for a new epoch.
    ChangeLeader {
        /// Epoch the event was produced in
        epoch: Epoch,
    },
}

impl EventToPacemaker {
    /// Epoch the event belongs to
    pub fn epoch(&self) -> Epoch {
        match self {
            Self::Progress { epoch } | Self::ChangeLeader { epoch } => *epoch,
        }
    }
}

/// A quorum-attested report.
///
/// Carried from Report Generation to Finalization (`EventFinal`) and from
/// Finalization to Transmission (`EventTransmit`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedReport {
    /// Where the report was produced
    pub timestamp: ReportTimestamp,
    /// Hash of the round's query and observations
    pub extra_hash: Hash,
    /// The report and its signatures
    pub attested_report: AttestedReportMany,
}

impl FinalizedReport {
    /// Context the report signatures commit to
    pub fn context(&self) -> ReportContext {
        ReportContext::new(self.timestamp, self.extra_hash)
    }
}
