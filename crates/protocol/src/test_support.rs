//! Fixtures for unit tests.

use crate::attested_report::AttestedReportMany;
use crate::context::OracleContext;
use crate::events::FinalizedReport;
use crate::messages::ProtocolMessage;
use crate::sender::MessageSender;
use ocr_config::LocalConfig;
use ocr_core::{OnchainKeyring, ReportingPlugin};
use ocr_test_utils::{MedianPlugin, RecordingEndpoint};
use ocr_types::{AttributedOnchainSignature, OracleId, ReportContext, ReportTimestamp};
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) use ocr_test_utils::TestCommittee;

/// Context for oracle `id` of `committee`, driving `plugin`.
pub(crate) fn context(
    committee: &TestCommittee,
    id: OracleId,
    plugin: Arc<MedianPlugin>,
) -> Arc<OracleContext> {
    Arc::new(OracleContext {
        id,
        config: committee.config().clone(),
        local: LocalConfig::default(),
        plugin_info: plugin.info(),
        plugin,
        onchain_keyring: committee.onchain_keyring(id),
        offchain_keyring: committee.offchain_keyring(id),
    })
}

/// Sender recording everything it is asked to send.
pub(crate) struct TestSender {
    pub sender: MessageSender,
    pub endpoint: Arc<RecordingEndpoint<ProtocolMessage>>,
    pub loopback: mpsc::Receiver<ProtocolMessage>,
}

impl TestSender {
    pub fn new(id: OracleId) -> Self {
        let endpoint = Arc::new(RecordingEndpoint::new());
        let (tx, loopback) = mpsc::channel(64);
        Self {
            sender: MessageSender::new(id, endpoint.clone(), tx),
            endpoint,
            loopback,
        }
    }

    /// Drain the loopback.
    pub fn looped_back(&mut self) -> Vec<ProtocolMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.loopback.try_recv() {
            out.push(msg);
        }
        out
    }
}

/// `report` signed by `signers` for the round at `timestamp`.
pub(crate) fn finalized_report(
    committee: &TestCommittee,
    timestamp: ReportTimestamp,
    report: &[u8],
    signers: &[OracleId],
) -> FinalizedReport {
    let extra_hash = [3u8; 32];
    let context = ReportContext::new(timestamp, extra_hash);
    let attributed_signatures = signers
        .iter()
        .map(|&signer| AttributedOnchainSignature {
            signer,
            signature: committee
                .onchain_keyring(signer)
                .sign(&context, report)
                .expect("test keys sign"),
        })
        .collect();
    FinalizedReport {
        timestamp,
        extra_hash,
        attested_report: AttestedReportMany::new(report.to_vec(), attributed_signatures),
    }
}
