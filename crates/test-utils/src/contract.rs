//! Mock target contract.
//!
//! Accepts a report only if it carries exactly `quorum` valid signatures from
//! distinct committee members and its `(epoch, round)` is newer than the
//! last accepted one, mirroring what an aggregator contract enforces.

use async_trait::async_trait;
use ocr_core::{ContractTransmitter, OnchainKeyring, TransmitError, TransmitResult};
use ocr_crypto::EvmOnchainKeyring;
use ocr_types::{AttributedOnchainSignature, EpochRound, OracleId, ReportContext};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// One accepted transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    /// Submitting account
    pub from: String,
    /// Context the signatures commit to
    pub context: ReportContext,
    /// Report bytes
    pub report: Vec<u8>,
    /// Signers, in submission order
    pub signers: Vec<OracleId>,
}

#[derive(Debug, Default)]
struct ContractState {
    latest: Option<EpochRound>,
    accepted: Vec<Transmission>,
    rejected: usize,
}

/// Contract state shared by every oracle's [`MockTransmitter`].
#[derive(Debug)]
pub struct MockContract {
    committee: Vec<Vec<u8>>,
    quorum: usize,
    verifier: EvmOnchainKeyring,
    state: Mutex<ContractState>,
}

impl MockContract {
    /// Contract for a committee with the given onchain keys and quorum.
    pub fn new(committee: Vec<Vec<u8>>, quorum: usize) -> Self {
        Self {
            committee,
            quorum,
            verifier: EvmOnchainKeyring::random(),
            state: Mutex::new(ContractState::default()),
        }
    }

    /// Latest accepted `(epoch, round)`
    pub fn latest(&self) -> Option<EpochRound> {
        self.state.lock().latest
    }

    /// Every accepted transmission, oldest first
    pub fn transmissions(&self) -> Vec<Transmission> {
        self.state.lock().accepted.clone()
    }

    /// Number of accepted transmissions
    pub fn transmission_count(&self) -> usize {
        self.state.lock().accepted.len()
    }

    /// Number of rejected transmissions
    pub fn rejected_count(&self) -> usize {
        self.state.lock().rejected
    }

    fn check_signatures(
        &self,
        context: &ReportContext,
        report: &[u8],
        signatures: &[AttributedOnchainSignature],
    ) -> TransmitResult<()> {
        if signatures.len() != self.quorum {
            return Err(TransmitError::Rejected(format!(
                "expected {} signatures, got {}",
                self.quorum,
                signatures.len()
            )));
        }
        let mut seen = HashSet::new();
        for sig in signatures {
            let key = self
                .committee
                .get(sig.signer as usize)
                .ok_or_else(|| TransmitError::Rejected(format!("unknown signer {}", sig.signer)))?;
            if !seen.insert(sig.signer) {
                return Err(TransmitError::Rejected(format!("duplicate signer {}", sig.signer)));
            }
            if !self.verifier.verify(key, context, report, &sig.signature) {
                return Err(TransmitError::Rejected(format!("bad signature from {}", sig.signer)));
            }
        }
        Ok(())
    }

    /// Apply a transmission from `from`.
    pub fn submit(
        &self,
        from: &str,
        context: &ReportContext,
        report: &[u8],
        signatures: &[AttributedOnchainSignature],
    ) -> TransmitResult<()> {
        let checked = self.check_signatures(context, report, signatures);
        let mut state = self.state.lock();
        if let Err(e) = checked {
            state.rejected += 1;
            return Err(e);
        }

        let epoch_round = context.report_timestamp.epoch_round();
        if state.latest.is_some_and(|latest| epoch_round <= latest) {
            state.rejected += 1;
            return Err(TransmitError::Rejected(format!("stale report {}", epoch_round)));
        }

        debug!(from, %epoch_round, "Contract accepted report");
        state.latest = Some(epoch_round);
        state.accepted.push(Transmission {
            from: from.to_string(),
            context: *context,
            report: report.to_vec(),
            signers: signatures.iter().map(|s| s.signer).collect(),
        });
        Ok(())
    }
}

/// Transmitter submitting to a shared [`MockContract`].
#[derive(Debug)]
pub struct MockTransmitter {
    contract: Arc<MockContract>,
    account: String,
    unavailable: AtomicBool,
}

impl MockTransmitter {
    /// Transmitter sending from `account`.
    pub fn new(contract: Arc<MockContract>, account: impl Into<String>) -> Self {
        Self {
            contract,
            account: account.into(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Fail every transmission with `Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContractTransmitter for MockTransmitter {
    async fn transmit(
        &self,
        context: &ReportContext,
        report: &[u8],
        signatures: &[AttributedOnchainSignature],
    ) -> TransmitResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TransmitError::Unavailable("chain offline".to_string()));
        }
        self.contract.submit(&self.account, context, report, signatures)
    }

    async fn from_account(&self) -> TransmitResult<String> {
        Ok(self.account.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestCommittee;

    fn signed(
        committee: &TestCommittee,
        context: &ReportContext,
        signers: &[OracleId],
    ) -> Vec<AttributedOnchainSignature> {
        signers
            .iter()
            .map(|&signer| AttributedOnchainSignature {
                signer,
                signature: committee
                    .onchain_keyring(signer)
                    .sign(context, b"report")
                    .unwrap(),
            })
            .collect()
    }

    #[test]
    fn test_accepts_increasing_quorum_reports() {
        let committee = TestCommittee::new(4, 1);
        let contract = MockContract::new(committee.onchain_public_keys(), 3);

        let first = ReportContext::new(committee.timestamp(1, 1), [0u8; 32]);
        contract
            .submit("a", &first, b"report", &signed(&committee, &first, &[0, 1, 2]))
            .unwrap();
        assert_eq!(contract.latest(), Some(EpochRound::new(1, 1)));

        // same round again is stale
        assert!(contract
            .submit("b", &first, b"report", &signed(&committee, &first, &[1, 2, 3]))
            .is_err());

        let second = ReportContext::new(committee.timestamp(1, 2), [0u8; 32]);
        contract
            .submit("b", &second, b"report", &signed(&committee, &second, &[1, 2, 3]))
            .unwrap();
        assert_eq!(contract.transmission_count(), 2);
        assert_eq!(contract.rejected_count(), 1);
    }

    #[test]
    fn test_rejects_bad_quorum() {
        let committee = TestCommittee::new(4, 1);
        let contract = MockContract::new(committee.onchain_public_keys(), 3);
        let context = ReportContext::new(committee.timestamp(1, 1), [0u8; 32]);

        assert!(contract
            .submit("a", &context, b"report", &signed(&committee, &context, &[0, 1]))
            .is_err());
        assert!(contract
            .submit("a", &context, b"report", &signed(&committee, &context, &[0, 1, 1]))
            .is_err());
        let other = ReportContext::new(committee.timestamp(1, 1), [1u8; 32]);
        assert!(contract
            .submit("a", &context, b"report", &signed(&committee, &other, &[0, 1, 2]))
            .is_err());
        assert_eq!(contract.transmission_count(), 0);
    }
}
