//! Signed observations and attested reports.
//!
//! Observations are signed with the offchain key and only ever checked by
//! other oracles. Reports are signed with the onchain key over a
//! [`ReportContext`], which is what the target contract verifies.

use crate::domains;
use ocr_core::{KeyringResult, OffchainKeyring, OnchainKeyring};
use ocr_types::{
    AttributedOnchainSignature, OracleId, OracleIdentity, ReportContext, ReportTimestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// An observation with the observer's offchain signature.
///
/// The signature covers the round's timestamp and query as well, so an
/// observation cannot be replayed into another round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedObservation {
    /// Plugin-defined observation bytes
    pub observation: Vec<u8>,
    /// Offchain signature over [`SignedObservation::signing_payload`]
    pub signature: Vec<u8>,
}

impl SignedObservation {
    /// Bytes an observation signature covers.
    ///
    /// `domain ‖ digest ‖ epoch (BE) ‖ round ‖ len ‖ query ‖ len ‖ observation`
    pub fn signing_payload(
        timestamp: &ReportTimestamp,
        query: &[u8],
        observation: &[u8],
    ) -> Vec<u8> {
        let mut payload = Vec::with_capacity(
            domains::OBSERVATION.len() + 32 + 4 + 1 + 16 + query.len() + observation.len(),
        );
        payload.extend_from_slice(domains::OBSERVATION);
        payload.extend_from_slice(timestamp.config_digest.as_bytes());
        payload.extend_from_slice(&timestamp.epoch.to_be_bytes());
        payload.push(timestamp.round);
        payload.extend_from_slice(&(query.len() as u64).to_be_bytes());
        payload.extend_from_slice(query);
        payload.extend_from_slice(&(observation.len() as u64).to_be_bytes());
        payload.extend_from_slice(observation);
        payload
    }

    /// Sign `observation` for the round identified by `timestamp` and `query`.
    pub fn sign(
        keyring: &dyn OffchainKeyring,
        timestamp: &ReportTimestamp,
        query: &[u8],
        observation: Vec<u8>,
    ) -> KeyringResult<Self> {
        let signature =
            keyring.offchain_sign(&Self::signing_payload(timestamp, query, &observation))?;
        Ok(Self {
            observation,
            signature,
        })
    }

    /// Check the signature against the observer's offchain public key.
    pub fn verify(
        &self,
        keyring: &dyn OffchainKeyring,
        public_key: &[u8],
        timestamp: &ReportTimestamp,
        query: &[u8],
    ) -> bool {
        keyring.offchain_verify(
            public_key,
            &Self::signing_payload(timestamp, query, &self.observation),
            &self.signature,
        )
    }
}

/// A signed observation together with its observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributedSignedObservation {
    /// Observing oracle
    pub observer: OracleId,
    /// The observation and its signature
    pub signed_observation: SignedObservation,
}

/// A single follower's answer to a `ReportReq`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttestedReportOne {
    /// The plugin decided nothing needs reporting this round
    Skip,
    /// A report with the follower's onchain signature
    Attested {
        /// Report bytes
        report: Vec<u8>,
        /// Onchain signature over the report and its context
        signature: Vec<u8>,
    },
}

impl AttestedReportOne {
    /// Sign `report` under `context`.
    pub fn attest(
        keyring: &dyn OnchainKeyring,
        context: &ReportContext,
        report: Vec<u8>,
    ) -> KeyringResult<Self> {
        let signature = keyring.sign(context, &report)?;
        Ok(Self::Attested { report, signature })
    }

    /// Whether this is a skip.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }

    /// Two attestations agree if both skip or both carry the same report.
    pub fn equal_except_signature(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Skip, Self::Skip) => true,
            (Self::Attested { report: a, .. }, Self::Attested { report: b, .. }) => a == b,
            _ => false,
        }
    }

    /// Check the signature against the signer's onchain public key.
    ///
    /// A skip carries no signature and always verifies.
    pub fn verify(
        &self,
        keyring: &dyn OnchainKeyring,
        public_key: &[u8],
        context: &ReportContext,
    ) -> bool {
        match self {
            Self::Skip => true,
            Self::Attested { report, signature } => {
                keyring.verify(public_key, context, report, signature)
            }
        }
    }
}

/// Errors when checking an [`AttestedReportMany`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttestationError {
    /// Signature count differs from the quorum
    #[error("expected exactly {expected} signatures, got {actual}")]
    WrongSignatureCount {
        /// Required quorum
        expected: usize,
        /// Signatures present
        actual: usize,
    },

    /// Signer index is not a committee member
    #[error("signer {0} out of range")]
    SignerOutOfRange(OracleId),

    /// Same signer listed twice
    #[error("duplicate signer {0}")]
    DuplicateSigner(OracleId),

    /// Signature does not verify
    #[error("invalid signature from {0}")]
    InvalidSignature(OracleId),
}

/// A report with a quorum of onchain signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestedReportMany {
    /// Report bytes
    pub report: Vec<u8>,
    /// Exactly `report_quorum` signatures from distinct oracles
    pub attributed_signatures: Vec<AttributedOnchainSignature>,
}

impl AttestedReportMany {
    /// Create a new attested report.
    pub fn new(report: Vec<u8>, attributed_signatures: Vec<AttributedOnchainSignature>) -> Self {
        Self {
            report,
            attributed_signatures,
        }
    }

    /// Check that the report carries exactly `quorum` valid signatures from
    /// distinct members of `committee` under `context`.
    pub fn verify_signatures(
        &self,
        keyring: &dyn OnchainKeyring,
        committee: &[OracleIdentity],
        context: &ReportContext,
        quorum: usize,
    ) -> Result<(), AttestationError> {
        if self.attributed_signatures.len() != quorum {
            return Err(AttestationError::WrongSignatureCount {
                expected: quorum,
                actual: self.attributed_signatures.len(),
            });
        }

        let mut seen = HashSet::with_capacity(quorum);
        for sig in &self.attributed_signatures {
            let identity = committee
                .get(sig.signer as usize)
                .ok_or(AttestationError::SignerOutOfRange(sig.signer))?;
            if !seen.insert(sig.signer) {
                return Err(AttestationError::DuplicateSigner(sig.signer));
            }
            if !keyring.verify(
                &identity.onchain_public_key,
                context,
                &self.report,
                &sig.signature,
            ) {
                return Err(AttestationError::InvalidSignature(sig.signer));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestCommittee;

    fn attested_many(
        committee: &TestCommittee,
        context: &ReportContext,
        signers: &[OracleId],
    ) -> AttestedReportMany {
        let report = b"report".to_vec();
        let signatures = signers
            .iter()
            .map(|&signer| AttributedOnchainSignature {
                signer,
                signature: committee
                    .onchain_keyring(signer)
                    .sign(context, &report)
                    .unwrap(),
            })
            .collect();
        AttestedReportMany::new(report, signatures)
    }

    #[test]
    fn test_observation_signature_binds_round_and_query() {
        let committee = TestCommittee::new(4, 1);
        let keyring = committee.offchain_keyring(2);
        let pk = keyring.offchain_public_key();
        let ts = committee.timestamp(1, 1);

        let signed = SignedObservation::sign(keyring.as_ref(), &ts, b"q", b"obs".to_vec()).unwrap();
        assert!(signed.verify(keyring.as_ref(), &pk, &ts, b"q"));
        assert!(!signed.verify(keyring.as_ref(), &pk, &ts, b"other"));
        assert!(!signed.verify(keyring.as_ref(), &pk, &committee.timestamp(1, 2), b"q"));

        let other = committee.offchain_keyring(3).offchain_public_key();
        assert!(!signed.verify(keyring.as_ref(), &other, &ts, b"q"));
    }

    #[test]
    fn test_equal_except_signature() {
        let a = AttestedReportOne::Attested {
            report: vec![1],
            signature: vec![2],
        };
        let b = AttestedReportOne::Attested {
            report: vec![1],
            signature: vec![3],
        };
        let c = AttestedReportOne::Attested {
            report: vec![9],
            signature: vec![2],
        };
        assert!(a.equal_except_signature(&b));
        assert!(!a.equal_except_signature(&c));
        assert!(!a.equal_except_signature(&AttestedReportOne::Skip));
        assert!(AttestedReportOne::Skip.equal_except_signature(&AttestedReportOne::Skip));
    }

    #[test]
    fn test_attested_many_requires_exact_quorum() {
        let committee = TestCommittee::new(4, 1);
        let keyring = committee.onchain_keyring(0);
        let context = ReportContext::new(committee.timestamp(1, 1), [7u8; 32]);

        let report = attested_many(&committee, &context, &[0, 1, 2]);
        assert!(report
            .verify_signatures(keyring.as_ref(), committee.identities(), &context, 3)
            .is_ok());

        let short = attested_many(&committee, &context, &[0, 1]);
        assert_eq!(
            short.verify_signatures(keyring.as_ref(), committee.identities(), &context, 3),
            Err(AttestationError::WrongSignatureCount {
                expected: 3,
                actual: 2
            })
        );

        let long = attested_many(&committee, &context, &[0, 1, 2, 3]);
        assert!(long
            .verify_signatures(keyring.as_ref(), committee.identities(), &context, 3)
            .is_err());
    }

    #[test]
    fn test_attested_many_rejects_duplicates_and_strangers() {
        let committee = TestCommittee::new(4, 1);
        let keyring = committee.onchain_keyring(0);
        let context = ReportContext::new(committee.timestamp(1, 1), [7u8; 32]);

        let dup = attested_many(&committee, &context, &[0, 1, 1]);
        assert_eq!(
            dup.verify_signatures(keyring.as_ref(), committee.identities(), &context, 3),
            Err(AttestationError::DuplicateSigner(1))
        );

        let mut stranger = attested_many(&committee, &context, &[0, 1, 2]);
        stranger.attributed_signatures[2].signer = 7;
        assert_eq!(
            stranger.verify_signatures(keyring.as_ref(), committee.identities(), &context, 3),
            Err(AttestationError::SignerOutOfRange(7))
        );
    }

    #[test]
    fn test_attested_many_rejects_other_context() {
        let committee = TestCommittee::new(4, 1);
        let keyring = committee.onchain_keyring(0);
        let context = ReportContext::new(committee.timestamp(1, 1), [7u8; 32]);
        let report = attested_many(&committee, &context, &[0, 1, 2]);

        let other = ReportContext::new(committee.timestamp(1, 1), [8u8; 32]);
        assert!(matches!(
            report.verify_signatures(keyring.as_ref(), committee.identities(), &other, 3),
            Err(AttestationError::InvalidSignature(_))
        ));
    }
}
