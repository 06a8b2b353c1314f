//! Leader role.

use super::{compute_extra_hash, ReportGeneration};
use crate::attested_report::{
    AttestedReportMany, AttestedReportOne, AttributedSignedObservation, SignedObservation,
};
use crate::messages::ProtocolMessage;
use crate::timed::timed_call;
use ocr_types::{AttributedOnchainSignature, Hash, OracleId, ReportContext, Round};
use std::collections::BTreeMap;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Where the leader is within its current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeaderPhase {
    /// Collecting the first 2F+1 observations
    Observe,
    /// Quorum reached, still accepting late observations
    Grace,
    /// `ReportReq` sent, collecting reports
    Report,
    /// `Final` sent or round abandoned
    Final,
}

/// Leader state for the current round.
#[derive(Debug)]
pub(crate) struct LeaderState {
    pub round: Round,
    pub phase: LeaderPhase,
    pub query: Vec<u8>,
    /// Verified observations, keyed and therefore sorted by observer
    pub observations: BTreeMap<OracleId, SignedObservation>,
    pub extra_hash: Option<Hash>,
    /// Verified reports, keyed by sender
    pub reports: BTreeMap<OracleId, AttestedReportOne>,
    /// Next round start; `None` once rounds are exhausted
    pub round_deadline: Option<Instant>,
    pub grace_deadline: Option<Instant>,
}

impl LeaderState {
    pub fn new() -> Self {
        Self {
            round: 0,
            phase: LeaderPhase::Final,
            query: Vec::new(),
            observations: BTreeMap::new(),
            extra_hash: None,
            reports: BTreeMap::new(),
            round_deadline: None,
            grace_deadline: None,
        }
    }
}

impl ReportGeneration {
    /// Begin the next round, or stop scheduling rounds past `RMax + 1`.
    pub(super) async fn start_round(&mut self) {
        let r_max = self.ctx.config.r_max;
        let delta_round = self.ctx.config.delta_round();
        let Some(leader) = self.leader_state.as_mut() else {
            return;
        };

        if leader.round > r_max {
            debug!(
                epoch = self.epoch,
                round = leader.round,
                "Rounds exhausted, waiting for epoch change"
            );
            leader.round_deadline = None;
            return;
        }

        leader.round += 1;
        leader.phase = LeaderPhase::Final;
        leader.query.clear();
        leader.observations.clear();
        leader.reports.clear();
        leader.extra_hash = None;
        leader.grace_deadline = None;
        leader.round_deadline = Some(Instant::now() + delta_round);
        let round = leader.round;

        let ctx = self.ctx.clone();
        let ts = ctx.timestamp(self.epoch, round);
        let query = match timed_call(
            "query",
            ctx.config.max_duration_query(),
            ctx.call_grace(),
            ctx.plugin.query(&ts),
        )
        .await
        {
            Ok(query) => query,
            Err(e) => {
                error!(epoch = self.epoch, round, "Failed to build query: {}", e);
                return;
            }
        };

        if query.len() > ctx.plugin_info.max_query_length {
            error!(
                round,
                len = query.len(),
                max = ctx.plugin_info.max_query_length,
                "Plugin produced oversize query"
            );
            return;
        }

        let Some(leader) = self.leader_state.as_mut() else {
            return;
        };
        leader.query = query.clone();
        leader.phase = LeaderPhase::Observe;

        info!(epoch = self.epoch, round, "Starting round");
        self.sender.broadcast(ProtocolMessage::ObserveReq {
            epoch: self.epoch,
            round,
            query,
        });
    }

    pub(super) fn on_observe(
        &mut self,
        from: OracleId,
        round: Round,
        signed_observation: SignedObservation,
    ) {
        let ctx = &self.ctx;
        let epoch = self.epoch;
        let Some(leader) = self.leader_state.as_mut() else {
            debug!(from, "Not the leader, dropping Observe");
            return;
        };

        if round != leader.round {
            debug!(from, round, current = leader.round, "Dropping Observe for another round");
            return;
        }
        if !matches!(leader.phase, LeaderPhase::Observe | LeaderPhase::Grace) {
            debug!(from, round, phase = ?leader.phase, "Dropping late Observe");
            return;
        }
        if leader.observations.contains_key(&from) {
            debug!(from, round, "Dropping duplicate Observe");
            return;
        }
        if signed_observation.observation.len() > ctx.plugin_info.max_observation_length {
            warn!(from, round, "Dropping oversize observation");
            return;
        }
        let Some(identity) = ctx.identity(from) else {
            warn!(from, "Dropping Observe from unknown oracle");
            return;
        };

        let ts = ctx.timestamp(epoch, round);
        if !signed_observation.verify(
            ctx.offchain_keyring.as_ref(),
            &identity.offchain_public_key,
            &ts,
            &leader.query,
        ) {
            warn!(from, round, "Dropping Observe with invalid signature");
            return;
        }

        leader.observations.insert(from, signed_observation);

        if leader.phase == LeaderPhase::Observe
            && leader.observations.len() >= ctx.config.observation_quorum()
        {
            debug!(epoch, round, "Observation quorum reached, starting grace period");
            leader.phase = LeaderPhase::Grace;
            leader.grace_deadline = Some(Instant::now() + ctx.config.delta_grace());
        }
    }

    pub(super) fn on_grace_expired(&mut self) {
        let epoch = self.epoch;
        let Some(leader) = self.leader_state.as_mut() else {
            return;
        };
        leader.grace_deadline = None;
        if leader.phase != LeaderPhase::Grace {
            return;
        }

        let observations: Vec<AttributedSignedObservation> = leader
            .observations
            .iter()
            .map(|(observer, signed)| AttributedSignedObservation {
                observer: *observer,
                signed_observation: signed.clone(),
            })
            .collect();
        leader.extra_hash = Some(compute_extra_hash(&leader.query, &observations));
        leader.phase = LeaderPhase::Report;

        debug!(
            epoch,
            round = leader.round,
            observations = observations.len(),
            "Requesting reports"
        );
        self.sender.broadcast(ProtocolMessage::ReportReq {
            epoch,
            round: leader.round,
            query: leader.query.clone(),
            attributed_signed_observations: observations,
        });
    }

    pub(super) fn on_report(&mut self, from: OracleId, round: Round, attested: AttestedReportOne) {
        let ctx = &self.ctx;
        let epoch = self.epoch;
        let Some(leader) = self.leader_state.as_mut() else {
            debug!(from, "Not the leader, dropping Report");
            return;
        };

        if round != leader.round || leader.phase != LeaderPhase::Report {
            debug!(from, round, current = leader.round, phase = ?leader.phase, "Dropping Report");
            return;
        }
        if leader.reports.contains_key(&from) {
            debug!(from, round, "Dropping duplicate Report");
            return;
        }
        let Some(extra_hash) = leader.extra_hash else {
            return;
        };
        let Some(identity) = ctx.identity(from) else {
            warn!(from, "Dropping Report from unknown oracle");
            return;
        };

        if let AttestedReportOne::Attested { report, .. } = &attested {
            if report.len() > ctx.plugin_info.max_report_length {
                warn!(from, round, "Dropping oversize report");
                return;
            }
        }

        let context = ReportContext::new(ctx.timestamp(epoch, round), extra_hash);
        if !attested.verify(ctx.onchain_keyring.as_ref(), &identity.onchain_public_key, &context) {
            warn!(from, round, "Dropping Report with invalid signature");
            return;
        }

        leader.reports.insert(from, attested.clone());

        let AttestedReportOne::Attested { report, .. } = attested else {
            return;
        };

        let quorum = ctx.report_quorum();
        let attributed_signatures: Vec<AttributedOnchainSignature> = leader
            .reports
            .iter()
            .filter_map(|(signer, a)| match a {
                AttestedReportOne::Attested {
                    report: r,
                    signature,
                } if *r == report => Some(AttributedOnchainSignature {
                    signer: *signer,
                    signature: signature.clone(),
                }),
                _ => None,
            })
            .take(quorum)
            .collect();

        if attributed_signatures.len() < quorum {
            return;
        }

        leader.phase = LeaderPhase::Final;
        info!(epoch, round, signers = quorum, "Report quorum reached, sending Final");
        self.sender.broadcast(ProtocolMessage::Final {
            epoch,
            round,
            extra_hash,
            attested_report: AttestedReportMany::new(report, attributed_signatures),
        });
    }
}
