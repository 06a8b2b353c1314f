//! Follower role.

use super::{compute_extra_hash, ReportGeneration};
use crate::attested_report::{
    AttestedReportMany, AttestedReportOne, AttributedSignedObservation, SignedObservation,
};
use crate::events::FinalizedReport;
use crate::messages::ProtocolMessage;
use crate::timed::timed_call;
use ocr_types::{AttributedObservation, Hash, OracleId, ReportContext, Round};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Per-round follower latches.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FollowerState {
    /// Highest round an `ObserveReq` was accepted for; 0 before the first
    pub round: Round,
    /// A `Report` was produced for `round`
    pub sent_report: bool,
    /// `round` finished, by skip or by a verified `Final`
    pub completed_round: bool,
}

impl ReportGeneration {
    fn from_leader(&self, kind: &'static str, from: OracleId) -> bool {
        if from != self.leader {
            warn!(
                kind,
                from,
                leader = self.leader,
                epoch = self.epoch,
                "Dropping leader message from non-leader"
            );
            return false;
        }
        true
    }

    /// Whether a `ReportReq` or `Final` for `round` belongs to the current round.
    fn is_current_round(&self, kind: &'static str, round: Round) -> bool {
        let current = self.follower.round;
        let r_max = self.ctx.config.r_max;

        if round == 0 || round < current {
            debug!(kind, round, current, "Dropping stale message");
            false
        } else if round > r_max.saturating_add(1) {
            warn!(kind, round, r_max, "Dropping message with round above limit");
            false
        } else if round > current {
            debug!(kind, round, current, "Dropping message for a round not yet started");
            false
        } else if round > r_max {
            debug!(kind, round, r_max, "Dropping message for a round past the limit");
            false
        } else {
            true
        }
    }

    pub(super) async fn on_observe_req(&mut self, from: OracleId, round: Round, query: Vec<u8>) {
        if !self.from_leader("observe_req", from) {
            return;
        }

        let r_max = self.ctx.config.r_max;
        if round <= self.follower.round {
            debug!(round, current = self.follower.round, "Dropping stale ObserveReq");
            return;
        }
        if round > r_max.saturating_add(1) {
            warn!(round, r_max, "Dropping ObserveReq with round above limit");
            return;
        }

        self.follower = FollowerState {
            round,
            ..FollowerState::default()
        };

        if round > r_max {
            info!(
                epoch = self.epoch,
                leader = self.leader,
                round,
                "Leader exhausted its rounds, requesting leader change"
            );
            self.emit_change_leader();
            return;
        }

        if query.len() > self.ctx.plugin_info.max_query_length {
            warn!(round, len = query.len(), "Dropping oversize query");
            return;
        }

        let ctx = self.ctx.clone();
        let ts = ctx.timestamp(self.epoch, round);
        let observation = match timed_call(
            "observation",
            ctx.config.max_duration_observation(),
            ctx.call_grace(),
            ctx.plugin.observation(&ts, &query),
        )
        .await
        {
            Ok(observation) => observation,
            Err(e) => {
                error!(epoch = self.epoch, round, "Failed to make observation: {}", e);
                return;
            }
        };

        if observation.len() > ctx.plugin_info.max_observation_length {
            error!(
                round,
                len = observation.len(),
                max = ctx.plugin_info.max_observation_length,
                "Plugin produced oversize observation"
            );
            return;
        }

        let signed_observation =
            match SignedObservation::sign(ctx.offchain_keyring.as_ref(), &ts, &query, observation) {
                Ok(signed) => signed,
                Err(e) => {
                    error!(round, "Failed to sign observation: {}", e);
                    return;
                }
            };

        debug!(epoch = self.epoch, round, "Sending observation");
        self.sender.send_to(
            ProtocolMessage::Observe {
                epoch: self.epoch,
                round,
                signed_observation,
            },
            self.leader,
        );
    }

    /// Check a leader-supplied observation set; `false` rejects the whole request.
    fn validate_observations(
        &self,
        round: Round,
        query: &[u8],
        observations: &[AttributedSignedObservation],
    ) -> bool {
        let ctx = &self.ctx;

        if observations.len() < ctx.config.observation_quorum() {
            warn!(
                round,
                count = observations.len(),
                required = ctx.config.observation_quorum(),
                "Rejecting ReportReq with too few observations"
            );
            return false;
        }

        let ts = ctx.timestamp(self.epoch, round);
        let mut seen = HashSet::with_capacity(observations.len());
        for aso in observations {
            let Some(identity) = ctx.identity(aso.observer) else {
                warn!(round, observer = aso.observer, "Rejecting ReportReq with unknown observer");
                return false;
            };
            if !seen.insert(aso.observer) {
                warn!(
                    round,
                    observer = aso.observer,
                    "Rejecting ReportReq with duplicate observer"
                );
                return false;
            }
            if aso.signed_observation.observation.len() > ctx.plugin_info.max_observation_length {
                warn!(
                    round,
                    observer = aso.observer,
                    "Rejecting ReportReq with oversize observation"
                );
                return false;
            }
            if !aso.signed_observation.verify(
                ctx.offchain_keyring.as_ref(),
                &identity.offchain_public_key,
                &ts,
                query,
            ) {
                warn!(
                    round,
                    observer = aso.observer,
                    "Rejecting ReportReq with invalid observation signature"
                );
                return false;
            }
        }
        true
    }

    pub(super) async fn on_report_req(
        &mut self,
        from: OracleId,
        round: Round,
        query: Vec<u8>,
        observations: Vec<AttributedSignedObservation>,
    ) {
        if !self.from_leader("report_req", from) || !self.is_current_round("report_req", round) {
            return;
        }
        if self.follower.sent_report || self.follower.completed_round {
            debug!(round, "Already answered this round, dropping ReportReq");
            return;
        }
        if query.len() > self.ctx.plugin_info.max_query_length {
            warn!(round, len = query.len(), "Rejecting ReportReq with oversize query");
            return;
        }
        if !self.validate_observations(round, &query, &observations) {
            return;
        }

        let ctx = self.ctx.clone();
        let ts = ctx.timestamp(self.epoch, round);
        let extra_hash = compute_extra_hash(&query, &observations);
        let attributed: Vec<AttributedObservation> = observations
            .into_iter()
            .map(|aso| AttributedObservation {
                observer: aso.observer,
                observation: aso.signed_observation.observation,
            })
            .collect();

        let report = match timed_call(
            "report",
            ctx.config.max_duration_report(),
            ctx.call_grace(),
            ctx.plugin.report(&ts, &query, &attributed),
        )
        .await
        {
            Ok(report) => report,
            Err(e) => {
                error!(epoch = self.epoch, round, "Failed to build report: {}", e);
                return;
            }
        };

        self.follower.sent_report = true;

        let attested_report = match report {
            Some(report) => {
                if report.len() > ctx.plugin_info.max_report_length {
                    error!(
                        round,
                        len = report.len(),
                        max = ctx.plugin_info.max_report_length,
                        "Plugin produced oversize report"
                    );
                    return;
                }
                let context = ReportContext::new(ts, extra_hash);
                match AttestedReportOne::attest(ctx.onchain_keyring.as_ref(), &context, report) {
                    Ok(attested) => attested,
                    Err(e) => {
                        error!(round, "Failed to sign report: {}", e);
                        return;
                    }
                }
            }
            None => {
                debug!(epoch = self.epoch, round, "Plugin skipped report");
                self.follower.completed_round = true;
                self.emit_progress();
                AttestedReportOne::Skip
            }
        };

        self.sender.send_to(
            ProtocolMessage::Report {
                epoch: self.epoch,
                round,
                attested_report,
            },
            self.leader,
        );
    }

    pub(super) fn on_final(
        &mut self,
        from: OracleId,
        round: Round,
        extra_hash: Hash,
        attested_report: AttestedReportMany,
    ) {
        if !self.from_leader("final", from) || !self.is_current_round("final", round) {
            return;
        }
        if self.follower.completed_round {
            debug!(round, "Round already completed, dropping Final");
            return;
        }

        let ts = self.ctx.timestamp(self.epoch, round);
        let context = ReportContext::new(ts, extra_hash);
        if let Err(e) = attested_report.verify_signatures(
            self.ctx.onchain_keyring.as_ref(),
            &self.ctx.config.oracles,
            &context,
            self.ctx.report_quorum(),
        ) {
            warn!(epoch = self.epoch, round, "Rejecting Final: {}", e);
            return;
        }

        self.follower.completed_round = true;
        info!(epoch = self.epoch, round, "Round completed with final report");

        let finalized = FinalizedReport {
            timestamp: ts,
            extra_hash,
            attested_report,
        };
        if self.to_finalization.send(finalized).is_err() {
            debug!(round, "Finalization gone, dropping final report");
        }
        self.emit_progress();
    }
}
