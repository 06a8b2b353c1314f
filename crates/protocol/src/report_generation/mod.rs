//! # Report Generation
//!
//! One instance per epoch, spawned and cancelled by the pacemaker. The
//! epoch's leader runs both roles in the same task: its broadcasts reach its
//! own follower role through the loopback.
//!
//! ## Round Flow
//!
//! ```text
//! leader                                   follower
//!   │ start_round: r += 1, query            │
//!   │──── ObserveReq{e, r, query} ─────────►│ r > current r, r ≤ RMax
//!   │◄─── Observe{e, r, signed obs} ────────│ observation(query), sign
//!   │ 2F+1 observations: start grace        │
//!   │ grace expires                         │
//!   │──── ReportReq{e, r, query, obs} ─────►│ validate obs, report(...)
//!   │◄─── Report{e, r, attested | skip} ────│ sign once per round
//!   │ quorum of equal reports               │
//!   │──── Final{e, r, extra_hash, many} ───►│ verify quorum
//!   │                                       │ EventFinal, Progress
//!   │ t_round expires: next round           │
//! ```
//!
//! A follower that sees an `ObserveReq` for round `RMax + 1` asks the
//! pacemaker for a new leader.

mod follower;
mod leader;

use crate::attested_report::AttributedSignedObservation;
use crate::context::OracleContext;
use crate::domains;
use crate::events::{EventToPacemaker, FinalizedReport};
use crate::messages::ProtocolMessage;
use crate::sender::MessageSender;
use crate::timed::sleep_until_opt;
use ocr_crypto::Hasher;
use ocr_types::{Epoch, Hash, OracleId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use follower::FollowerState;
use leader::LeaderState;

/// Inbound report generation traffic, `(message, sender)`.
pub(crate) type Inbound = mpsc::Receiver<(ProtocolMessage, OracleId)>;

/// Hash committing a report to the query and observations it was built from.
///
/// `keccak256(domain ‖ len ‖ query ‖ count ‖ (observer ‖ len ‖ observation)*)`
/// over the observations in the order given.
pub fn compute_extra_hash(query: &[u8], observations: &[AttributedSignedObservation]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(domains::EXTRA_HASH);
    hasher.update_len_prefixed(query);
    hasher.update(&(observations.len() as u64).to_be_bytes());
    for aso in observations {
        hasher.update(&[aso.observer]);
        hasher.update_len_prefixed(&aso.signed_observation.observation);
    }
    hasher.finalize()
}

/// Report generation for one epoch.
pub(crate) struct ReportGeneration {
    ctx: Arc<OracleContext>,
    sender: MessageSender,
    epoch: Epoch,
    leader: OracleId,
    to_pacemaker: mpsc::UnboundedSender<EventToPacemaker>,
    to_finalization: mpsc::UnboundedSender<FinalizedReport>,
    follower: FollowerState,
    /// Present only when we lead this epoch
    leader_state: Option<LeaderState>,
}

impl ReportGeneration {
    pub fn new(
        ctx: Arc<OracleContext>,
        sender: MessageSender,
        epoch: Epoch,
        leader: OracleId,
        to_pacemaker: mpsc::UnboundedSender<EventToPacemaker>,
        to_finalization: mpsc::UnboundedSender<FinalizedReport>,
    ) -> Self {
        let leader_state = (ctx.id == leader).then(LeaderState::new);
        Self {
            ctx,
            sender,
            epoch,
            leader,
            to_pacemaker,
            to_finalization,
            follower: FollowerState::default(),
            leader_state,
        }
    }

    /// Run until cancelled, handing the inbound receiver back for the next epoch.
    pub async fn run(mut self, mut inbound: Inbound, cancel: CancellationToken) -> Inbound {
        info!(
            epoch = self.epoch,
            leader = self.leader,
            is_leader = self.leader_state.is_some(),
            "Starting report generation"
        );

        if self.leader_state.is_some() {
            self.start_round().await;
        }

        loop {
            let round_deadline = self.leader_state.as_ref().and_then(|l| l.round_deadline);
            let grace_deadline = self.leader_state.as_ref().and_then(|l| l.grace_deadline);

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                msg = inbound.recv() => match msg {
                    Some((message, from)) => self.handle_message(message, from).await,
                    None => break,
                },

                _ = sleep_until_opt(grace_deadline) => self.on_grace_expired(),

                _ = sleep_until_opt(round_deadline) => self.start_round().await,
            }
        }

        debug!(epoch = self.epoch, "Report generation stopped");
        inbound
    }

    async fn handle_message(&mut self, message: ProtocolMessage, from: OracleId) {
        if message.epoch() != self.epoch {
            debug!(
                kind = message.kind(),
                from,
                msg_epoch = message.epoch(),
                epoch = self.epoch,
                "Dropping message for another epoch"
            );
            return;
        }

        match message {
            ProtocolMessage::ObserveReq { round, query, .. } => {
                self.on_observe_req(from, round, query).await
            }
            ProtocolMessage::Observe {
                round,
                signed_observation,
                ..
            } => self.on_observe(from, round, signed_observation),
            ProtocolMessage::ReportReq {
                round,
                query,
                attributed_signed_observations,
                ..
            } => {
                self.on_report_req(from, round, query, attributed_signed_observations)
                    .await
            }
            ProtocolMessage::Report {
                round,
                attested_report,
                ..
            } => self.on_report(from, round, attested_report),
            ProtocolMessage::Final {
                round,
                extra_hash,
                attested_report,
                ..
            } => self.on_final(from, round, extra_hash, attested_report),
            other => debug!(kind = other.kind(), from, "Unexpected message in report generation"),
        }
    }

    fn emit_progress(&self) {
        if self
            .to_pacemaker
            .send(EventToPacemaker::Progress { epoch: self.epoch })
            .is_err()
        {
            debug!(epoch = self.epoch, "Pacemaker gone, dropping progress event");
        }
    }

    fn emit_change_leader(&self) {
        if self
            .to_pacemaker
            .send(EventToPacemaker::ChangeLeader { epoch: self.epoch })
            .is_err()
        {
            debug!(epoch = self.epoch, "Pacemaker gone, dropping change-leader event");
        }
    }
}

#[cfg(test)]
mod tests;
