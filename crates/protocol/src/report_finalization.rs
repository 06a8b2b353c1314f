//! # Report Finalization
//!
//! Deduplicates final reports coming from our own report generation
//! (`EventFinal`) and from other oracles (`FinalEcho`), and hands each
//! `(epoch, round)` to transmission at most once.
//!
//! ```text
//! EventFinal ──┐
//!              ├──► digest? expired? seen? quorum valid? ──► insert
//! FinalEcho ───┘                                              │
//!                                       broadcast FinalEcho ◄─┤
//!                                       EventTransmit ◄───────┘
//! ```
//!
//! Echoing lets an oracle that missed the leader's `Final` still transmit.
//! The finalized set only remembers a bounded window behind the latest
//! finalized round; anything older is treated as expired.

use crate::context::OracleContext;
use crate::events::FinalizedReport;
use crate::messages::ProtocolMessage;
use crate::sender::MessageSender;
use ocr_types::{EpochRound, OracleId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How far back the finalized set remembers.
const EXPIRATION_HORIZON: Duration = Duration::from_secs(10 * 60);

const MIN_EXPIRATION_AGE_ROUNDS: u64 = 10;
const MAX_EXPIRATION_AGE_ROUNDS: u64 = 1000;

/// Number of rounds (or epochs) behind the latest finalized report after
/// which a report counts as expired.
///
/// `clamp(10 min / delta_round, 10, 1000)`
pub fn expiration_age_rounds(delta_round: Duration) -> u64 {
    let rounds = match EXPIRATION_HORIZON.as_nanos().checked_div(delta_round.as_nanos()) {
        Some(rounds) => u64::try_from(rounds).unwrap_or(u64::MAX),
        None => MAX_EXPIRATION_AGE_ROUNDS,
    };
    rounds.clamp(MIN_EXPIRATION_AGE_ROUNDS, MAX_EXPIRATION_AGE_ROUNDS)
}

/// What [`ReportFinalization::finalize`] did with a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// New report, forwarded to transmission
    Finalized,
    /// `(epoch, round)` already finalized
    Duplicate,
    /// Too far behind the latest finalized report
    Expired,
    /// Produced under another configuration
    WrongConfig,
    /// Signatures do not form a valid quorum
    InvalidSignatures,
}

/// In u64 so `epoch + age` cannot overflow.
fn is_expired(epoch_round: EpochRound, latest: EpochRound, age: u64) -> bool {
    (epoch_round.epoch as u64) + age < latest.epoch as u64
        || (epoch_round.epoch == latest.epoch
            && (epoch_round.round as u64) + age < latest.round as u64)
}

pub(crate) struct ReportFinalization {
    ctx: Arc<OracleContext>,
    sender: MessageSender,
    to_transmission: mpsc::UnboundedSender<FinalizedReport>,
    finalized: HashSet<EpochRound>,
    latest: EpochRound,
    expiration_age: u64,
}

impl ReportFinalization {
    pub fn new(
        ctx: Arc<OracleContext>,
        sender: MessageSender,
        to_transmission: mpsc::UnboundedSender<FinalizedReport>,
    ) -> Self {
        let expiration_age = expiration_age_rounds(ctx.config.delta_round());
        Self {
            ctx,
            sender,
            to_transmission,
            finalized: HashSet::new(),
            latest: EpochRound::default(),
            expiration_age,
        }
    }

    pub async fn run(
        mut self,
        mut from_report_generation: mpsc::UnboundedReceiver<FinalizedReport>,
        mut echoes: mpsc::Receiver<(FinalizedReport, OracleId)>,
        cancel: CancellationToken,
    ) {
        info!(expiration_age = self.expiration_age, "Starting report finalization");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                event = from_report_generation.recv() => match event {
                    Some(report) => {
                        self.finalize(report);
                    }
                    None => break,
                },

                echo = echoes.recv() => match echo {
                    Some((report, from)) => {
                        let outcome = self.finalize(report);
                        debug!(from, ?outcome, "Handled FinalEcho");
                    }
                    None => break,
                },
            }
        }

        debug!("Report finalization stopped");
    }

    fn is_expired(&self, epoch_round: EpochRound) -> bool {
        is_expired(epoch_round, self.latest, self.expiration_age)
    }

    fn reap(&mut self) {
        if self.finalized.len() as u64 <= 2 * self.expiration_age {
            return;
        }
        let before = self.finalized.len();
        let age = self.expiration_age;
        let latest = self.latest;
        self.finalized.retain(|er| !is_expired(*er, latest, age));
        debug!(
            before,
            after = self.finalized.len(),
            "Reaped expired finalized rounds"
        );
    }

    /// Run one report through dedupe, expiry and verification.
    pub fn finalize(&mut self, report: FinalizedReport) -> FinalizeOutcome {
        let ts = report.timestamp;
        let epoch_round = ts.epoch_round();

        if ts.config_digest != self.ctx.config.config_digest {
            warn!(
                digest = %ts.config_digest,
                "Dropping final report for another configuration"
            );
            return FinalizeOutcome::WrongConfig;
        }
        if self.is_expired(epoch_round) {
            debug!(%epoch_round, latest = %self.latest, "Dropping expired final report");
            return FinalizeOutcome::Expired;
        }
        if self.finalized.contains(&epoch_round) {
            return FinalizeOutcome::Duplicate;
        }
        if let Err(e) = report.attested_report.verify_signatures(
            self.ctx.onchain_keyring.as_ref(),
            &self.ctx.config.oracles,
            &report.context(),
            self.ctx.report_quorum(),
        ) {
            warn!(%epoch_round, "Dropping final report: {}", e);
            return FinalizeOutcome::InvalidSignatures;
        }

        self.finalized.insert(epoch_round);
        if epoch_round > self.latest {
            self.latest = epoch_round;
        }
        info!(%epoch_round, "Report finalized");

        self.sender.broadcast_to_others(ProtocolMessage::FinalEcho {
            timestamp: ts,
            extra_hash: report.extra_hash,
            attested_report: report.attested_report.clone(),
        });
        if self.to_transmission.send(report).is_err() {
            debug!(%epoch_round, "Transmission gone, dropping finalized report");
        }

        self.reap();
        FinalizeOutcome::Finalized
    }
}
