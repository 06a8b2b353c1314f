//! # Transmission
//!
//! Schedules finalized reports for on-chain submission and submits them
//! when their stage delay has elapsed.
//!
//! ```text
//! EventTransmit ──► should_accept? ──► delay = stage × delta_stage
//!                                        │
//!                          persist ◄─────┤
//!                                        ▼
//!                                  scheduling heap
//!                                        │ due
//!                                        ▼
//!                  delete ◄── should_transmit? ──► transmit
//! ```
//!
//! Pending transmissions are persisted so a restarted oracle picks up where
//! it left off. Entries older than the expiration window are discarded on
//! restart; the rest fire at their original deadline, immediately if it has
//! already passed.

use crate::context::OracleContext;
use crate::events::FinalizedReport;
use crate::heap::{ScheduledTransmission, TransmissionHeap};
use crate::persistence::PersistenceHandle;
use crate::report_finalization::expiration_age_rounds;
use crate::schedule::transmission_delay;
use crate::timed::{sleep_until_opt, timed_call};
use ocr_core::{ContractTransmitter, Database};
use ocr_types::{PendingTransmission, ReportContext};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub(crate) struct Transmission {
    ctx: Arc<OracleContext>,
    db: Arc<dyn Database>,
    transmitter: Arc<dyn ContractTransmitter>,
    persistence: PersistenceHandle,
    heap: TransmissionHeap,
}

impl Transmission {
    pub fn new(
        ctx: Arc<OracleContext>,
        db: Arc<dyn Database>,
        transmitter: Arc<dyn ContractTransmitter>,
        persistence: PersistenceHandle,
    ) -> Self {
        Self {
            ctx,
            db,
            transmitter,
            persistence,
            heap: TransmissionHeap::new(),
        }
    }

    /// Age after which a pending transmission is no longer worth sending.
    fn expiration_window(&self) -> Duration {
        let delta_round = self.ctx.config.delta_round();
        delta_round.saturating_mul(expiration_age_rounds(delta_round) as u32)
    }

    pub async fn run(
        mut self,
        mut from_finalization: mpsc::UnboundedReceiver<FinalizedReport>,
        cancel: CancellationToken,
    ) {
        self.restore().await;
        info!(scheduled = self.heap.len(), "Starting transmission");

        loop {
            let next_due = self.heap.next_due();

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                event = from_finalization.recv() => match event {
                    Some(report) => self.on_finalized(report).await,
                    None => break,
                },

                _ = sleep_until_opt(next_due) => self.on_timer().await,
            }
        }

        debug!(scheduled = self.heap.len(), "Transmission stopped");
    }

    /// Reload pending transmissions persisted before a restart.
    async fn restore(&mut self) {
        let timeout = self.ctx.local.database_timeout();
        let digest = self.ctx.config.config_digest;
        let now_wall = SystemTime::now();
        let cutoff = now_wall.checked_sub(self.expiration_window());

        if let Some(cutoff) = cutoff {
            let deleted = self.db.delete_pending_transmissions_older_than(cutoff);
            match tokio::time::timeout(timeout, deleted).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Failed to delete expired pending transmissions: {}", e),
                Err(_) => error!("Deleting expired pending transmissions timed out"),
            }
        }

        let pending = match tokio::time::timeout(
            timeout,
            self.db.pending_transmissions_with_config_digest(digest),
        )
        .await
        {
            Ok(Ok(pending)) => pending,
            Ok(Err(e)) => {
                error!("Failed to load pending transmissions: {}", e);
                return;
            }
            Err(_) => {
                error!("Loading pending transmissions timed out");
                return;
            }
        };

        let now = Instant::now();
        let mut restored = 0usize;
        for (timestamp, pending) in pending {
            if cutoff.is_some_and(|cutoff| pending.time < cutoff) {
                self.persistence.delete(timestamp);
                continue;
            }
            let due = match pending.time.duration_since(now_wall) {
                Ok(remaining) => now + remaining,
                Err(_) => now,
            };
            self.heap.push(ScheduledTransmission {
                due,
                timestamp,
                pending,
            });
            restored += 1;
        }

        if restored > 0 {
            info!(restored, "Restored pending transmissions");
        }
    }

    pub(crate) async fn on_finalized(&mut self, report: FinalizedReport) {
        let ctx = self.ctx.clone();
        let ts = report.timestamp;

        let accepted = timed_call(
            "should_accept_finalized_report",
            ctx.config.max_duration_should_accept(),
            ctx.call_grace(),
            ctx.plugin
                .should_accept_finalized_report(&ts, &report.attested_report.report),
        )
        .await;
        match accepted {
            Ok(true) => {}
            Ok(false) => {
                debug!(%ts, "Plugin declined finalized report");
                return;
            }
            Err(e) => {
                error!(%ts, "Failed to check finalized report: {}", e);
                return;
            }
        }

        let Some(delay) = transmission_delay(
            &ctx.config.transmission_order_key,
            &ts,
            ctx.n(),
            ctx.id,
            &ctx.config.s,
            ctx.config.delta_stage(),
        ) else {
            debug!(%ts, "Not in any transmission stage for this report");
            return;
        };

        let pending = PendingTransmission {
            time: SystemTime::now() + delay,
            extra_hash: report.extra_hash,
            report: report.attested_report.report,
            attributed_signatures: report.attested_report.attributed_signatures,
        };
        self.persistence.store(ts, pending.clone());
        self.heap.push(ScheduledTransmission {
            due: Instant::now() + delay,
            timestamp: ts,
            pending,
        });
        debug!(%ts, delay_ms = delay.as_millis() as u64, "Scheduled transmission");
    }

    pub(crate) async fn on_timer(&mut self) {
        let now = Instant::now();
        while let Some(entry) = self.heap.pop_due(now) {
            self.transmit(entry).await;
        }
    }

    async fn transmit(&self, entry: ScheduledTransmission) {
        let ctx = &self.ctx;
        let ts = entry.timestamp;
        let pending = entry.pending;
        self.persistence.delete(ts);

        let should_transmit = timed_call(
            "should_transmit_accepted_report",
            ctx.config.max_duration_should_transmit(),
            ctx.call_grace(),
            ctx.plugin.should_transmit_accepted_report(&ts, &pending.report),
        )
        .await;
        match should_transmit {
            Ok(true) => {}
            Ok(false) => {
                debug!(%ts, "Report no longer needs transmitting");
                return;
            }
            Err(e) => {
                error!(%ts, "Failed to check accepted report: {}", e);
                return;
            }
        }

        let context = ReportContext::new(ts, pending.extra_hash);
        let result = timed_call(
            "transmit",
            ctx.local.transmit_timeout(),
            ctx.call_grace(),
            self.transmitter
                .transmit(&context, &pending.report, &pending.attributed_signatures),
        )
        .await;
        match result {
            Ok(()) => info!(%ts, "Transmitted report"),
            Err(e) => warn!(%ts, "Failed to transmit report: {}", e),
        }
    }
}
