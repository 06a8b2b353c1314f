//! # Pacemaker
//!
//! Decides which epoch the oracle is in and who leads it. It owns the one
//! live report generation instance and replaces it on every epoch change.
//!
//! ## Epoch Change
//!
//! ```text
//!   ChangeLeader / no progress for delta_progress
//!            │
//!            ▼
//!   broadcast NewEpoch(max(e+1, ne))        ◄── every delta_resend: NewEpoch(ne)
//!            │
//!   NewEpoch(e') from j: newepoch[j] = max(newepoch[j], e')
//!            │
//!            ├── > F requests above ne:  join the (F+1)-th highest
//!            │
//!            └── > 2F requests above e:  e = (2F+1)-th highest
//!                                        persist, replace report generation
//! ```
//!
//! State is persisted before a transition takes effect, so a restarted
//! oracle never goes back to an epoch it already left.

use crate::context::OracleContext;
use crate::events::{EventToPacemaker, FinalizedReport};
use crate::leader_selection::LeaderSelector;
use crate::messages::ProtocolMessage;
use crate::report_generation::{Inbound, ReportGeneration};
use crate::sender::MessageSender;
use crate::timed::sleep_until_opt;
use ocr_core::Database;
use ocr_types::{Epoch, OracleId, PacemakerState};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// A running report generation instance.
struct Instance {
    epoch: Epoch,
    cancel: CancellationToken,
    handle: JoinHandle<Inbound>,
}

pub(crate) struct Pacemaker {
    ctx: Arc<OracleContext>,
    sender: MessageSender,
    db: Arc<dyn Database>,
    selector: Arc<dyn LeaderSelector>,

    /// Current epoch
    epoch: Epoch,
    /// Leader of `epoch`
    leader: OracleId,
    /// Highest epoch we have asked for
    ne: Epoch,
    /// Highest epoch each oracle has asked for
    newepoch: Vec<Epoch>,

    progress_deadline: Option<Instant>,
    resend_deadline: Option<Instant>,

    to_pacemaker: mpsc::UnboundedSender<EventToPacemaker>,
    to_finalization: mpsc::UnboundedSender<FinalizedReport>,

    instance: Option<Instance>,
    /// Report generation inbound while no instance holds it
    rg_inbound: Option<Inbound>,
    cancel: CancellationToken,
}

impl Pacemaker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: Arc<OracleContext>,
        sender: MessageSender,
        db: Arc<dyn Database>,
        selector: Arc<dyn LeaderSelector>,
        to_pacemaker: mpsc::UnboundedSender<EventToPacemaker>,
        to_finalization: mpsc::UnboundedSender<FinalizedReport>,
        rg_inbound: Inbound,
        cancel: CancellationToken,
    ) -> Self {
        let n = ctx.n();
        let leader = selector.leader(0);
        Self {
            ctx,
            sender,
            db,
            selector,
            epoch: 0,
            leader,
            ne: 0,
            newepoch: vec![0; n],
            progress_deadline: None,
            resend_deadline: None,
            to_pacemaker,
            to_finalization,
            instance: None,
            rg_inbound: Some(rg_inbound),
            cancel,
        }
    }

    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<EventToPacemaker>,
        mut new_epochs: mpsc::Receiver<(Epoch, OracleId)>,
    ) {
        self.start().await;
        let cancel = self.cancel.clone();

        loop {
            let progress_deadline = self.progress_deadline;
            let resend_deadline = self.resend_deadline;

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },

                msg = new_epochs.recv() => match msg {
                    Some((epoch, from)) => self.on_new_epoch(from, epoch).await,
                    None => break,
                },

                _ = sleep_until_opt(progress_deadline) => self.on_progress_timeout().await,

                _ = sleep_until_opt(resend_deadline) => self.on_resend(),
            }
        }

        self.stop_instance().await;
        debug!(epoch = self.epoch, "Pacemaker stopped");
    }

    /// Restore persisted state and start the first instance.
    pub(crate) async fn start(&mut self) {
        let digest = self.ctx.config.config_digest;
        let restored = match tokio::time::timeout(
            self.ctx.local.database_timeout(),
            self.db.read_pacemaker_state(digest),
        )
        .await
        {
            Ok(Ok(state)) => state,
            Ok(Err(e)) => {
                error!("Failed to read pacemaker state: {}", e);
                None
            }
            Err(_) => {
                error!("Reading pacemaker state timed out");
                None
            }
        };

        if let Some(state) = restored {
            self.epoch = state.epoch;
            self.ne = state.highest_sent_epoch.max(state.epoch);
            self.leader = self.selector.leader(state.epoch);
            info!(
                epoch = self.epoch,
                ne = self.ne,
                leader = self.leader,
                "Restored pacemaker state"
            );
        }

        let now = Instant::now();
        self.progress_deadline = Some(now + self.ctx.config.delta_progress());
        self.resend_deadline = Some(now + self.ctx.config.delta_resend());
        self.start_instance();
    }

    pub(crate) async fn handle_event(&mut self, event: EventToPacemaker) {
        if event.epoch() != self.epoch {
            debug!(
                event_epoch = event.epoch(),
                epoch = self.epoch,
                "Ignoring event for another epoch"
            );
            return;
        }

        match event {
            EventToPacemaker::Progress { .. } => {
                self.progress_deadline = Some(Instant::now() + self.ctx.config.delta_progress());
            }
            EventToPacemaker::ChangeLeader { .. } => {
                info!(epoch = self.epoch, leader = self.leader, "Leader change requested");
                self.request_next_epoch().await;
            }
        }
    }

    pub(crate) async fn on_progress_timeout(&mut self) {
        self.progress_deadline = None;
        warn!(
            epoch = self.epoch,
            leader = self.leader,
            "No progress within delta_progress, requesting new epoch"
        );
        self.request_next_epoch().await;
    }

    fn on_resend(&mut self) {
        self.sender
            .broadcast(ProtocolMessage::NewEpoch { epoch: self.ne });
        self.resend_deadline = Some(Instant::now() + self.ctx.config.delta_resend());
    }

    async fn request_next_epoch(&mut self) {
        let Some(next) = self.epoch.checked_add(1) else {
            error!(epoch = self.epoch, "Epoch space exhausted, cannot advance");
            return;
        };
        self.send_new_epoch(next.max(self.ne)).await;
    }

    async fn send_new_epoch(&mut self, epoch: Epoch) {
        if epoch != self.ne {
            self.ne = epoch;
            self.persist().await;
        }
        debug!(epoch, current = self.epoch, "Broadcasting NewEpoch");
        self.sender.broadcast(ProtocolMessage::NewEpoch { epoch });
        self.resend_deadline = Some(Instant::now() + self.ctx.config.delta_resend());
    }

    pub(crate) async fn on_new_epoch(&mut self, from: OracleId, epoch: Epoch) {
        let Some(seen) = self.newepoch.get_mut(from as usize) else {
            warn!(from, "Dropping NewEpoch from unknown oracle");
            return;
        };
        if epoch <= *seen {
            return;
        }
        *seen = epoch;

        let f = self.ctx.config.f;

        // F+1 requests above ne include an honest one: join it
        if let Some(candidate) = self.kth_highest_above(self.ne, f + 1) {
            debug!(candidate, ne = self.ne, "Joining epoch requested by F+1 oracles");
            self.send_new_epoch(candidate).await;
        }

        // 2F+1 requests above e: enough honest oracles have moved on
        if let Some(target) = self.kth_highest_above(self.epoch, 2 * f + 1) {
            self.enter_epoch(target).await;
        }
    }

    /// The `k`-th highest requested epoch among those strictly above `floor`.
    fn kth_highest_above(&self, floor: Epoch, k: usize) -> Option<Epoch> {
        let mut above: Vec<Epoch> = self.newepoch.iter().copied().filter(|&e| e > floor).collect();
        if above.len() < k {
            return None;
        }
        above.sort_unstable_by(|a, b| b.cmp(a));
        above.get(k - 1).copied()
    }

    async fn enter_epoch(&mut self, epoch: Epoch) {
        let previous = self.epoch;
        self.epoch = epoch;
        self.leader = self.selector.leader(epoch);
        self.ne = self.ne.max(epoch);

        info!(
            from_epoch = previous,
            epoch,
            leader = self.leader,
            "Entering new epoch"
        );
        self.persist().await;

        self.stop_instance().await;
        self.start_instance();
        self.progress_deadline = Some(Instant::now() + self.ctx.config.delta_progress());
    }

    async fn persist(&self) {
        let state = PacemakerState {
            epoch: self.epoch,
            highest_sent_epoch: self.ne,
            leader: self.leader,
        };
        match tokio::time::timeout(
            self.ctx.local.database_timeout(),
            self.db
                .write_pacemaker_state(self.ctx.config.config_digest, state),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(epoch = self.epoch, "Failed to persist pacemaker state: {}", e),
            Err(_) => error!(epoch = self.epoch, "Persisting pacemaker state timed out"),
        }
    }

    fn start_instance(&mut self) {
        debug_assert!(self.instance.is_none());
        let Some(inbound) = self.rg_inbound.take() else {
            error!(epoch = self.epoch, "Report generation inbound lost, not starting instance");
            return;
        };

        let cancel = self.cancel.child_token();
        let rg = ReportGeneration::new(
            self.ctx.clone(),
            self.sender.clone(),
            self.epoch,
            self.leader,
            self.to_pacemaker.clone(),
            self.to_finalization.clone(),
        );
        let span = info_span!(
            "report_generation",
            oracle = self.ctx.id,
            epoch = self.epoch,
            leader = self.leader
        );
        let handle = tokio::spawn(rg.run(inbound, cancel.clone()).instrument(span));
        self.instance = Some(Instance {
            epoch: self.epoch,
            cancel,
            handle,
        });
    }

    async fn stop_instance(&mut self) {
        let Some(instance) = self.instance.take() else {
            return;
        };
        instance.cancel.cancel();
        match instance.handle.await {
            Ok(inbound) => self.rg_inbound = Some(inbound),
            Err(e) => error!(epoch = instance.epoch, "Report generation task failed: {}", e),
        }
    }
}
