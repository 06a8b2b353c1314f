//! # Oracle
//!
//! Assembles one oracle for one configuration and runs it as a set of tasks
//! sharing a cancellation token.
//!
//! ```text
//!  network inbound ──┐
//!                    ├─► demux ──► NewEpoch ──────────► pacemaker ──► report generation
//!  loopback ─────────┘       ├──► round messages ─────────────────────────┘     │
//!                            └──► FinalEcho ──► finalization ◄── EventFinal ────┘
//!                                                   │
//!                                                   ▼ EventTransmit
//!                                              transmission ──► persistence
//! ```

use crate::context::OracleContext;
use crate::error::{ProtocolError, ProtocolResult};
use crate::events::FinalizedReport;
use crate::leader_selection::{KeyedLeaderSelector, LeaderSelector};
use crate::messages::ProtocolMessage;
use crate::pacemaker::Pacemaker;
use crate::persistence::{self, run_persistence};
use crate::report_finalization::ReportFinalization;
use crate::sender::MessageSender;
use crate::taper::Taper;
use crate::transmission::Transmission;
use ocr_config::{LocalConfig, SharedConfig};
use ocr_core::{
    ContractTransmitter, Database, NetworkEndpoint, OffchainKeyring, OnchainKeyring,
    ReportingPlugin,
};
use ocr_types::{Epoch, OracleId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Everything an oracle needs from its environment.
pub struct OracleArgs {
    /// Committee and protocol parameters
    pub config: SharedConfig,
    /// Node-local settings
    pub local: LocalConfig,
    /// Our index in `config.oracles`
    pub oracle_id: OracleId,
    /// Outbound transport
    pub endpoint: Arc<dyn NetworkEndpoint<ProtocolMessage>>,
    /// Inbound transport, `(message, sender)`
    pub inbound: mpsc::Receiver<(ProtocolMessage, OracleId)>,
    /// Reporting plugin
    pub plugin: Arc<dyn ReportingPlugin>,
    /// On-chain submission
    pub transmitter: Arc<dyn ContractTransmitter>,
    /// Crash-recovery storage
    pub database: Arc<dyn Database>,
    /// Report attestation key
    pub onchain_keyring: Arc<dyn OnchainKeyring>,
    /// Observation signing key
    pub offchain_keyring: Arc<dyn OffchainKeyring>,
    /// Leader selection; keyed by `config.leader_selection_key` when `None`
    pub leader_selector: Option<Arc<dyn LeaderSelector>>,
}

/// A validated, not yet running oracle.
pub struct Oracle {
    ctx: Arc<OracleContext>,
    endpoint: Arc<dyn NetworkEndpoint<ProtocolMessage>>,
    inbound: mpsc::Receiver<(ProtocolMessage, OracleId)>,
    transmitter: Arc<dyn ContractTransmitter>,
    database: Arc<dyn Database>,
    leader_selector: Arc<dyn LeaderSelector>,
}

impl std::fmt::Debug for Oracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Oracle")
            .field("id", &self.ctx.id)
            .field("config_digest", &self.ctx.config.config_digest)
            .finish_non_exhaustive()
    }
}

impl Oracle {
    /// Validate `args` and build the oracle.
    pub fn new(args: OracleArgs) -> ProtocolResult<Self> {
        args.config.validate()?;
        args.local.validate()?;

        let n = args.config.n();
        let id = args.oracle_id;
        let identity = args
            .config
            .oracles
            .get(id as usize)
            .ok_or(ProtocolError::OracleIdOutOfRange { id, n })?;

        if args.onchain_keyring.public_key() != identity.onchain_public_key {
            return Err(ProtocolError::KeyMismatch {
                id,
                which: "onchain",
            });
        }
        if args.offchain_keyring.offchain_public_key() != identity.offchain_public_key {
            return Err(ProtocolError::KeyMismatch {
                id,
                which: "offchain",
            });
        }

        let plugin_info = args.plugin.info();
        if plugin_info.max_observation_length == 0 {
            return Err(ProtocolError::InvalidPluginInfo(
                "max_observation_length must be positive".to_string(),
            ));
        }
        if plugin_info.max_report_length == 0 {
            return Err(ProtocolError::InvalidPluginInfo(
                "max_report_length must be positive".to_string(),
            ));
        }

        let leader_selector = args.leader_selector.unwrap_or_else(|| {
            Arc::new(KeyedLeaderSelector::new(
                args.config.leader_selection_key,
                args.config.config_digest,
                n,
            ))
        });

        let ctx = Arc::new(OracleContext {
            id,
            config: args.config,
            local: args.local,
            plugin: args.plugin,
            plugin_info,
            onchain_keyring: args.onchain_keyring,
            offchain_keyring: args.offchain_keyring,
        });

        Ok(Self {
            ctx,
            endpoint: args.endpoint,
            inbound: args.inbound,
            transmitter: args.transmitter,
            database: args.database,
            leader_selector,
        })
    }

    /// Our oracle id
    pub fn id(&self) -> OracleId {
        self.ctx.id
    }

    /// Start every task. Cancelling `cancel` (or calling [`OracleHandle::shutdown`]) stops them.
    pub fn spawn(self, cancel: CancellationToken) -> OracleHandle {
        let ctx = self.ctx;
        let local = &ctx.local;
        let cancel = cancel.child_token();
        let digest = ctx.config.config_digest;

        info!(
            oracle = ctx.id,
            config_digest = %digest,
            n = ctx.n(),
            f = ctx.config.f,
            plugin = %ctx.plugin_info.name,
            "Starting oracle"
        );

        let (loopback_tx, loopback_rx) = mpsc::channel(local.loopback_capacity);
        let sender = MessageSender::new(ctx.id, self.endpoint, loopback_tx);

        let (new_epoch_tx, new_epoch_rx) = mpsc::channel(local.inbound_capacity);
        let (rg_tx, rg_rx) = mpsc::channel(local.inbound_capacity);
        let (echo_tx, echo_rx) = mpsc::channel(local.inbound_capacity);
        let (pacemaker_tx, pacemaker_rx) = mpsc::unbounded_channel();
        let (final_tx, final_rx) = mpsc::unbounded_channel();
        let (transmit_tx, transmit_rx) = mpsc::unbounded_channel();
        let (persistence, persistence_rx) = persistence::channel(local.persistence_capacity);

        let mut tasks = Vec::with_capacity(5);

        let demux = Demux {
            id: ctx.id,
            n: ctx.n(),
            new_epoch: new_epoch_tx,
            report_generation: rg_tx,
            echoes: echo_tx,
            dropped: Taper::new(),
        };
        tasks.push(tokio::spawn(
            demux
                .run(self.inbound, loopback_rx, cancel.clone())
                .instrument(info_span!("demux", oracle = ctx.id)),
        ));

        let pacemaker = Pacemaker::new(
            ctx.clone(),
            sender.clone(),
            self.database.clone(),
            self.leader_selector,
            pacemaker_tx,
            final_tx,
            rg_rx,
            cancel.clone(),
        );
        tasks.push(tokio::spawn(
            pacemaker
                .run(pacemaker_rx, new_epoch_rx)
                .instrument(info_span!("pacemaker", oracle = ctx.id, config_digest = %digest)),
        ));

        let finalization = ReportFinalization::new(ctx.clone(), sender, transmit_tx);
        tasks.push(tokio::spawn(
            finalization
                .run(final_rx, echo_rx, cancel.clone())
                .instrument(info_span!("finalization", oracle = ctx.id, config_digest = %digest)),
        ));

        let transmission = Transmission::new(
            ctx.clone(),
            self.database.clone(),
            self.transmitter,
            persistence,
        );
        tasks.push(tokio::spawn(
            transmission
                .run(transmit_rx, cancel.clone())
                .instrument(info_span!("transmission", oracle = ctx.id, config_digest = %digest)),
        ));

        tasks.push(tokio::spawn(
            run_persistence(
                self.database,
                persistence_rx,
                ctx.local.database_timeout(),
                cancel.clone(),
            )
            .instrument(info_span!("persistence", oracle = ctx.id)),
        ));

        OracleHandle {
            id: ctx.id,
            cancel,
            tasks,
        }
    }
}

/// Handle to a running oracle.
#[derive(Debug)]
pub struct OracleHandle {
    id: OracleId,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl OracleHandle {
    /// Oracle id
    pub fn id(&self) -> OracleId {
        self.id
    }

    /// Token cancelling every task of this oracle.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop every task and wait for them to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(oracle = self.id, "Oracle task failed: {}", e);
            }
        }
        info!(oracle = self.id, "Oracle stopped");
    }
}

/// Routes inbound traffic to the task that consumes it.
struct Demux {
    id: OracleId,
    n: usize,
    new_epoch: mpsc::Sender<(Epoch, OracleId)>,
    report_generation: mpsc::Sender<(ProtocolMessage, OracleId)>,
    echoes: mpsc::Sender<(FinalizedReport, OracleId)>,
    dropped: Taper,
}

impl Demux {
    async fn run(
        self,
        mut network: mpsc::Receiver<(ProtocolMessage, OracleId)>,
        mut loopback: mpsc::Receiver<ProtocolMessage>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                msg = loopback.recv() => match msg {
                    Some(message) => self.route(message, self.id),
                    None => break,
                },

                msg = network.recv() => match msg {
                    Some((message, from)) => self.route(message, from),
                    None => {
                        debug!("Network inbound closed");
                        break;
                    }
                },
            }
        }
        debug!("Demux stopped");
    }

    fn route(&self, message: ProtocolMessage, from: OracleId) {
        if from as usize >= self.n {
            warn!(from, kind = message.kind(), "Dropping message from unknown sender");
            return;
        }

        let kind = message.kind();
        let delivered = match message {
            ProtocolMessage::NewEpoch { epoch } => {
                forward(&self.new_epoch, (epoch, from))
            }
            ProtocolMessage::FinalEcho {
                timestamp,
                extra_hash,
                attested_report,
            } => forward(
                &self.echoes,
                (
                    FinalizedReport {
                        timestamp,
                        extra_hash,
                        attested_report,
                    },
                    from,
                ),
            ),
            round_message => forward(&self.report_generation, (round_message, from)),
        };

        match delivered {
            Delivery::Sent => {}
            Delivery::Full => self.dropped.trigger(|count| {
                warn!(kind, from, dropped = count, "Inbound queue full, dropping messages");
            }),
            Delivery::Closed => debug!(kind, from, "Consumer gone, dropping message"),
        }
    }
}

enum Delivery {
    Sent,
    Full,
    Closed,
}

fn forward<T>(tx: &mpsc::Sender<T>, item: T) -> Delivery {
    match tx.try_send(item) {
        Ok(()) => Delivery::Sent,
        Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
        Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
    }
}
