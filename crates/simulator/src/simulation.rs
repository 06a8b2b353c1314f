//! Simulation driver.

use anyhow::{Context, Result};
use ocr_config::{Config, SharedConfig};
use ocr_protocol::{
    KeyedLeaderSelector, LeaderSelector, Oracle, OracleArgs, OracleHandle, ProtocolMessage,
};
use ocr_storage::MemoryDatabase;
use ocr_test_utils::{
    MedianPlugin, MemoryNetwork, MockContract, MockTransmitter, TestCommittee, Transmission,
};
use ocr_types::OracleId;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const BASE_VALUE: u64 = 1_000;
const NETWORK_CAPACITY: usize = 4096;

/// What to simulate.
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub oracles: usize,
    pub faults: usize,
    pub duration: Duration,
    pub crash_leader: bool,
    pub seed: u64,
    /// Timings and local settings to use instead of the fast defaults
    pub base: Option<Config>,
}

pub struct Simulation {
    options: SimulationOptions,
    committee: TestCommittee,
    network: Arc<MemoryNetwork<ProtocolMessage>>,
    contract: Arc<MockContract>,
    plugins: Vec<Arc<MedianPlugin>>,
    handles: Vec<Option<OracleHandle>>,
    selector: KeyedLeaderSelector,
    cancel: CancellationToken,
}

/// Committee config for `options`, keeping the generated committee and secrets.
fn shared_config(committee: &TestCommittee, options: &SimulationOptions) -> SharedConfig {
    let generated = committee.config();
    match &options.base {
        Some(base) => SharedConfig {
            config_digest: generated.config_digest,
            f: options.faults,
            leader_selection_key: generated.leader_selection_key,
            transmission_order_key: generated.transmission_order_key,
            oracles: generated.oracles.clone(),
            ..base.shared.clone()
        },
        None => generated.clone(),
    }
}

impl Simulation {
    /// Build the committee and spawn every oracle.
    pub fn start(options: SimulationOptions) -> Result<Self> {
        let mut committee = TestCommittee::with_seed(options.oracles, options.faults, options.seed);
        *committee.config_mut() = shared_config(&committee, &options);
        let config = committee.config().clone();
        config.validate().context("invalid committee configuration")?;

        let local = options
            .base
            .as_ref()
            .map(|base| base.local.clone())
            .unwrap_or_default();

        let quorum = config.report_quorum(true);
        let contract = Arc::new(MockContract::new(committee.onchain_public_keys(), quorum));
        let (network, inboxes) = MemoryNetwork::new(options.oracles, NETWORK_CAPACITY);
        let cancel = CancellationToken::new();

        let mut plugins = Vec::with_capacity(options.oracles);
        let mut handles = Vec::with_capacity(options.oracles);
        for (index, inbound) in inboxes.into_iter().enumerate() {
            let id = index as OracleId;
            let plugin = Arc::new(MedianPlugin::with_contract(
                BASE_VALUE + index as u64,
                contract.clone(),
            ));
            let oracle = Oracle::new(OracleArgs {
                config: config.clone(),
                local: local.clone(),
                oracle_id: id,
                endpoint: Arc::new(network.endpoint(id)),
                inbound,
                plugin: plugin.clone(),
                transmitter: Arc::new(MockTransmitter::new(
                    contract.clone(),
                    config.oracles[index].transmit_account.clone(),
                )),
                database: Arc::new(MemoryDatabase::new()),
                onchain_keyring: committee.onchain_keyring(id),
                offchain_keyring: committee.offchain_keyring(id),
                leader_selector: None,
            })
            .with_context(|| format!("failed to build oracle {}", id))?;

            plugins.push(plugin);
            handles.push(Some(oracle.spawn(cancel.child_token())));
        }

        info!(
            oracles = options.oracles,
            faults = options.faults,
            config_digest = %config.config_digest,
            duration_secs = options.duration.as_secs(),
            "Simulation started"
        );

        let selector = KeyedLeaderSelector::new(
            config.leader_selection_key,
            config.config_digest,
            options.oracles,
        );

        Ok(Self {
            options,
            committee,
            network,
            contract,
            plugins,
            handles,
            selector,
            cancel,
        })
    }

    /// Run for the configured duration, or until interrupted.
    pub async fn run(mut self) -> Summary {
        let started = Instant::now();
        let deadline = sleep(self.options.duration);
        tokio::pin!(deadline);
        let crash = sleep(self.options.duration / 3);
        tokio::pin!(crash);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut crashed = None;
        let mut ticks = interval(Duration::from_secs(1));
        let mut tick = 0u64;

        loop {
            tokio::select! {
                _ = &mut deadline => break,

                _ = &mut ctrl_c => {
                    warn!("Interrupted, stopping early");
                    break;
                }

                _ = &mut crash, if self.options.crash_leader && crashed.is_none() => {
                    crashed = Some(self.crash_current_leader().await);
                }

                _ = ticks.tick() => {
                    tick += 1;
                    for (index, plugin) in self.plugins.iter().enumerate() {
                        plugin.set_value(BASE_VALUE + tick * 10 + index as u64);
                    }
                }
            }
        }

        self.cancel.cancel();
        for handle in self.handles.into_iter().flatten() {
            handle.shutdown().await;
        }

        Summary {
            elapsed: started.elapsed(),
            oracles: self.committee.n(),
            crashed,
            transmissions: self.contract.transmissions(),
            rejected: self.contract.rejected_count(),
            dropped_messages: self.network.dropped(),
        }
    }

    /// Take the leader of the latest transmitted epoch offline and stop it.
    async fn crash_current_leader(&mut self) -> OracleId {
        let epoch = self.contract.latest().map(|er| er.epoch).unwrap_or(0);
        let leader = self.selector.leader(epoch);
        warn!(leader, epoch, "Crashing leader");

        self.network.set_online(leader, false);
        if let Some(handle) = self.handles[leader as usize].take() {
            handle.shutdown().await;
        }
        leader
    }
}

/// What reached the contract.
#[derive(Debug)]
pub struct Summary {
    pub elapsed: Duration,
    pub oracles: usize,
    pub crashed: Option<OracleId>,
    pub transmissions: Vec<Transmission>,
    pub rejected: usize,
    pub dropped_messages: u64,
}

impl Summary {
    /// Accepted transmissions per epoch.
    pub fn per_epoch(&self) -> BTreeMap<u32, usize> {
        let mut counts = BTreeMap::new();
        for t in &self.transmissions {
            *counts.entry(t.context.report_timestamp.epoch).or_insert(0) += 1;
        }
        counts
    }

    /// Accepted transmissions per submitting account.
    pub fn per_transmitter(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for t in &self.transmissions {
            *counts.entry(t.from.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn print(&self) {
        println!();
        println!("Simulation summary");
        println!("==================");
        println!("  Oracles:          {}", self.oracles);
        println!("  Elapsed:          {:.1}s", self.elapsed.as_secs_f64());
        if let Some(crashed) = self.crashed {
            println!("  Crashed leader:   {}", crashed);
        }
        println!("  Transmissions:    {}", self.transmissions.len());
        println!("  Rejected:         {}", self.rejected);
        println!("  Dropped messages: {}", self.dropped_messages);
        if let Some(last) = self.transmissions.last() {
            println!(
                "  Last report:      {} = {:?}",
                last.context.report_timestamp.epoch_round(),
                MedianPlugin::decode_report(&last.report)
            );
        }

        println!();
        println!("  Per epoch:");
        for (epoch, count) in self.per_epoch() {
            println!("    {:>6}  {}", epoch, count);
        }

        println!();
        println!("  Per transmitter:");
        for (account, count) in self.per_transmitter() {
            println!("    {}  {}", account, count);
        }
    }
}
