//! Per-oracle collaborators and configuration shared by every task.

use ocr_config::{LocalConfig, SharedConfig};
use ocr_core::{OffchainKeyring, OnchainKeyring, ReportingPlugin, ReportingPluginInfo};
use ocr_types::{Epoch, OracleId, OracleIdentity, ReportTimestamp, Round};
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct OracleContext {
    pub id: OracleId,
    pub config: SharedConfig,
    pub local: LocalConfig,
    pub plugin: Arc<dyn ReportingPlugin>,
    pub plugin_info: ReportingPluginInfo,
    pub onchain_keyring: Arc<dyn OnchainKeyring>,
    pub offchain_keyring: Arc<dyn OffchainKeyring>,
}

impl OracleContext {
    pub fn n(&self) -> usize {
        self.config.n()
    }

    pub fn report_quorum(&self) -> usize {
        self.config.report_quorum(self.plugin_info.unique_reports)
    }

    pub fn timestamp(&self, epoch: Epoch, round: Round) -> ReportTimestamp {
        ReportTimestamp::new(self.config.config_digest, epoch, round)
    }

    pub fn identity(&self, id: OracleId) -> Option<&OracleIdentity> {
        self.config.oracles.get(id as usize)
    }

    pub fn call_grace(&self) -> Duration {
        self.local.call_warning_grace()
    }
}
