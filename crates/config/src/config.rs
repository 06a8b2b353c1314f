//! Main configuration module
//!
//! `[shared]` must be byte-identical across the committee: it is what the
//! config digest names. `[local]` and `[logging]` may differ per node.

use crate::error::{ConfigError, ConfigResult};
use ocr_types::{ConfigDigest, OracleIdentity, MAX_ORACLES};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Full configuration of one oracle.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Committee-wide parameters
    pub shared: SharedConfig,

    /// Per-node settings
    #[serde(default)]
    pub local: LocalConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Returns
    ///
    /// The parsed and validated configuration, or an error if loading fails.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        info!("Loading configuration from {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content)?;

        debug!("Configuration parsed successfully, validating...");
        config.validate()?;

        info!(
            "Configuration loaded: config_digest={}, n={}, f={}",
            config.shared.config_digest,
            config.shared.n(),
            config.shared.f
        );

        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> ConfigResult<()> {
        self.shared.validate()?;
        self.local.validate()?;
        self.logging.validate()?;

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }
}

// =============================================================================
// Shared Configuration
// =============================================================================

/// Parameters every committee member agrees on.
///
/// Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Identifier of this configuration
    pub config_digest: ConfigDigest,

    /// Number of Byzantine oracles tolerated
    pub f: usize,

    /// Rounds per epoch before the leader is rotated
    pub r_max: u8,

    /// Time without progress before an epoch change is requested
    pub delta_progress_ms: u64,

    /// Interval for re-broadcasting the pacemaker's epoch request
    pub delta_resend_ms: u64,

    /// Interval between round starts
    pub delta_round_ms: u64,

    /// Extra time the leader waits for late observations
    pub delta_grace_ms: u64,

    /// Delay between successive transmission stages
    pub delta_stage_ms: u64,

    /// Transmission schedule: `s[i]` oracles transmit in stage `i`
    pub s: Vec<usize>,

    /// Key seeding leader selection
    #[serde(with = "hex_key")]
    pub leader_selection_key: [u8; 32],

    /// Key seeding the per-round transmission order
    #[serde(with = "hex_key")]
    pub transmission_order_key: [u8; 32],

    /// Deadline for the plugin's query call
    #[serde(default = "default_plugin_call_ms")]
    pub max_duration_query_ms: u64,

    /// Deadline for the plugin's observation call
    #[serde(default = "default_plugin_call_ms")]
    pub max_duration_observation_ms: u64,

    /// Deadline for the plugin's report call
    #[serde(default = "default_plugin_call_ms")]
    pub max_duration_report_ms: u64,

    /// Deadline for the plugin's accept-finalized-report call
    #[serde(default = "default_plugin_call_ms")]
    pub max_duration_should_accept_ms: u64,

    /// Deadline for the plugin's transmit-accepted-report call
    #[serde(default = "default_plugin_call_ms")]
    pub max_duration_should_transmit_ms: u64,

    /// Committee members; an oracle's index here is its `OracleId`
    pub oracles: Vec<OracleIdentity>,
}

fn default_plugin_call_ms() -> u64 {
    1000
}

impl SharedConfig {
    /// Committee size.
    pub fn n(&self) -> usize {
        self.oracles.len()
    }

    /// Number of observations a report must be built from: strictly more than 2F.
    pub fn observation_quorum(&self) -> usize {
        2 * self.f + 1
    }

    /// Number of signatures an attested report carries.
    ///
    /// With unique reports a quorum of `⌊(N+F)/2⌋+1` guarantees two quorums for
    /// different reports intersect in an honest oracle. Otherwise `F+1`
    /// guarantees at least one honest signer.
    pub fn report_quorum(&self, unique_reports: bool) -> usize {
        if unique_reports {
            (self.n() + self.f) / 2 + 1
        } else {
            self.f + 1
        }
    }

    /// Progress timeout.
    pub fn delta_progress(&self) -> Duration {
        Duration::from_millis(self.delta_progress_ms)
    }

    /// Resend interval.
    pub fn delta_resend(&self) -> Duration {
        Duration::from_millis(self.delta_resend_ms)
    }

    /// Round interval.
    pub fn delta_round(&self) -> Duration {
        Duration::from_millis(self.delta_round_ms)
    }

    /// Grace period.
    pub fn delta_grace(&self) -> Duration {
        Duration::from_millis(self.delta_grace_ms)
    }

    /// Stage delay.
    pub fn delta_stage(&self) -> Duration {
        Duration::from_millis(self.delta_stage_ms)
    }

    /// Query deadline.
    pub fn max_duration_query(&self) -> Duration {
        Duration::from_millis(self.max_duration_query_ms)
    }

    /// Observation deadline.
    pub fn max_duration_observation(&self) -> Duration {
        Duration::from_millis(self.max_duration_observation_ms)
    }

    /// Report deadline.
    pub fn max_duration_report(&self) -> Duration {
        Duration::from_millis(self.max_duration_report_ms)
    }

    /// Accept deadline.
    pub fn max_duration_should_accept(&self) -> Duration {
        Duration::from_millis(self.max_duration_should_accept_ms)
    }

    /// Transmit-check deadline.
    pub fn max_duration_should_transmit(&self) -> Duration {
        Duration::from_millis(self.max_duration_should_transmit_ms)
    }

    /// Timings suitable for local testing and simulation.
    pub fn fast(mut self) -> Self {
        self.delta_progress_ms = 2000;
        self.delta_resend_ms = 500;
        self.delta_round_ms = 300;
        self.delta_grace_ms = 50;
        self.delta_stage_ms = 200;
        self.max_duration_query_ms = 100;
        self.max_duration_observation_ms = 100;
        self.max_duration_report_ms = 100;
        self.max_duration_should_accept_ms = 100;
        self.max_duration_should_transmit_ms = 100;
        self
    }

    /// Replace the committee.
    pub fn with_oracles(mut self, oracles: Vec<OracleIdentity>, f: usize) -> Self {
        self.oracles = oracles;
        self.f = f;
        self
    }

    /// Replace the transmission schedule.
    pub fn with_schedule(mut self, s: Vec<usize>) -> Self {
        self.s = s;
        self
    }

    /// Check committee bounds, timing relations and committee uniqueness.
    pub fn validate(&self) -> ConfigResult<()> {
        let n = self.n();
        if n == 0 || n > MAX_ORACLES {
            return Err(ConfigError::InvalidCommitteeSize {
                n,
                max: MAX_ORACLES,
            });
        }

        if (self.f == 0 && n > 1) || 3 * self.f >= n {
            return Err(ConfigError::InvalidFaultTolerance { n, f: self.f });
        }

        // r_max + 1 must still be a valid round number
        if self.r_max == 0 || self.r_max == u8::MAX {
            return Err(ConfigError::InvalidRMax(self.r_max));
        }

        for (name, value) in [
            ("delta_progress_ms", self.delta_progress_ms),
            ("delta_resend_ms", self.delta_resend_ms),
            ("delta_round_ms", self.delta_round_ms),
            ("delta_grace_ms", self.delta_grace_ms),
            ("max_duration_query_ms", self.max_duration_query_ms),
            ("max_duration_observation_ms", self.max_duration_observation_ms),
            ("max_duration_report_ms", self.max_duration_report_ms),
            ("max_duration_should_accept_ms", self.max_duration_should_accept_ms),
            (
                "max_duration_should_transmit_ms",
                self.max_duration_should_transmit_ms,
            ),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidTimeout { name, value });
            }
        }

        if self.delta_grace_ms >= self.delta_round_ms {
            return Err(ConfigError::InvalidTimeoutOrdering(format!(
                "delta_grace_ms ({}) must be less than delta_round_ms ({})",
                self.delta_grace_ms, self.delta_round_ms
            )));
        }

        if self.delta_round_ms > self.delta_progress_ms {
            return Err(ConfigError::InvalidTimeoutOrdering(format!(
                "delta_round_ms ({}) must not exceed delta_progress_ms ({})",
                self.delta_round_ms, self.delta_progress_ms
            )));
        }

        if self.s.is_empty() || self.s.len() > 1000 {
            return Err(ConfigError::InvalidSchedule(format!(
                "s must have between 1 and 1000 stages, got {}",
                self.s.len()
            )));
        }

        if self.s.iter().all(|&count| count == 0) {
            return Err(ConfigError::InvalidSchedule(
                "no stage contains a transmitter".to_string(),
            ));
        }

        let mut offchain_keys = HashSet::new();
        let mut peer_ids = HashSet::new();
        let mut accounts = HashSet::new();
        for oracle in &self.oracles {
            if !offchain_keys.insert(oracle.offchain_public_key.as_slice()) {
                return Err(ConfigError::DuplicateOracle {
                    field: "offchain_public_key",
                    value: hex::encode(&oracle.offchain_public_key),
                });
            }
            if !peer_ids.insert(oracle.peer_id.as_str()) {
                return Err(ConfigError::DuplicateOracle {
                    field: "peer_id",
                    value: oracle.peer_id.clone(),
                });
            }
            if !accounts.insert(oracle.transmit_account.as_str()) {
                return Err(ConfigError::DuplicateOracle {
                    field: "transmit_account",
                    value: oracle.transmit_account.clone(),
                });
            }
        }

        Ok(())
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            config_digest: ConfigDigest::default(),
            f: 1,
            r_max: 10,
            delta_progress_ms: 30_000,
            delta_resend_ms: 10_000,
            delta_round_ms: 5_000,
            delta_grace_ms: 1_000,
            delta_stage_ms: 10_000,
            s: vec![1, 1, 1, 2],
            leader_selection_key: [0u8; 32],
            transmission_order_key: [0u8; 32],
            max_duration_query_ms: default_plugin_call_ms(),
            max_duration_observation_ms: default_plugin_call_ms(),
            max_duration_report_ms: default_plugin_call_ms(),
            max_duration_should_accept_ms: default_plugin_call_ms(),
            max_duration_should_transmit_ms: default_plugin_call_ms(),
            oracles: Vec::new(),
        }
    }
}

mod hex_key {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(key)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes =
            hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("key must be 32 bytes"))
    }
}

// =============================================================================
// Local Configuration
// =============================================================================

/// Settings that only affect this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Deadline for the on-chain transmit call
    pub transmit_timeout_ms: u64,

    /// Deadline for database calls
    pub database_timeout_ms: u64,

    /// How long past its deadline a call may run before a warning is logged
    pub call_warning_grace_ms: u64,

    /// Queue size of the persistence task
    pub persistence_capacity: usize,

    /// Queue size of the self-delivery loopback
    pub loopback_capacity: usize,

    /// Queue size between the network demultiplexer and each protocol task
    pub inbound_capacity: usize,
}

impl LocalConfig {
    /// Transmit deadline.
    pub fn transmit_timeout(&self) -> Duration {
        Duration::from_millis(self.transmit_timeout_ms)
    }

    /// Database deadline.
    pub fn database_timeout(&self) -> Duration {
        Duration::from_millis(self.database_timeout_ms)
    }

    /// Warning grace period.
    pub fn call_warning_grace(&self) -> Duration {
        Duration::from_millis(self.call_warning_grace_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.transmit_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "transmit_timeout_ms",
                value: 0,
            });
        }

        if self.database_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "database_timeout_ms",
                value: 0,
            });
        }

        for (name, capacity) in [
            ("persistence_capacity", self.persistence_capacity),
            ("loopback_capacity", self.loopback_capacity),
            ("inbound_capacity", self.inbound_capacity),
        ] {
            if capacity == 0 {
                return Err(ConfigError::InvalidCapacity(name));
            }
        }

        Ok(())
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            transmit_timeout_ms: 10_000,
            database_timeout_ms: 5_000,
            call_warning_grace_ms: 100,
            persistence_capacity: 256,
            loopback_capacity: 256,
            inbound_capacity: 1024,
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl LoggingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.level.clone()));
        }

        let valid_formats = ["json", "pretty", "compact"];
        if !valid_formats.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogFormat(self.format.clone()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
