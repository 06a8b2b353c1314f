//! Epoch leader selection.
//!
//! The leader of an epoch must be a pure function of shared configuration so
//! every honest oracle agrees on it without communication.

use crate::domains;
use ocr_crypto::Hasher;
use ocr_types::{ConfigDigest, Epoch, OracleId};

/// Maps an epoch to its leader.
pub trait LeaderSelector: Send + Sync + 'static {
    /// Leader of `epoch`.
    fn leader(&self, epoch: Epoch) -> OracleId;
}

/// Leader drawn from a hash keyed by the shared `leader_selection_key`.
///
/// `keccak256(domain ‖ key ‖ digest ‖ epoch (BE))`, first 8 bytes as a
/// big-endian `u64`, modulo `N`. Without the key an outsider cannot predict
/// upcoming leaders.
#[derive(Debug, Clone)]
pub struct KeyedLeaderSelector {
    key: [u8; 32],
    config_digest: ConfigDigest,
    n: usize,
}

impl KeyedLeaderSelector {
    /// Create a selector for a committee of `n`.
    pub fn new(key: [u8; 32], config_digest: ConfigDigest, n: usize) -> Self {
        Self {
            key,
            config_digest,
            n,
        }
    }
}

impl LeaderSelector for KeyedLeaderSelector {
    fn leader(&self, epoch: Epoch) -> OracleId {
        let mut hasher = Hasher::new();
        hasher.update(domains::LEADER_SELECTION);
        hasher.update(&self.key);
        hasher.update(self.config_digest.as_bytes());
        hasher.update(&epoch.to_be_bytes());
        let hash = hasher.finalize();

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash[..8]);
        (u64::from_be_bytes(prefix) % self.n as u64) as OracleId
    }
}

/// `epoch mod N`.
#[derive(Debug, Clone)]
pub struct RoundRobinLeaderSelector {
    n: usize,
}

impl RoundRobinLeaderSelector {
    /// Create a selector for a committee of `n`.
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl LeaderSelector for RoundRobinLeaderSelector {
    fn leader(&self, epoch: Epoch) -> OracleId {
        (epoch as u64 % self.n as u64) as OracleId
    }
}
