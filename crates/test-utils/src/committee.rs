//! Committee fixture.

use ocr_config::SharedConfig;
use ocr_core::{OffchainKeyring, OnchainKeyring};
use ocr_crypto::{keccak256_concat, EcdsaOffchainKeyring, EvmOnchainKeyring, PrivateKey};
use ocr_types::{ConfigDigest, Epoch, OracleId, OracleIdentity, ReportTimestamp, Round};
use std::sync::Arc;

/// Keyrings and shared configuration for a committee of `n`.
///
/// Keys derive from a seed, so two fixtures built with the same seed are the
/// same committee.
#[derive(Debug, Clone)]
pub struct TestCommittee {
    onchain: Vec<Arc<EvmOnchainKeyring>>,
    offchain: Vec<Arc<EcdsaOffchainKeyring>>,
    config: SharedConfig,
}

fn derive_key(seed: u64, role: &[u8], index: usize) -> PrivateKey {
    let bytes = keccak256_concat(&[
        b"ocr-test-committee",
        &seed.to_be_bytes(),
        role,
        &(index as u64).to_be_bytes(),
    ]);
    PrivateKey::from_bytes(&bytes).expect("keccak output is a valid secp256k1 scalar")
}

impl TestCommittee {
    /// Committee of `n` tolerating `f` faults, with fast timings.
    pub fn new(n: usize, f: usize) -> Self {
        Self::with_seed(n, f, 0)
    }

    /// Committee whose keys and shared secrets derive from `seed`.
    pub fn with_seed(n: usize, f: usize, seed: u64) -> Self {
        let onchain: Vec<_> = (0..n)
            .map(|i| Arc::new(EvmOnchainKeyring::new(derive_key(seed, b"onchain", i))))
            .collect();
        let offchain: Vec<_> = (0..n)
            .map(|i| Arc::new(EcdsaOffchainKeyring::new(derive_key(seed, b"offchain", i))))
            .collect();

        let identities = (0..n)
            .map(|i| OracleIdentity {
                onchain_public_key: onchain[i].public_key(),
                offchain_public_key: offchain[i].offchain_public_key(),
                peer_id: format!("peer-{}", i),
                transmit_account: format!("0x{:040x}", i + 1),
            })
            .collect();

        let seed_bytes = seed.to_be_bytes();
        let config = SharedConfig {
            config_digest: ConfigDigest::new(keccak256_concat(&[b"digest", &seed_bytes])),
            leader_selection_key: keccak256_concat(&[b"leader", &seed_bytes]),
            transmission_order_key: keccak256_concat(&[b"order", &seed_bytes]),
            ..SharedConfig::default()
        }
        .fast()
        .with_oracles(identities, f);

        Self {
            onchain,
            offchain,
            config,
        }
    }

    /// Committee size
    pub fn n(&self) -> usize {
        self.onchain.len()
    }

    /// Shared configuration
    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Mutable shared configuration, for tests tweaking timings or limits
    pub fn config_mut(&mut self) -> &mut SharedConfig {
        &mut self.config
    }

    /// Committee identities in index order
    pub fn identities(&self) -> &[OracleIdentity] {
        &self.config.oracles
    }

    /// Onchain keyring of oracle `id`
    pub fn onchain_keyring(&self, id: OracleId) -> Arc<EvmOnchainKeyring> {
        Arc::clone(&self.onchain[id as usize])
    }

    /// Offchain keyring of oracle `id`
    pub fn offchain_keyring(&self, id: OracleId) -> Arc<EcdsaOffchainKeyring> {
        Arc::clone(&self.offchain[id as usize])
    }

    /// Onchain public keys in index order
    pub fn onchain_public_keys(&self) -> Vec<Vec<u8>> {
        self.identities()
            .iter()
            .map(|identity| identity.onchain_public_key.clone())
            .collect()
    }

    /// Timestamp under this committee's config digest
    pub fn timestamp(&self, epoch: Epoch, round: Round) -> ReportTimestamp {
        ReportTimestamp::new(self.config.config_digest, epoch, round)
    }
}
