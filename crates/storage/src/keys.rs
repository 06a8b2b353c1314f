//! Key encoding.
//!
//! Pending transmissions are keyed `digest ‖ epoch (BE) ‖ round`, so a
//! forward scan from the digest visits one configuration's entries in
//! (epoch, round) order.

use crate::Result;
use ocr_core::DatabaseError;
use ocr_types::{ConfigDigest, ReportTimestamp};

/// Length of a pending transmission key
pub const TIMESTAMP_KEY_LEN: usize = 32 + 4 + 1;

/// Key of the pacemaker record for a configuration.
pub fn pacemaker_key(config_digest: &ConfigDigest) -> Vec<u8> {
    config_digest.as_bytes().to_vec()
}

/// Key of a pending transmission.
pub fn timestamp_key(ts: &ReportTimestamp) -> [u8; TIMESTAMP_KEY_LEN] {
    let mut key = [0u8; TIMESTAMP_KEY_LEN];
    key[0..32].copy_from_slice(ts.config_digest.as_bytes());
    key[32..36].copy_from_slice(&ts.epoch.to_be_bytes());
    key[36] = ts.round;
    key
}

/// Inverse of [`timestamp_key`].
pub fn parse_timestamp_key(key: &[u8]) -> Result<ReportTimestamp> {
    if key.len() != TIMESTAMP_KEY_LEN {
        return Err(DatabaseError::Corruption(format!(
            "pending transmission key has length {}",
            key.len()
        )));
    }
    let digest = ConfigDigest::from_slice(&key[0..32])
        .map_err(|e| DatabaseError::Corruption(e.to_string()))?;
    let mut epoch = [0u8; 4];
    epoch.copy_from_slice(&key[32..36]);
    Ok(ReportTimestamp::new(digest, u32::from_be_bytes(epoch), key[36]))
}
