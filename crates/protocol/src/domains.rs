//! Domain separators.
//!
//! Every hash or signature input starts with one of these so a value signed
//! for one purpose is never valid for another.

/// Prefix of the offchain-signed observation payload
pub const OBSERVATION: &[u8] = b"OCR_OBSERVATION_V1";

/// Prefix of the report context extra hash
pub const EXTRA_HASH: &[u8] = b"OCR_EXTRA_HASH_V1";

/// Prefix of the leader selection hash
pub const LEADER_SELECTION: &[u8] = b"OCR_LEADER_SELECTION_V1";

/// Prefix of the transmission order seed
pub const TRANSMISSION_ORDER: &[u8] = b"OCR_TRANSMISSION_ORDER_V1";
