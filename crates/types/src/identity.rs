//! Oracle identities.

use serde::{Deserialize, Serialize};

/// Index of an oracle in the committee, in `[0, N)`.
pub type OracleId = u8;

/// Largest committee size supported.
pub const MAX_ORACLES: usize = 31;

/// Public identity of one committee member.
///
/// Key encodings are opaque here; the keyrings in `ocr-crypto` define them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleIdentity {
    /// Key reports are attested with (checked by the target contract)
    #[serde(with = "hex_bytes")]
    pub onchain_public_key: Vec<u8>,
    /// Key observations are signed with
    #[serde(with = "hex_bytes")]
    pub offchain_public_key: Vec<u8>,
    /// Transport-level peer identifier
    pub peer_id: String,
    /// Account this oracle transmits from
    pub transmit_account: String,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}
