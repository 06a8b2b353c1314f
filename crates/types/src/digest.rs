//! Configuration digest.
//!
//! A [`ConfigDigest`] names one committee configuration. All protocol state
//! (signatures, persisted records, messages) is scoped to a digest, so a
//! message signed under one configuration never verifies under another.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Size of a config digest in bytes
pub const DIGEST_SIZE: usize = 32;

/// Identifier of a committee configuration.
///
/// How the digest is derived from the configuration is chain specific and
/// happens outside this crate.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ConfigDigest([u8; DIGEST_SIZE]);

impl ConfigDigest {
    /// Creates a digest from a 32-byte array.
    #[inline]
    pub const fn new(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a digest from a slice.
    ///
    /// Returns an error if the slice length is not exactly 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != DIGEST_SIZE {
            return Err(Error::InvalidLength {
                expected: DIGEST_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; DIGEST_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Parses a digest from hex, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }

    /// Returns the hex representation with 0x prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Returns the digest as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }
}

impl fmt::Debug for ConfigDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigDigest(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for ConfigDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for ConfigDigest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<[u8; DIGEST_SIZE]> for ConfigDigest {
    fn from(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ConfigDigest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ConfigDigest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ConfigDigest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
