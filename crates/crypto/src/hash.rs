//! # Keccak256 Hashing Utilities
//!
//! - `keccak256` - Hash a single byte slice
//! - `keccak256_concat` - Hash multiple byte slices concatenated
//! - `Hasher` - Streaming hasher with length-prefixed framing
//!
//! ```rust
//! use ocr_crypto::hash::Hasher;
//!
//! let mut hasher = Hasher::new();
//! hasher.update(b"hello");
//! hasher.update(b" world");
//! assert_eq!(hasher.finalize(), ocr_crypto::keccak256(b"hello world"));
//! ```

use sha3::{Digest, Keccak256};

/// Compute the Keccak256 hash of the input data.
#[inline]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the Keccak256 hash of multiple concatenated inputs.
///
/// Avoids allocating a temporary buffer for the concatenation.
#[inline]
pub fn keccak256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// A streaming Keccak256 hasher.
#[derive(Clone)]
pub struct Hasher {
    inner: Keccak256,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a new Keccak256 hasher.
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: Keccak256::new(),
        }
    }

    /// Feed raw bytes.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Feed `data` preceded by its length as a big-endian u64.
    ///
    /// Framing every variable-length field keeps distinct field sequences
    /// from hashing to the same input stream.
    #[inline]
    pub fn update_len_prefixed(&mut self, data: &[u8]) {
        self.inner.update((data.len() as u64).to_be_bytes());
        self.inner.update(data);
    }

    /// Finalize the hasher and return the hash.
    #[inline]
    pub fn finalize(self) -> [u8; 32] {
        self.inner.finalize().into()
    }
}

impl std::fmt::Debug for Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hasher").finish_non_exhaustive()
    }
}
