//! # OCR Crypto
//!
//! Cryptographic primitives for the offchain reporting protocol.
//!
//! This crate provides:
//! - **Keccak256 hashing** - used for report digests, extra hashes and seeds
//! - **ECDSA signatures** - secp256k1 signing, verification and key recovery
//! - **Keyrings** - [`EvmOnchainKeyring`] and [`EcdsaOffchainKeyring`], implementations
//!   of the `ocr-core` keyring traits
//!
//! ## Example
//!
//! ```rust
//! use ocr_crypto::{ecdsa::PrivateKey, keccak256};
//!
//! let key = PrivateKey::random();
//! let hash = keccak256(b"message");
//! let signature = key.sign_prehash(&hash).unwrap();
//! assert!(key.public_key().verify_prehash(&hash, &signature).unwrap());
//! ```

pub mod ecdsa;
pub mod hash;
pub mod keyring;

pub use ecdsa::{Address, PrivateKey, PublicKey, Signature};
pub use hash::{keccak256, keccak256_concat, Hasher};
pub use keyring::{EcdsaOffchainKeyring, EvmOnchainKeyring};

/// Common type alias for 32-byte hash
pub type Hash = [u8; 32];

/// Error types for cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Invalid private key bytes
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Invalid public key bytes
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid signature bytes
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Failed to recover public key from signature
    #[error("failed to recover public key: {0}")]
    RecoveryFailed(String),

    /// Invalid input length
    #[error("invalid input length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Result type for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;
