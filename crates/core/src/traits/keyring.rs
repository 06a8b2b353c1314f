//! Signing keyrings.
//!
//! Two independent keys per oracle:
//!
//! - the **onchain** key attests reports; the target contract checks these
//!   signatures, so the encoding is chain specific;
//! - the **offchain** key signs observations; only other oracles check these.
//!
//! Verification takes the signer's public key explicitly, so one keyring
//! instance can verify signatures from every committee member.

use ocr_types::ReportContext;
use thiserror::Error;

/// Errors that can occur while signing.
#[derive(Error, Debug)]
pub enum KeyringError {
    /// The signing backend failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// The key material is unusable.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Result type for keyring operations.
pub type KeyringResult<T> = Result<T, KeyringError>;

/// Attests reports for the target contract.
pub trait OnchainKeyring: Send + Sync + 'static {
    /// This oracle's onchain public key, as it appears in the committee.
    fn public_key(&self) -> Vec<u8>;

    /// Sign `report` in `context`.
    fn sign(&self, context: &ReportContext, report: &[u8]) -> KeyringResult<Vec<u8>>;

    /// Check a signature made by `public_key` over `report` in `context`.
    fn verify(
        &self,
        public_key: &[u8],
        context: &ReportContext,
        report: &[u8],
        signature: &[u8],
    ) -> bool;

    /// Upper bound on the length of signatures produced by [`sign`](Self::sign).
    fn max_signature_length(&self) -> usize;
}

/// Signs protocol messages exchanged between oracles.
pub trait OffchainKeyring: Send + Sync + 'static {
    /// This oracle's offchain public key, as it appears in the committee.
    fn offchain_public_key(&self) -> Vec<u8>;

    /// Sign arbitrary bytes.
    fn offchain_sign(&self, message: &[u8]) -> KeyringResult<Vec<u8>>;

    /// Check a signature made by `public_key` over `message`.
    fn offchain_verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool;
}
