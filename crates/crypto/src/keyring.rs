//! secp256k1 keyrings.
//!
//! - [`EvmOnchainKeyring`]: the onchain public key is the signer's 20-byte
//!   address; a signature is checked by recovering the signer and comparing
//!   addresses, the way an EVM contract does with `ecrecover`.
//! - [`EcdsaOffchainKeyring`]: the offchain public key is the 33-byte
//!   compressed point; signatures are checked directly.

use crate::ecdsa::{PrivateKey, PublicKey, Signature, SIGNATURE_LENGTH};
use crate::{keccak256, keccak256_concat};
use ocr_core::{KeyringError, KeyringResult, OffchainKeyring, OnchainKeyring};
use ocr_types::ReportContext;

/// Digest an onchain report signature commits to.
///
/// `keccak256(keccak256(report) ‖ context)`, with the context in its
/// 96-byte fixed encoding.
pub fn report_digest(context: &ReportContext, report: &[u8]) -> [u8; 32] {
    keccak256_concat(&[&keccak256(report), &context.to_bytes()])
}

/// Onchain keyring producing recoverable signatures over [`report_digest`].
#[derive(Debug, Clone)]
pub struct EvmOnchainKeyring {
    key: PrivateKey,
}

impl EvmOnchainKeyring {
    /// Wrap an existing key.
    pub fn new(key: PrivateKey) -> Self {
        Self { key }
    }

    /// Keyring with a freshly generated key.
    pub fn random() -> Self {
        Self::new(PrivateKey::random())
    }
}

impl OnchainKeyring for EvmOnchainKeyring {
    fn public_key(&self) -> Vec<u8> {
        self.key.public_key().to_address().to_vec()
    }

    fn sign(&self, context: &ReportContext, report: &[u8]) -> KeyringResult<Vec<u8>> {
        let digest = report_digest(context, report);
        self.key
            .sign_prehash(&digest)
            .map(|sig| sig.to_bytes().to_vec())
            .map_err(|e| KeyringError::SigningFailed(e.to_string()))
    }

    fn verify(
        &self,
        public_key: &[u8],
        context: &ReportContext,
        report: &[u8],
        signature: &[u8],
    ) -> bool {
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        let digest = report_digest(context, report);
        match signature.recover_prehash(&digest) {
            Ok(recovered) => recovered.to_address().as_slice() == public_key,
            Err(_) => false,
        }
    }

    fn max_signature_length(&self) -> usize {
        SIGNATURE_LENGTH
    }
}

/// Offchain keyring signing keccak256 prehashes of arbitrary messages.
#[derive(Debug, Clone)]
pub struct EcdsaOffchainKeyring {
    key: PrivateKey,
}

impl EcdsaOffchainKeyring {
    /// Wrap an existing key.
    pub fn new(key: PrivateKey) -> Self {
        Self { key }
    }

    /// Keyring with a freshly generated key.
    pub fn random() -> Self {
        Self::new(PrivateKey::random())
    }
}

impl OffchainKeyring for EcdsaOffchainKeyring {
    fn offchain_public_key(&self) -> Vec<u8> {
        self.key.public_key().to_compressed().to_vec()
    }

    fn offchain_sign(&self, message: &[u8]) -> KeyringResult<Vec<u8>> {
        self.key
            .sign_prehash(&keccak256(message))
            .map(|sig| sig.to_bytes().to_vec())
            .map_err(|e| KeyringError::SigningFailed(e.to_string()))
    }

    fn offchain_verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
        let (Ok(public_key), Ok(signature)) = (
            PublicKey::from_sec1_bytes(public_key),
            Signature::from_slice(signature),
        ) else {
            return false;
        };
        public_key
            .verify_prehash(&keccak256(message), &signature)
            .unwrap_or(false)
    }
}
