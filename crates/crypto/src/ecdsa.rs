//! secp256k1 keys for the keyrings.
//!
//! Everything signs 32-byte prehashes; [`keccak256`](crate::keccak256) the
//! payload first. Signatures are 65 bytes, `r ‖ s ‖ v`, so the onchain
//! keyring can recover the signer the way a contract would.

use crate::{keccak256, CryptoError, Result};
use k256::{
    ecdsa::{
        signature::hazmat::PrehashVerifier, RecoveryId, Signature as K256Signature, SigningKey,
        VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
    SecretKey,
};
use rand::rngs::OsRng;

/// Trailing 20 bytes of keccak256 over the uncompressed point.
pub type Address = [u8; 20];

/// `r ‖ s ‖ v`
pub const SIGNATURE_LENGTH: usize = 65;

#[derive(Clone)]
pub struct PrivateKey {
    signing: SigningKey,
}

impl PrivateKey {
    pub fn random() -> Self {
        Self {
            signing: SigningKey::from(SecretKey::random(&mut OsRng)),
        }
    }

    /// Fails when `bytes` is zero or not below the curve order.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        SecretKey::from_bytes(bytes.into())
            .map(|secret| Self {
                signing: SigningKey::from(secret),
            })
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying: *self.signing.verifying_key(),
        }
    }

    pub fn sign_prehash(&self, prehash: &[u8; 32]) -> Result<Signature> {
        let (signature, recovery_id) = self
            .signing
            .sign_prehash_recoverable(prehash)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        let (r, s) = signature.split_bytes();
        Ok(Signature {
            r: r.into(),
            s: s.into(),
            v: recovery_id.to_byte(),
        })
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the secret
        f.debug_tuple("PrivateKey")
            .field(&hex::encode(self.public_key().to_address()))
            .finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    verifying: VerifyingKey,
}

impl PublicKey {
    /// Accepts the 33-byte compressed or 65-byte uncompressed SEC1 form.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self> {
        VerifyingKey::from_sec1_bytes(bytes)
            .map(|verifying| Self { verifying })
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    pub fn to_compressed(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        out.copy_from_slice(self.verifying.to_encoded_point(true).as_bytes());
        out
    }

    pub fn to_address(&self) -> Address {
        let point = self.verifying.to_encoded_point(false);
        // skip the 0x04 tag
        let hash = keccak256(&point.as_bytes()[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);
        address
    }

    /// `Ok(false)` for a well-formed signature by another key.
    pub fn verify_prehash(&self, prehash: &[u8; 32], signature: &Signature) -> Result<bool> {
        let signature = signature.to_k256()?;
        Ok(self.verifying.verify_prehash(prehash, &signature).is_ok())
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PublicKey")
            .field(&hex::encode(self.to_compressed()))
            .finish()
    }
}

/// Recoverable ECDSA signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// Recovery id, 0 or 1
    pub v: u8,
}

impl Signature {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(CryptoError::InvalidLength {
                expected: SIGNATURE_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, v: bytes[64] })
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    /// Public key that produced this signature over `prehash`.
    pub fn recover_prehash(&self, prehash: &[u8; 32]) -> Result<PublicKey> {
        let recovery_id = RecoveryId::from_byte(self.v)
            .ok_or_else(|| CryptoError::RecoveryFailed(format!("recovery id {}", self.v)))?;
        VerifyingKey::recover_from_prehash(prehash, &self.to_k256()?, recovery_id)
            .map(|verifying| PublicKey { verifying })
            .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))
    }

    fn to_k256(&self) -> Result<K256Signature> {
        K256Signature::from_scalars(self.r, self.s)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_address() {
        let bytes: [u8; 32] =
            hex::decode("4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318")
                .unwrap()
                .try_into()
                .unwrap();
        let key = PrivateKey::from_bytes(&bytes).unwrap();
        assert_eq!(
            hex::encode(key.public_key().to_address()),
            "2c7536e3605d9c16a7a3d7b1898e529396a65c23"
        );
    }

    #[test]
    fn test_zero_key_rejected() {
        assert!(matches!(
            PrivateKey::from_bytes(&[0u8; 32]),
            Err(CryptoError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn test_recover_matches_signer() {
        let key = PrivateKey::random();
        let hash = keccak256(b"payload");
        let sig = key.sign_prehash(&hash).unwrap();
        assert_eq!(sig.recover_prehash(&hash).unwrap(), key.public_key());
        assert!(key.public_key().verify_prehash(&hash, &sig).unwrap());

        let encoded = sig.to_bytes();
        assert_eq!(Signature::from_slice(&encoded).unwrap(), sig);
    }

    #[test]
    fn test_signature_slice_length_checked() {
        assert!(matches!(
            Signature::from_slice(&[0u8; 64]),
            Err(CryptoError::InvalidLength {
                expected: 65,
                actual: 64
            })
        ));
    }
}
