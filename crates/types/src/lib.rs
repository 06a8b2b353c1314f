//! # OCR Types
//!
//! Identifiers and plain data shared by every offchain reporting crate.
//!
//! This crate provides:
//! - [`ConfigDigest`] - 32-byte identifier of a committee configuration
//! - [`EpochRound`], [`ReportTimestamp`], [`ReportContext`] - protocol coordinates
//! - [`OracleIdentity`] - per-oracle keys and addresses
//! - [`PendingTransmission`], [`PacemakerState`] - records persisted for crash recovery
//!
//! Nothing in here knows about signature schemes or transports.
//!
//! ## Example
//!
//! ```rust
//! use ocr_types::{ConfigDigest, EpochRound, ReportTimestamp};
//!
//! let digest: ConfigDigest = "0x0101010101010101010101010101010101010101010101010101010101010101"
//!     .parse()
//!     .unwrap();
//! let ts = ReportTimestamp::new(digest, 3, 1);
//! assert!(ts.epoch_round() < EpochRound::new(3, 2));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod digest;
pub mod identity;
pub mod records;
pub mod timestamp;

pub use digest::ConfigDigest;
pub use identity::{OracleId, OracleIdentity, MAX_ORACLES};
pub use records::{
    AttributedObservation, AttributedOnchainSignature, PacemakerState, PendingTransmission,
};
pub use timestamp::{Epoch, EpochRound, ReportContext, ReportTimestamp, Round};

/// 32-byte hash
pub type Hash = [u8; 32];

/// Result type alias for type conversions
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when parsing OCR types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Invalid length for a fixed-size type
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },
}
