//! Errors surfaced when assembling an oracle.
//!
//! Once running, the protocol never fails as a whole: bad messages are
//! dropped and collaborator errors are logged, so this enum only covers
//! construction.

use ocr_config::ConfigError;
use ocr_types::OracleId;
use thiserror::Error;

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Shared or local configuration failed validation
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Our oracle id is not a committee index
    #[error("oracle id {id} out of range for committee of {n}")]
    OracleIdOutOfRange {
        /// Configured id
        id: OracleId,
        /// Committee size
        n: usize,
    },

    /// A local keyring does not match its committee entry
    #[error("{which} key for oracle {id} does not match the committee")]
    KeyMismatch {
        /// Oracle id
        id: OracleId,
        /// `onchain` or `offchain`
        which: &'static str,
    },

    /// The plugin advertised an unusable limit
    #[error("invalid plugin limits: {0}")]
    InvalidPluginInfo(String),
}

/// Result type for protocol construction
pub type ProtocolResult<T> = Result<T, ProtocolError>;
