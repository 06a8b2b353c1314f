//! On-chain submission.

use async_trait::async_trait;
use ocr_types::{AttributedOnchainSignature, ReportContext};
use thiserror::Error;

/// Errors that can occur while transmitting.
#[derive(Error, Debug)]
pub enum TransmitError {
    /// The chain rejected the submission.
    #[error("transmission rejected: {0}")]
    Rejected(String),

    /// The chain could not be reached.
    #[error("chain unavailable: {0}")]
    Unavailable(String),

    /// Generic transmitter error.
    #[error("transmitter error: {0}")]
    Internal(String),
}

/// Result type for transmitter calls.
pub type TransmitResult<T> = Result<T, TransmitError>;

/// Sends attested reports to the target contract.
#[async_trait]
pub trait ContractTransmitter: Send + Sync + 'static {
    /// Submit `report` with its quorum of signatures.
    async fn transmit(
        &self,
        context: &ReportContext,
        report: &[u8],
        signatures: &[AttributedOnchainSignature],
    ) -> TransmitResult<()>;

    /// Account transmissions are sent from.
    async fn from_account(&self) -> TransmitResult<String>;
}
