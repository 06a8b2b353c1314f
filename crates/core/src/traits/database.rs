//! Persistence used for crash recovery.
//!
//! The protocol only ever persists two things: the pacemaker's epoch state
//! and the set of reports awaiting transmission. Both are scoped by
//! [`ConfigDigest`].

use async_trait::async_trait;
use ocr_types::{ConfigDigest, PacemakerState, PendingTransmission, ReportTimestamp};
use std::collections::HashMap;
use std::time::SystemTime;
use thiserror::Error;

/// Errors that can occur during database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// A database I/O error occurred.
    #[error("database I/O error: {0}")]
    Io(String),

    /// A stored record could not be decoded, or a record could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Data corruption was detected.
    #[error("data corruption: {0}")]
    Corruption(String),

    /// Generic internal error.
    #[error("internal database error: {0}")]
    Internal(String),
}

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Crash-recovery storage.
///
/// Callers bound every call with a timeout and only log failures; an
/// implementation never needs to retry internally.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    /// Read the persisted pacemaker state for `config_digest`, if any.
    async fn read_pacemaker_state(
        &self,
        config_digest: ConfigDigest,
    ) -> DatabaseResult<Option<PacemakerState>>;

    /// Overwrite the pacemaker state for `config_digest`.
    async fn write_pacemaker_state(
        &self,
        config_digest: ConfigDigest,
        state: PacemakerState,
    ) -> DatabaseResult<()>;

    /// Insert or replace a pending transmission.
    async fn store_pending_transmission(
        &self,
        timestamp: ReportTimestamp,
        transmission: PendingTransmission,
    ) -> DatabaseResult<()>;

    /// All pending transmissions recorded under `config_digest`.
    async fn pending_transmissions_with_config_digest(
        &self,
        config_digest: ConfigDigest,
    ) -> DatabaseResult<HashMap<ReportTimestamp, PendingTransmission>>;

    /// Remove a pending transmission. Removing a missing entry is not an error.
    async fn delete_pending_transmission(&self, timestamp: ReportTimestamp) -> DatabaseResult<()>;

    /// Remove every pending transmission scheduled strictly before `time`.
    async fn delete_pending_transmissions_older_than(&self, time: SystemTime)
        -> DatabaseResult<()>;
}
