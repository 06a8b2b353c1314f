//! In-memory backend.

use crate::Result;
use async_trait::async_trait;
use ocr_core::{Database, DatabaseError};
use ocr_types::{ConfigDigest, PacemakerState, PendingTransmission, ReportTimestamp};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

/// [`Database`] backed by maps.
///
/// Clones do not share state; wrap in an `Arc` to share one instance, for
/// example across a simulated restart.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    pacemaker: RwLock<HashMap<ConfigDigest, PacemakerState>>,
    pending: RwLock<HashMap<ReportTimestamp, PendingTransmission>>,
    fail_writes: AtomicBool,
}

impl MemoryDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored pending transmissions across all configurations.
    pub fn pending_count(&self) -> usize {
        self.pending.read().len()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::Io("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn read_pacemaker_state(
        &self,
        config_digest: ConfigDigest,
    ) -> Result<Option<PacemakerState>> {
        Ok(self.pacemaker.read().get(&config_digest).copied())
    }

    async fn write_pacemaker_state(
        &self,
        config_digest: ConfigDigest,
        state: PacemakerState,
    ) -> Result<()> {
        self.check_writable()?;
        self.pacemaker.write().insert(config_digest, state);
        Ok(())
    }

    async fn store_pending_transmission(
        &self,
        timestamp: ReportTimestamp,
        transmission: PendingTransmission,
    ) -> Result<()> {
        self.check_writable()?;
        self.pending.write().insert(timestamp, transmission);
        Ok(())
    }

    async fn pending_transmissions_with_config_digest(
        &self,
        config_digest: ConfigDigest,
    ) -> Result<HashMap<ReportTimestamp, PendingTransmission>> {
        Ok(self
            .pending
            .read()
            .iter()
            .filter(|(ts, _)| ts.config_digest == config_digest)
            .map(|(ts, pt)| (*ts, pt.clone()))
            .collect())
    }

    async fn delete_pending_transmission(&self, timestamp: ReportTimestamp) -> Result<()> {
        self.check_writable()?;
        self.pending.write().remove(&timestamp);
        Ok(())
    }

    async fn delete_pending_transmissions_older_than(&self, time: SystemTime) -> Result<()> {
        self.check_writable()?;
        self.pending.write().retain(|_, pt| pt.time >= time);
        Ok(())
    }
}
