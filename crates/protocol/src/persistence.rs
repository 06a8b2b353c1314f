//! Background persistence of pending transmissions.
//!
//! Transmission must never wait on the database, so it enqueues writes on
//! a bounded channel drained by this task. If the channel is full the write
//! is dropped and logged; the worst case after a crash is a lost or stale
//! pending transmission, which the contract's freshness check tolerates.

use crate::taper::Taper;
use ocr_core::Database;
use ocr_types::{PendingTransmission, ReportTimestamp};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// A queued database write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceRequest {
    /// Insert or replace a pending transmission
    Store {
        /// Round of the report
        timestamp: ReportTimestamp,
        /// Record to store
        transmission: PendingTransmission,
    },
    /// Remove a pending transmission
    Delete {
        /// Round of the report
        timestamp: ReportTimestamp,
    },
}

/// Non-blocking producer side of the persistence queue.
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    tx: mpsc::Sender<PersistenceRequest>,
    dropped: Arc<Taper>,
}

/// Create a persistence queue holding up to `capacity` requests.
pub fn channel(capacity: usize) -> (PersistenceHandle, mpsc::Receiver<PersistenceRequest>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        PersistenceHandle {
            tx,
            dropped: Arc::new(Taper::new()),
        },
        rx,
    )
}

impl PersistenceHandle {
    /// Queue a store.
    pub fn store(&self, timestamp: ReportTimestamp, transmission: PendingTransmission) {
        self.enqueue(PersistenceRequest::Store {
            timestamp,
            transmission,
        });
    }

    /// Queue a delete.
    pub fn delete(&self, timestamp: ReportTimestamp) {
        self.enqueue(PersistenceRequest::Delete { timestamp });
    }

    fn enqueue(&self, request: PersistenceRequest) {
        match self.tx.try_send(request) {
            Ok(()) => self.dropped.reset(|dropped| {
                warn!(dropped, "Persistence queue recovered after dropping writes");
            }),
            Err(mpsc::error::TrySendError::Full(_)) => self.dropped.trigger(|dropped| {
                warn!(dropped, "Persistence queue full, dropping write");
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Persistence task gone, dropping write");
            }
        }
    }
}

async fn apply(db: &dyn Database, request: PersistenceRequest, timeout: Duration) {
    let (op, timestamp, result) = match request {
        PersistenceRequest::Store {
            timestamp,
            transmission,
        } => (
            "store",
            timestamp,
            tokio::time::timeout(timeout, db.store_pending_transmission(timestamp, transmission))
                .await,
        ),
        PersistenceRequest::Delete { timestamp } => (
            "delete",
            timestamp,
            tokio::time::timeout(timeout, db.delete_pending_transmission(timestamp)).await,
        ),
    };

    match result {
        Ok(Ok(())) => debug!(op, %timestamp, "Persisted pending transmission"),
        Ok(Err(e)) => error!(op, %timestamp, "Failed to persist pending transmission: {}", e),
        Err(_) => error!(
            op,
            %timestamp,
            timeout_ms = timeout.as_millis() as u64,
            "Database write timed out"
        ),
    }
}

/// Drain `requests` into `db` until cancelled, then flush what is queued.
pub async fn run_persistence(
    db: Arc<dyn Database>,
    mut requests: mpsc::Receiver<PersistenceRequest>,
    timeout: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            request = requests.recv() => match request {
                Some(request) => apply(db.as_ref(), request, timeout).await,
                None => return,
            },
        }
    }

    requests.close();
    while let Some(request) = requests.recv().await {
        apply(db.as_ref(), request, timeout).await;
    }
    debug!("Persistence stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocr_storage::MemoryDatabase;
    use ocr_types::ConfigDigest;
    use std::time::SystemTime;

    fn pending(report: u8) -> PendingTransmission {
        PendingTransmission {
            time: SystemTime::UNIX_EPOCH,
            extra_hash: [0u8; 32],
            report: vec![report],
            attributed_signatures: vec![],
        }
    }

    fn ts(round: u8) -> ReportTimestamp {
        ReportTimestamp::new(ConfigDigest::new([1u8; 32]), 1, round)
    }

    #[tokio::test]
    async fn test_requests_applied_in_order() {
        let db = Arc::new(MemoryDatabase::new());
        let (handle, rx) = channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_persistence(
            db.clone(),
            rx,
            Duration::from_secs(1),
            cancel.clone(),
        ));

        handle.store(ts(1), pending(1));
        handle.store(ts(2), pending(2));
        handle.delete(ts(1));

        cancel.cancel();
        task.await.unwrap();

        let stored = db
            .pending_transmissions_with_config_digest(ConfigDigest::new([1u8; 32]))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[&ts(2)], pending(2));
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_task() {
        let db = Arc::new(MemoryDatabase::new());
        let (handle, rx) = channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_persistence(
            db.clone(),
            rx,
            Duration::from_secs(1),
            cancel.clone(),
        ));

        db.set_fail_writes(true);
        handle.store(ts(1), pending(1));
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        db.set_fail_writes(false);
        handle.store(ts(2), pending(2));

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(db.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let (handle, mut rx) = channel(1);
        handle.store(ts(1), pending(1));
        handle.store(ts(2), pending(2));

        assert!(matches!(
            rx.try_recv().unwrap(),
            PersistenceRequest::Store { timestamp, .. } if timestamp == ts(1)
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.dropped.count(), 1);
    }
}
