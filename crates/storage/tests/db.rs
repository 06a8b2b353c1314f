//! Integration tests for both database backends

use ocr_core::Database;
use ocr_storage::{DatabaseConfig, MemoryDatabase, RocksDatabase};
use ocr_types::{
    AttributedOnchainSignature, ConfigDigest, PacemakerState, PendingTransmission,
    ReportTimestamp,
};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

fn create_rocks_db() -> (RocksDatabase, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        path: temp_dir.path().to_string_lossy().to_string(),
        ..Default::default()
    };
    (RocksDatabase::open(config).unwrap(), temp_dir)
}

fn pending(secs: u64) -> PendingTransmission {
    PendingTransmission {
        time: UNIX_EPOCH + Duration::from_secs(secs),
        extra_hash: [1u8; 32],
        report: b"report".to_vec(),
        attributed_signatures: vec![AttributedOnchainSignature {
            signer: 2,
            signature: vec![3u8; 65],
        }],
    }
}

async fn check_pacemaker_state(db: &dyn Database) {
    let digest = ConfigDigest::new([1u8; 32]);
    assert_eq!(db.read_pacemaker_state(digest).await.unwrap(), None);

    let state = PacemakerState {
        epoch: 7,
        highest_sent_epoch: 8,
        leader: 3,
    };
    db.write_pacemaker_state(digest, state).await.unwrap();
    assert_eq!(db.read_pacemaker_state(digest).await.unwrap(), Some(state));

    // Other configurations are unaffected.
    let other = ConfigDigest::new([2u8; 32]);
    assert_eq!(db.read_pacemaker_state(other).await.unwrap(), None);
}

async fn check_pending_transmissions(db: &dyn Database) {
    let digest = ConfigDigest::new([1u8; 32]);
    let other = ConfigDigest::new([2u8; 32]);
    let a = ReportTimestamp::new(digest, 1, 1);
    let b = ReportTimestamp::new(digest, 1, 2);
    let c = ReportTimestamp::new(other, 1, 1);

    db.store_pending_transmission(a, pending(100)).await.unwrap();
    db.store_pending_transmission(b, pending(200)).await.unwrap();
    db.store_pending_transmission(c, pending(300)).await.unwrap();

    let loaded = db.pending_transmissions_with_config_digest(digest).await.unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[&a], pending(100));

    db.delete_pending_transmission(a).await.unwrap();
    // Deleting twice is fine.
    db.delete_pending_transmission(a).await.unwrap();
    let loaded = db.pending_transmissions_with_config_digest(digest).await.unwrap();
    assert_eq!(loaded.keys().copied().collect::<Vec<_>>(), vec![b]);

    db.delete_pending_transmissions_older_than(UNIX_EPOCH + Duration::from_secs(250))
        .await
        .unwrap();
    assert!(db
        .pending_transmissions_with_config_digest(digest)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        db.pending_transmissions_with_config_digest(other)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_rocks_pacemaker_state() {
    let (db, _temp_dir) = create_rocks_db();
    check_pacemaker_state(&db).await;
}

#[tokio::test]
async fn test_rocks_pending_transmissions() {
    let (db, _temp_dir) = create_rocks_db();
    check_pending_transmissions(&db).await;
}

#[tokio::test]
async fn test_memory_pacemaker_state() {
    check_pacemaker_state(&MemoryDatabase::new()).await;
}

#[tokio::test]
async fn test_memory_pending_transmissions() {
    check_pending_transmissions(&MemoryDatabase::new()).await;
}

#[tokio::test]
async fn test_rocks_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let digest = ConfigDigest::new([9u8; 32]);
    let ts = ReportTimestamp::new(digest, 4, 2);
    let now = SystemTime::now();
    let mut record = pending(0);
    record.time = now;

    {
        let db = RocksDatabase::open_default(temp_dir.path()).unwrap();
        db.store_pending_transmission(ts, record.clone()).await.unwrap();
    }

    let db = RocksDatabase::open_default(temp_dir.path()).unwrap();
    let loaded = db.pending_transmissions_with_config_digest(digest).await.unwrap();
    assert_eq!(loaded.get(&ts), Some(&record));
}

#[tokio::test]
async fn test_memory_write_failure() {
    let db = MemoryDatabase::new();
    db.set_fail_writes(true);
    let ts = ReportTimestamp::new(ConfigDigest::default(), 1, 1);
    assert!(db.store_pending_transmission(ts, pending(1)).await.is_err());
    assert_eq!(db.pending_count(), 0);
}
