//! RocksDB backend
//!
//! Values are JSON-encoded records from `ocr-types`. RocksDB calls are
//! synchronous, so every trait method hops onto the blocking pool.

use crate::keys::{pacemaker_key, parse_timestamp_key, timestamp_key};
use crate::{decode, encode, Result};
use async_trait::async_trait;
use ocr_core::{Database, DatabaseError};
use ocr_types::{ConfigDigest, PacemakerState, PendingTransmission, ReportTimestamp};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, DB,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Column family names
pub mod cf {
    /// Pacemaker state, keyed by config digest
    pub const PACEMAKER_STATE: &str = "pacemaker_state";
    /// Pending transmissions, keyed by report timestamp
    pub const PENDING_TRANSMISSIONS: &str = "pending_transmissions";

    /// All column families
    pub const ALL: &[&str] = &[PACEMAKER_STATE, PENDING_TRANSMISSIONS];
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the database directory
    pub path: String,
    /// Enable compression (LZ4)
    pub enable_compression: bool,
    /// Maximum number of open files
    pub max_open_files: i32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: String::from("./data/ocr"),
            enable_compression: true,
            max_open_files: 128,
        }
    }
}

struct Inner {
    db: DBWithThreadMode<MultiThreaded>,
    path: String,
}

impl Inner {
    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| DatabaseError::Internal(format!("column family not found: {}", name)))
    }

    fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(cf_name)?;
        self.db.get_cf(&cf, key).map_err(io_error)
    }

    fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        self.db.put_cf(&cf, key, value).map_err(io_error)
    }

    fn delete(&self, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        self.db.delete_cf(&cf, key).map_err(io_error)
    }

    /// All entries of `cf_name` whose key starts with `prefix`.
    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf_handle(cf_name)?;
        let mut entries = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(io_error)?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key, value));
        }
        Ok(entries)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        debug!("Closing database at: {}", self.path);
    }
}

fn io_error(e: rocksdb::Error) -> DatabaseError {
    DatabaseError::Io(e.to_string())
}

/// RocksDB-backed [`Database`].
#[derive(Clone)]
pub struct RocksDatabase {
    inner: Arc<Inner>,
}

impl RocksDatabase {
    /// Open or create a database at the configured path
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        info!("Opening database at: {}", config.path);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);

        if config.enable_compression {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = cf::ALL
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, Path::new(&config.path), cf_descriptors)
            .map_err(io_error)?;

        info!(
            "Database opened successfully with {} column families",
            cf::ALL.len()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                db,
                path: config.path,
            }),
        })
    }

    /// Open database with default options at `path`
    pub fn open_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(DatabaseConfig {
            path: path.as_ref().to_string_lossy().to_string(),
            ..Default::default()
        })
    }

    /// Get the path to the database
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| DatabaseError::Internal(e.to_string()))?
    }
}

#[async_trait]
impl Database for RocksDatabase {
    async fn read_pacemaker_state(
        &self,
        config_digest: ConfigDigest,
    ) -> Result<Option<PacemakerState>> {
        self.blocking(move |inner| {
            inner
                .get(cf::PACEMAKER_STATE, &pacemaker_key(&config_digest))?
                .map(|bytes| decode(&bytes))
                .transpose()
        })
        .await
    }

    async fn write_pacemaker_state(
        &self,
        config_digest: ConfigDigest,
        state: PacemakerState,
    ) -> Result<()> {
        let value = encode(&state)?;
        self.blocking(move |inner| {
            inner.put(cf::PACEMAKER_STATE, &pacemaker_key(&config_digest), &value)
        })
        .await
    }

    async fn store_pending_transmission(
        &self,
        timestamp: ReportTimestamp,
        transmission: PendingTransmission,
    ) -> Result<()> {
        let value = encode(&transmission)?;
        self.blocking(move |inner| {
            inner.put(
                cf::PENDING_TRANSMISSIONS,
                &timestamp_key(&timestamp),
                &value,
            )
        })
        .await
    }

    async fn pending_transmissions_with_config_digest(
        &self,
        config_digest: ConfigDigest,
    ) -> Result<HashMap<ReportTimestamp, PendingTransmission>> {
        self.blocking(move |inner| {
            inner
                .scan_prefix(cf::PENDING_TRANSMISSIONS, config_digest.as_bytes())?
                .into_iter()
                .map(|(key, value)| Ok((parse_timestamp_key(&key)?, decode(&value)?)))
                .collect()
        })
        .await
    }

    async fn delete_pending_transmission(&self, timestamp: ReportTimestamp) -> Result<()> {
        self.blocking(move |inner| {
            inner.delete(cf::PENDING_TRANSMISSIONS, &timestamp_key(&timestamp))
        })
        .await
    }

    async fn delete_pending_transmissions_older_than(&self, time: SystemTime) -> Result<()> {
        self.blocking(move |inner| {
            let mut deleted = 0usize;
            for (key, value) in inner.scan_prefix(cf::PENDING_TRANSMISSIONS, &[])? {
                let transmission: PendingTransmission = decode(&value)?;
                if transmission.time < time {
                    inner.delete(cf::PENDING_TRANSMISSIONS, &key)?;
                    deleted += 1;
                }
            }
            debug!(deleted, "Deleted stale pending transmissions");
            Ok(())
        })
        .await
    }
}
