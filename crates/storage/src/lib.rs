//! OCR Storage Layer
//!
//! Implementations of [`ocr_core::Database`]:
//!
//! - **RocksDatabase**: RocksDB with one column family per record kind
//! - **MemoryDatabase**: lock-guarded maps, for tests and simulations
//!
//! Both store records under keys prefixed by the config digest, so several
//! configurations can share one store.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod db;
pub mod keys;
pub mod memory;

pub use db::{DatabaseConfig, RocksDatabase};
pub use memory::MemoryDatabase;

use ocr_core::DatabaseError;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

pub(crate) fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| DatabaseError::Serialization(e.to_string()))
}
