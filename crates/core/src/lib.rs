//! # OCR Core - Collaborator Abstractions
//!
//! The protocol core talks to the outside world only through the traits in
//! this crate:
//!
//! - **Network**: best-effort point-to-point and broadcast messaging
//! - **Reporting plugin**: the domain logic producing queries, observations and reports
//! - **Contract transmitter**: the on-chain submission of a finalized report
//! - **Database**: crash-recovery persistence
//! - **Keyrings**: onchain report attestation and offchain observation signing
//!
//! # Swappable Components
//!
//! | Component | Trait | Implementations |
//! |-----------|-------|-----------------|
//! | Network | `NetworkEndpoint` | in-memory (tests), transport adapters |
//! | Storage | `Database` | `MemoryDatabase`, `RocksDatabase` |
//! | Signing | `OnchainKeyring`, `OffchainKeyring` | secp256k1 ECDSA |
//!
//! All traits require `Send + Sync` so one instance can be shared by every
//! protocol task behind an `Arc`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod traits;

pub use traits::{
    // Database
    Database, DatabaseError, DatabaseResult,
    // Keyrings
    KeyringError, KeyringResult, OffchainKeyring, OnchainKeyring,
    // Network
    NetworkEndpoint,
    // Plugin
    PluginError, PluginResult, ReportingPlugin, ReportingPluginInfo,
    // Transmitter
    ContractTransmitter, TransmitError, TransmitResult,
};
