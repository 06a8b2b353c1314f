//! # OCR Test Utilities
//!
//! Fixtures shared by the protocol tests and the simulator:
//!
//! - [`TestCommittee`] - deterministic keyrings, identities and a fast `SharedConfig`
//! - [`MemoryNetwork`] - in-process transport with per-oracle offline switches
//! - [`RecordingEndpoint`] - endpoint that only records what was sent
//! - [`MedianPlugin`] - reporting plugin reporting the median of observed values
//! - [`MockContract`] / [`MockTransmitter`] - contract accepting increasing, quorum-signed reports

#![warn(missing_docs)]

pub mod committee;
pub mod contract;
pub mod network;
pub mod plugin;

pub use committee::TestCommittee;
pub use contract::{MockContract, MockTransmitter, Transmission};
pub use network::{MemoryEndpoint, MemoryNetwork, Outbound, RecordingEndpoint};
pub use plugin::MedianPlugin;
