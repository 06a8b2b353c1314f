//! Collaborator traits.
//!
//! Protocol crates depend on these traits rather than on concrete
//! implementations, so tests can substitute in-memory versions.
//!
//! ```ignore
//! use ocr_core::traits::{Database, NetworkEndpoint, ReportingPlugin};
//!
//! fn spawn_oracle<D: Database, P: ReportingPlugin>(db: Arc<D>, plugin: Arc<P>) {
//!     // works with any backend
//! }
//! ```

mod database;
mod keyring;
mod network;
mod plugin;
mod transmitter;

pub use database::*;
pub use keyring::*;
pub use network::*;
pub use plugin::*;
pub use transmitter::*;
