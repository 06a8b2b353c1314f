//! # OCR Configuration
//!
//! Configuration parsing and validation for an offchain reporting oracle.
//!
//! One `ocr.toml` holds everything one oracle needs:
//!
//! ```rust,ignore
//! use ocr_config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("ocr.toml"))?;
//! println!("committee of {} with f={}", config.shared.n(), config.shared.f);
//! println!("round interval: {:?}", config.shared.delta_round());
//! ```
//!
//! ## Configuration Sections
//!
//! - `[shared]` - Parameters every committee member must agree on (committee,
//!   fault tolerance, protocol timings, transmission schedule, shared keys)
//! - `[[shared.oracles]]` - Committee members in index order
//! - `[local]` - Per-node settings (timeouts around external calls, queue sizes)
//! - `[logging]` - Logging settings (level, format)

mod config;
mod error;

pub use config::*;
pub use error::*;
