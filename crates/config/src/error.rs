//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or write the configuration file
    #[error("Failed to access config file at {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration
    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize configuration
    #[error("Failed to serialize config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Committee is empty or larger than supported
    #[error("Invalid committee size: must be between 1 and {max}, got {n}")]
    InvalidCommitteeSize { n: usize, max: usize },

    /// Fault tolerance out of range
    #[error("Invalid fault tolerance: need 0 < f and 3f < n, got f={f} with n={n}")]
    InvalidFaultTolerance { n: usize, f: usize },

    /// Maximum rounds per epoch out of range
    #[error("Invalid r_max: must be between 1 and 254, got {0}")]
    InvalidRMax(u8),

    /// Invalid timeout configuration
    #[error("Invalid timeout: {name} must be positive, got {value}ms")]
    InvalidTimeout { name: &'static str, value: u64 },

    /// Timeouts in the wrong relative order
    #[error("Invalid timeout ordering: {0}")]
    InvalidTimeoutOrdering(String),

    /// Transmission schedule is unusable
    #[error("Invalid transmission schedule: {0}")]
    InvalidSchedule(String),

    /// Two committee members share an identifier
    #[error("Duplicate {field} in committee: {value}")]
    DuplicateOracle { field: &'static str, value: String },

    /// Channel capacity of zero
    #[error("Invalid capacity: {0} must be positive")]
    InvalidCapacity(&'static str),

    /// Invalid log level
    #[error("Invalid log level: {0}. Valid values: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Invalid log format
    #[error("Invalid log format: {0}. Valid values: json, pretty, compact")]
    InvalidLogFormat(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
