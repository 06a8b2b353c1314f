//! # OCR Simulator
//!
//! Runs a whole offchain reporting committee in one process over the
//! in-memory network, against a mock contract, and prints what reached the
//! contract.

use anyhow::{bail, Context, Result};
use clap::Parser;
use ocr_config::Config;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod simulation;

use simulation::{Simulation, SimulationOptions};

/// Offchain reporting committee simulator
#[derive(Parser, Debug)]
#[command(name = "ocr-sim")]
#[command(version)]
#[command(about = "Run an offchain reporting committee in-process and report what it transmits")]
#[command(long_about = None)]
struct Cli {
    /// Committee size
    #[arg(short = 'n', long, default_value = "4")]
    oracles: usize,

    /// Tolerated faulty oracles
    #[arg(short, long, default_value = "1")]
    faults: usize,

    /// How long to run
    #[arg(short, long, default_value = "20")]
    duration_secs: u64,

    /// TOML file whose `[shared]` timings and `[local]` settings are used;
    /// the committee itself is always generated
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Crash the current leader a third of the way through
    #[arg(long)]
    crash_leader: bool,

    /// Seed for the generated committee keys
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Enable verbose logging (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log format: text, json, or compact
    #[arg(long, default_value = "text")]
    log_format: LogFormat,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
    Compact,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting OCR simulator");

    if cli.oracles == 0 || cli.oracles > ocr_types::MAX_ORACLES {
        bail!(
            "--oracles must be between 1 and {}, got {}",
            ocr_types::MAX_ORACLES,
            cli.oracles
        );
    }

    let base = match &cli.config {
        Some(path) => Some(load_base_config(path)?),
        None => None,
    };

    let options = SimulationOptions {
        oracles: cli.oracles,
        faults: cli.faults,
        duration: Duration::from_secs(cli.duration_secs),
        crash_leader: cli.crash_leader,
        seed: cli.seed,
        base,
    };

    let simulation = Simulation::start(options)?;
    let summary = simulation.run().await;
    summary.print();

    Ok(())
}

/// Read a config file without committee validation: only its timings and
/// local settings are used.
fn load_base_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    config.local.validate().context("invalid [local] section")?;
    Ok(config)
}

/// Initialize tracing with the configured format and verbosity
fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = match cli.verbose {
        0 => "info,ocr_protocol=info",
        1 => "info,ocr_protocol=debug",
        2 => "debug,ocr_protocol=debug",
        _ => "trace,ocr_protocol=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true))
                .with(env_filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(env_filter)
                .init();
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(fmt::layer().compact())
                .with(env_filter)
                .init();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["ocr-sim"]);
        assert_eq!(cli.oracles, 4);
        assert_eq!(cli.faults, 1);
        assert_eq!(cli.duration_secs, 20);
        assert!(!cli.crash_leader);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_flags() {
        let cli = Cli::parse_from([
            "ocr-sim",
            "--oracles",
            "7",
            "--faults",
            "2",
            "--duration-secs",
            "5",
            "--crash-leader",
            "--log-format",
            "json",
        ]);
        assert_eq!(cli.oracles, 7);
        assert_eq!(cli.faults, 2);
        assert_eq!(cli.duration_secs, 5);
        assert!(cli.crash_leader);
        assert!(matches!(cli.log_format, LogFormat::Json));
    }
}
