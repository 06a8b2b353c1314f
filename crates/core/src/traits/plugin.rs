//! Reporting plugin: the domain logic of a report.
//!
//! The protocol decides *when* to ask and *who* agrees; the plugin decides
//! *what* is observed and reported. Every call is made with a deadline by
//! the caller and an overrunning call is logged, never aborted.

use async_trait::async_trait;
use ocr_types::{AttributedObservation, ReportTimestamp};
use thiserror::Error;

/// Errors a plugin may return.
#[derive(Error, Debug)]
pub enum PluginError {
    /// The data source could not be reached.
    #[error("data source unavailable: {0}")]
    Unavailable(String),

    /// The input could not be processed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Generic plugin error.
    #[error("plugin error: {0}")]
    Internal(String),
}

/// Result type for plugin calls.
pub type PluginResult<T> = Result<T, PluginError>;

/// Static description of a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportingPluginInfo {
    /// Name used in logs
    pub name: String,
    /// Whether honest oracles always produce byte-identical reports.
    ///
    /// Selects the larger `⌊(N+F)/2⌋+1` report quorum when set, `F+1` otherwise.
    pub unique_reports: bool,
    /// Largest acceptable query
    pub max_query_length: usize,
    /// Largest acceptable observation
    pub max_observation_length: usize,
    /// Largest acceptable report
    pub max_report_length: usize,
}

/// Domain logic driven by the protocol.
#[async_trait]
pub trait ReportingPlugin: Send + Sync + 'static {
    /// Static plugin description.
    fn info(&self) -> ReportingPluginInfo;

    /// Leader only: the query sent to followers at the start of a round.
    async fn query(&self, timestamp: &ReportTimestamp) -> PluginResult<Vec<u8>>;

    /// Follower: observe the world in response to `query`.
    async fn observation(&self, timestamp: &ReportTimestamp, query: &[u8])
        -> PluginResult<Vec<u8>>;

    /// Follower: build a report from a quorum of observations.
    ///
    /// `Ok(None)` means nothing needs reporting this round.
    async fn report(
        &self,
        timestamp: &ReportTimestamp,
        query: &[u8],
        observations: &[AttributedObservation],
    ) -> PluginResult<Option<Vec<u8>>>;

    /// Whether a finalized report should be scheduled for transmission at all.
    async fn should_accept_finalized_report(
        &self,
        timestamp: &ReportTimestamp,
        report: &[u8],
    ) -> PluginResult<bool>;

    /// Last-moment check before transmitting, e.g. whether another oracle already did.
    async fn should_transmit_accepted_report(
        &self,
        timestamp: &ReportTimestamp,
        report: &[u8],
    ) -> PluginResult<bool>;
}
