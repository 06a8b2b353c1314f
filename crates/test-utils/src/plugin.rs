//! Median reporting plugin.
//!
//! Each oracle observes a `u64` it is told about through
//! [`MedianPlugin::set_value`]. The report is the big-endian median of the
//! observations, so honest oracles holding the same observation set produce
//! identical reports.

use crate::contract::MockContract;
use async_trait::async_trait;
use ocr_core::{PluginError, PluginResult, ReportingPlugin, ReportingPluginInfo};
use ocr_types::{AttributedObservation, ReportTimestamp};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Reporting plugin producing medians.
#[derive(Debug, Default)]
pub struct MedianPlugin {
    value: AtomicU64,
    skip_reports: AtomicBool,
    fail_observations: AtomicBool,
    observation_delay_ms: AtomicU64,
    contract: Option<Arc<MockContract>>,
    observations: AtomicUsize,
    reports: AtomicUsize,
}

impl MedianPlugin {
    /// Plugin observing `value`.
    pub fn new(value: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
            ..Self::default()
        }
    }

    /// Plugin that consults `contract` before accepting or transmitting.
    pub fn with_contract(value: u64, contract: Arc<MockContract>) -> Self {
        Self {
            contract: Some(contract),
            ..Self::new(value)
        }
    }

    /// Change the observed value.
    pub fn set_value(&self, value: u64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Report nothing (`Ok(None)`) while set.
    pub fn set_skip_reports(&self, skip: bool) {
        self.skip_reports.store(skip, Ordering::SeqCst);
    }

    /// Fail every observation while set.
    pub fn set_fail_observations(&self, fail: bool) {
        self.fail_observations.store(fail, Ordering::SeqCst);
    }

    /// Delay every observation by `delay`.
    pub fn set_observation_delay(&self, delay: Duration) {
        self.observation_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Observations made so far
    pub fn observation_count(&self) -> usize {
        self.observations.load(Ordering::SeqCst)
    }

    /// Reports built so far
    pub fn report_count(&self) -> usize {
        self.reports.load(Ordering::SeqCst)
    }

    /// Median encoded in a report.
    pub fn decode_report(report: &[u8]) -> Option<u64> {
        Some(u64::from_be_bytes(report.try_into().ok()?))
    }

    fn is_newer_than_contract(&self, timestamp: &ReportTimestamp) -> bool {
        match &self.contract {
            Some(contract) => contract
                .latest()
                .map_or(true, |latest| timestamp.epoch_round() > latest),
            None => true,
        }
    }
}

#[async_trait]
impl ReportingPlugin for MedianPlugin {
    fn info(&self) -> ReportingPluginInfo {
        ReportingPluginInfo {
            name: "median".to_string(),
            unique_reports: true,
            max_query_length: 64,
            max_observation_length: 8,
            max_report_length: 8,
        }
    }

    async fn query(&self, _timestamp: &ReportTimestamp) -> PluginResult<Vec<u8>> {
        Ok(b"median".to_vec())
    }

    async fn observation(
        &self,
        _timestamp: &ReportTimestamp,
        _query: &[u8],
    ) -> PluginResult<Vec<u8>> {
        let delay = self.observation_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_observations.load(Ordering::SeqCst) {
            return Err(PluginError::Unavailable("observations disabled".to_string()));
        }
        self.observations.fetch_add(1, Ordering::SeqCst);
        Ok(self.value.load(Ordering::SeqCst).to_be_bytes().to_vec())
    }

    async fn report(
        &self,
        _timestamp: &ReportTimestamp,
        _query: &[u8],
        observations: &[AttributedObservation],
    ) -> PluginResult<Option<Vec<u8>>> {
        self.reports.fetch_add(1, Ordering::SeqCst);
        if self.skip_reports.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let mut values: Vec<u64> = observations
            .iter()
            .filter_map(|ao| Self::decode_report(&ao.observation))
            .collect();
        if values.is_empty() {
            return Err(PluginError::InvalidInput("no decodable observations".to_string()));
        }
        values.sort_unstable();
        Ok(Some(values[values.len() / 2].to_be_bytes().to_vec()))
    }

    async fn should_accept_finalized_report(
        &self,
        timestamp: &ReportTimestamp,
        _report: &[u8],
    ) -> PluginResult<bool> {
        Ok(self.is_newer_than_contract(timestamp))
    }

    async fn should_transmit_accepted_report(
        &self,
        timestamp: &ReportTimestamp,
        _report: &[u8],
    ) -> PluginResult<bool> {
        Ok(self.is_newer_than_contract(timestamp))
    }
}
