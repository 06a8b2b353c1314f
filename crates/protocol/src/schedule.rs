//! Transmission schedule.
//!
//! Transmitting is paid for on chain, so not every oracle should race to
//! submit the same report. For each round a keyed permutation of `0..N`
//! orders the committee; consecutive groups of sizes `S[0], S[1], ...` form
//! stages, and stage `i` waits `i × delta_stage` before transmitting. Each
//! later stage only transmits if the earlier ones did not.

use crate::domains;
use ocr_crypto::Hasher;
use ocr_types::{OracleId, ReportTimestamp};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::time::Duration;

/// Deterministic RNG for the round at `timestamp`.
fn create_rng(order_key: &[u8; 32], timestamp: &ReportTimestamp) -> ChaCha20Rng {
    let mut hasher = Hasher::new();
    hasher.update(domains::TRANSMISSION_ORDER);
    hasher.update(order_key);
    hasher.update(timestamp.config_digest.as_bytes());
    hasher.update(&timestamp.epoch.to_be_bytes());
    hasher.update(&[timestamp.round]);
    ChaCha20Rng::from_seed(hasher.finalize())
}

/// The committee in transmission order for the round at `timestamp`.
///
/// `order[p]` is the oracle at position `p`.
pub fn transmission_order(
    order_key: &[u8; 32],
    timestamp: &ReportTimestamp,
    n: usize,
) -> Vec<OracleId> {
    let mut order: Vec<OracleId> = (0..n).map(|i| i as OracleId).collect();
    let mut rng = create_rng(order_key, timestamp);

    // Fisher-Yates shuffle
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        order.swap(i, j);
    }

    order
}

/// Stage index of position `position` under stage sizes `stages`.
fn stage_of(position: usize, stages: &[usize]) -> Option<usize> {
    let mut end = 0usize;
    for (stage, size) in stages.iter().enumerate() {
        end = end.saturating_add(*size);
        if position < end {
            return Some(stage);
        }
    }
    None
}

/// How long `oracle` waits before transmitting the report of `timestamp`.
///
/// `None` if its position falls past the last stage: it never transmits
/// this report.
pub fn transmission_delay(
    order_key: &[u8; 32],
    timestamp: &ReportTimestamp,
    n: usize,
    oracle: OracleId,
    stages: &[usize],
    delta_stage: Duration,
) -> Option<Duration> {
    let order = transmission_order(order_key, timestamp, n);
    let position = order.iter().position(|&id| id == oracle)?;
    let stage = stage_of(position, stages)?;
    Some(delta_stage.saturating_mul(stage as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocr_types::ConfigDigest;

    fn ts(epoch: u32, round: u8) -> ReportTimestamp {
        ReportTimestamp::new(ConfigDigest::new([5u8; 32]), epoch, round)
    }

    #[test]
    fn test_order_is_a_permutation() {
        let mut order = transmission_order(&[1u8; 32], &ts(1, 1), 10);
        order.sort_unstable();
        assert_eq!(order, (0..10).collect::<Vec<OracleId>>());
    }

    #[test]
    fn test_order_is_deterministic_per_round() {
        let key = [1u8; 32];
        assert_eq!(
            transmission_order(&key, &ts(3, 2), 16),
            transmission_order(&key, &ts(3, 2), 16)
        );
        let distinct = (1..20u8)
            .map(|r| transmission_order(&key, &ts(3, r), 16))
            .collect::<std::collections::HashSet<_>>();
        assert!(distinct.len() > 1);
        assert_ne!(
            transmission_order(&key, &ts(3, 2), 16),
            transmission_order(&[2u8; 32], &ts(3, 2), 16)
        );
    }

    #[test]
    fn test_stage_boundaries() {
        let stages = [1, 1, 2];
        assert_eq!(stage_of(0, &stages), Some(0));
        assert_eq!(stage_of(1, &stages), Some(1));
        assert_eq!(stage_of(2, &stages), Some(2));
        assert_eq!(stage_of(3, &stages), Some(2));
        assert_eq!(stage_of(4, &stages), None);
        assert_eq!(stage_of(0, &[0, 0, 3]), Some(2));
    }

    #[test]
    fn test_delay_matches_position() {
        let key = [7u8; 32];
        let timestamp = ts(2, 4);
        let order = transmission_order(&key, &timestamp, 4);
        let step = Duration::from_millis(100);
        let stages = [1, 1, 1];

        for (position, &oracle) in order.iter().enumerate() {
            let delay = transmission_delay(&key, &timestamp, 4, oracle, &stages, step);
            if position < 3 {
                assert_eq!(delay, Some(step * position as u32));
            } else {
                assert_eq!(delay, None);
            }
        }
    }

    #[test]
    fn test_exactly_one_oracle_in_first_stage() {
        let key = [7u8; 32];
        for round in 1..30u8 {
            let zero_delay = (0..7u8)
                .filter(|&o| {
                    let delay = transmission_delay(
                        &key,
                        &ts(1, round),
                        7,
                        o,
                        &[1, 2, 4],
                        Duration::from_secs(1),
                    );
                    delay == Some(Duration::ZERO)
                })
                .count();
            assert_eq!(zero_delay, 1);
        }
    }
}
