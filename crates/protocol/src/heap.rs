//! Scheduling heap for pending transmissions.
//!
//! A min-heap on the due time, ties broken by report timestamp so pops are
//! deterministic.

use ocr_types::{PendingTransmission, ReportTimestamp};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tokio::time::Instant;

/// A transmission waiting for its stage delay to elapse.
#[derive(Debug, Clone)]
pub struct ScheduledTransmission {
    /// When the transmission is due
    pub due: Instant,
    /// Round that produced the report
    pub timestamp: ReportTimestamp,
    /// The persisted record
    pub pending: PendingTransmission,
}

impl PartialEq for ScheduledTransmission {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledTransmission {}

impl PartialOrd for ScheduledTransmission {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTransmission {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.timestamp).cmp(&(other.due, other.timestamp))
    }
}

/// Earliest-first queue of [`ScheduledTransmission`]s.
#[derive(Debug, Default)]
pub struct TransmissionHeap {
    entries: BinaryHeap<Reverse<ScheduledTransmission>>,
}

impl TransmissionHeap {
    /// Create an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a transmission.
    pub fn push(&mut self, entry: ScheduledTransmission) {
        self.entries.push(Reverse(entry));
    }

    /// The earliest entry, if any.
    pub fn peek(&self) -> Option<&ScheduledTransmission> {
        self.entries.peek().map(|Reverse(entry)| entry)
    }

    /// Remove and return the earliest entry.
    pub fn pop(&mut self) -> Option<ScheduledTransmission> {
        self.entries.pop().map(|Reverse(entry)| entry)
    }

    /// Due time of the earliest entry.
    pub fn next_due(&self) -> Option<Instant> {
        self.peek().map(|entry| entry.due)
    }

    /// Remove and return the earliest entry if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<ScheduledTransmission> {
        if self.next_due()? <= now {
            self.pop()
        } else {
            None
        }
    }

    /// Number of scheduled entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is scheduled
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocr_types::ConfigDigest;
    use std::time::{Duration, SystemTime};

    fn entry(due: Instant, epoch: u32, round: u8) -> ScheduledTransmission {
        ScheduledTransmission {
            due,
            timestamp: ReportTimestamp::new(ConfigDigest::new([1u8; 32]), epoch, round),
            pending: PendingTransmission {
                time: SystemTime::UNIX_EPOCH,
                extra_hash: [0u8; 32],
                report: vec![round],
                attributed_signatures: vec![],
            },
        }
    }

    #[test]
    fn test_pops_earliest_first() {
        let now = Instant::now();
        let mut heap = TransmissionHeap::new();
        heap.push(entry(now + Duration::from_secs(3), 1, 1));
        heap.push(entry(now + Duration::from_secs(1), 1, 2));
        heap.push(entry(now + Duration::from_secs(2), 1, 3));

        let order: Vec<u8> = std::iter::from_fn(|| heap.pop())
            .map(|e| e.timestamp.round)
            .collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert!(heap.is_empty());
    }

    #[test]
    fn test_ties_broken_by_timestamp() {
        let now = Instant::now();
        let mut heap = TransmissionHeap::new();
        heap.push(entry(now, 2, 1));
        heap.push(entry(now, 1, 5));
        heap.push(entry(now, 1, 4));

        assert_eq!(heap.pop().unwrap().timestamp.epoch_round().round, 4);
        assert_eq!(heap.pop().unwrap().timestamp.epoch_round().round, 5);
        assert_eq!(heap.pop().unwrap().timestamp.epoch, 2);
    }

    #[test]
    fn test_pop_due_respects_deadline() {
        let now = Instant::now();
        let mut heap = TransmissionHeap::new();
        heap.push(entry(now + Duration::from_secs(5), 1, 1));

        assert!(heap.pop_due(now).is_none());
        assert_eq!(heap.len(), 1);
        assert!(heap.pop_due(now + Duration::from_secs(5)).is_some());
        assert!(heap.pop_due(now + Duration::from_secs(10)).is_none());
    }
}
