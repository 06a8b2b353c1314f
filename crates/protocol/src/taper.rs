//! Logarithmic log tapering.
//!
//! A full queue can drop thousands of messages a second; logging every drop
//! would bury everything else. A [`Taper`] lets the 1st, 2nd, 4th, 8th, ...
//! occurrence through.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counts occurrences and fires on powers of two.
#[derive(Debug, Default)]
pub struct Taper {
    count: AtomicU64,
}

impl Taper {
    /// Create a taper with a zero count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence; calls `f` with the running count when it is a power of two.
    pub fn trigger(&self, f: impl FnOnce(u64)) {
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if count.is_power_of_two() {
            f(count);
        }
    }

    /// Reset the count, calling `f` with the old count if anything was recorded.
    pub fn reset(&self, f: impl FnOnce(u64)) {
        let count = self.count.swap(0, Ordering::Relaxed);
        if count > 0 {
            f(count);
        }
    }

    /// Occurrences since the last reset
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
