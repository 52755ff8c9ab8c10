//! Progress tracking utilities.
//!
//! Thread-safe tracker that logs at regular count intervals, so long runs
//! show signs of life without logging every item.

use std::sync::atomic::{AtomicU64, Ordering};

use log::info;

/// Logs progress each time an internal count crosses an interval boundary.
///
/// Safe to share across threads.
pub struct ProgressTracker {
    interval: u64,
    message: String,
    count: AtomicU64,
}

impl ProgressTracker {
    /// Create a tracker with the given message prefix and a default interval
    /// of 10,000.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { interval: 10_000, message: message.into(), count: AtomicU64::new(0) }
    }

    /// Set the logging interval.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Add to the count, logging once per interval boundary crossed.
    pub fn log_if_needed(&self, additional: u64) {
        if additional == 0 {
            return;
        }
        let prev = self.count.fetch_add(additional, Ordering::Relaxed);
        let new_count = prev + additional;
        for crossed in (prev / self.interval + 1)..=(new_count / self.interval) {
            info!("{} {}", self.message, crossed * self.interval);
        }
    }

    /// Log the final count unless it landed exactly on an interval boundary
    /// (which already logged).
    pub fn log_final(&self) {
        let count = self.count.load(Ordering::Relaxed);
        if count > 0 && count % self.interval != 0 {
            info!("{} {} (complete)", self.message, count);
        }
    }

    /// Current count.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
