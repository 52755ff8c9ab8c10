//! Load-balancing heuristics for the driver thread.
//!
//! The driver thread both produces input and, when the dedicated worker falls
//! behind, performs transformations itself ("steals"). Three rules decide
//! when, each evaluated under the queue lock:
//!
//! 1. **Queue full** ([`steal_when_full`]): the driver is about to block on
//!    backpressure; finishing existing work beats idle waiting. It must leave
//!    at least one pending slot behind so the worker is never starved while
//!    the driver is mid-transformation.
//! 2. **End of input** ([`steal_at_end`]): nobody will add more work, so any
//!    pending slot is fair game.
//! 3. **Opportunistic** ([`BalancerConfig::steal_opportunistic`]): right
//!    after a successful enqueue, steal only small work from a short queue so
//!    the driver stays responsive to the source. Oversized items are left for
//!    the worker.
//!
//! These are throughput heuristics, not correctness requirements: any
//! decision preserves ordering and exactly-once processing.

/// Default low-water mark on accumulated pending bytes, roughly one
/// decompression chunk's worth of buffered decoded data.
pub const DEFAULT_LOW_WATER_BYTES: usize = 128 * 1024;

/// Default minimum batch size used to scale the opportunistic rule.
pub const DEFAULT_MIN_BATCH: usize = 8;

/// Tunable parameters for the opportunistic steal rule.
///
/// These are performance knobs, not correctness knobs.
#[derive(Debug, Clone)]
pub struct BalancerConfig {
    /// Steal opportunistically only while pending bytes stay below this.
    pub low_water_bytes: usize,
    /// Minimum batch size; scales both the pending-count cutoff and the
    /// average size a steal candidate is measured against.
    pub min_batch: usize,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self { low_water_bytes: DEFAULT_LOW_WATER_BYTES, min_batch: DEFAULT_MIN_BATCH }
    }
}

impl BalancerConfig {
    /// Whether the driver should steal right after a successful enqueue.
    ///
    /// All three conditions must hold:
    /// - pending bytes are below the low-water mark, so the source is not
    ///   starved of buffered decoded data;
    /// - the pending item count is below half the minimum batch size;
    /// - the candidate is no larger than the average pending size
    ///   (`pending_bytes / min_batch`), leaving oversized items to the
    ///   dedicated worker so the driver is not tied up too long.
    #[must_use]
    pub fn steal_opportunistic(
        &self,
        pending_count: usize,
        pending_bytes: usize,
        candidate_size: usize,
    ) -> bool {
        pending_bytes < self.low_water_bytes
            && pending_count < self.min_batch.div_ceil(2)
            && candidate_size <= pending_bytes / self.min_batch.max(1)
    }
}

/// Whether the driver may steal when `enqueue` would otherwise block.
///
/// Requires at least two pending slots so one is left for the worker.
#[must_use]
pub fn steal_when_full(pending_count: usize) -> bool {
    pending_count >= 2
}

/// Whether the driver should steal once input is exhausted.
///
/// Any single pending slot suffices; no one else will add more work.
#[must_use]
pub fn steal_at_end(pending_count: usize) -> bool {
    pending_count >= 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steal_when_full_leaves_one_for_worker() {
        assert!(!steal_when_full(0));
        assert!(!steal_when_full(1));
        assert!(steal_when_full(2));
        assert!(steal_when_full(5));
    }

    #[test]
    fn test_steal_at_end_takes_anything() {
        assert!(!steal_at_end(0));
        assert!(steal_at_end(1));
    }

    #[test]
    fn test_opportunistic_requires_low_water() {
        let config = BalancerConfig { low_water_bytes: 1000, min_batch: 8 };
        // 3 pending, 800 bytes pending, 50-byte candidate: all rules hold.
        assert!(config.steal_opportunistic(3, 800, 50));
        // Pending bytes at or above the low-water mark.
        assert!(!config.steal_opportunistic(3, 1000, 50));
    }

    #[test]
    fn test_opportunistic_requires_short_queue() {
        let config = BalancerConfig { low_water_bytes: 1000, min_batch: 8 };
        // Count cutoff is half the minimum batch.
        assert!(config.steal_opportunistic(3, 800, 50));
        assert!(!config.steal_opportunistic(4, 800, 50));
    }

    #[test]
    fn test_opportunistic_skips_oversized_candidates() {
        let config = BalancerConfig { low_water_bytes: 1000, min_batch: 8 };
        // Average pending size is 800 / 8 = 100 bytes.
        assert!(config.steal_opportunistic(1, 800, 100));
        assert!(!config.steal_opportunistic(1, 800, 101));
    }
}
