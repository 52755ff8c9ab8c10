//! The bounded, order-preserving job queue.
//!
//! [`WorkQueue`] is a monitor: one mutex guarding the slot table, its
//! aggregates, and the output sink, plus two wait conditions ("space
//! available" for the producer, "item available" for the worker). Both
//! transformer roles, the dedicated worker and the driver when it steals,
//! follow the same protocol: claim a pending slot under the lock, transform
//! with the lock released, then complete under the lock.
//!
//! # Ordering
//!
//! Transformations may complete out of order, but emission is strictly in
//! arrival order. [`WorkQueue::complete`] flushes the longest contiguous
//! `Ready` prefix from the head and stops at the first slot that is still
//! `Pending` or `InProgress`, so a result is emitted only once every earlier
//! result has been.
//!
//! # Failure
//!
//! Any failure is fatal to the run. The first error marks the queue failed
//! and wakes all waiters; a thread blocked in a queue wait then returns
//! [`PipelineError::Aborted`] instead of deadlocking against a peer that will
//! never signal again.

use std::io::Write;

use parking_lot::{Condvar, Mutex};

use crate::balance::{self, BalancerConfig};
use crate::errors::{PipelineError, Result};
use crate::slot::{NextPending, Slot, SlotTable, Token};

/// A pending item claimed for transformation.
///
/// The token re-locates the slot at completion time; the slot's position may
/// shift under compaction while the transformation runs unlocked.
#[derive(Debug)]
pub struct Claim {
    pub(crate) token: Token,
    pub(crate) payload: Vec<u8>,
}

/// Outcome of the driver's enqueue attempt.
#[derive(Debug)]
pub enum Enqueue {
    /// The payload was appended to the queue.
    Accepted,
    /// The queue was full with work to spare: the payload comes back and the
    /// caller should transform the claim before retrying.
    Rejected {
        /// The payload handed back, untouched.
        payload: Vec<u8>,
        /// The pending slot claimed to make room.
        claim: Claim,
    },
}

/// Aggregate queue counters, read under the lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    /// Slots currently `Pending` (sentinel excluded).
    pub pending_count: usize,
    /// Total payload bytes across `Pending` slots.
    pub pending_bytes: usize,
    /// High-water occupancy (non-flushed slots) over the queue's lifetime.
    pub peak_count: usize,
    /// Results emitted to the sink.
    pub emitted_items: u64,
    /// Bytes emitted to the sink.
    pub emitted_bytes: u64,
}

struct Inner<W> {
    table: SlotTable,
    /// Count and byte aggregates over `Pending` slots, maintained
    /// incrementally for O(1) load-balancing decisions.
    pending_count: usize,
    pending_bytes: usize,
    next_token: u64,
    failed: bool,
    peak_count: usize,
    emitted_items: u64,
    emitted_bytes: u64,
    sink: W,
}

/// Bounded queue coordinating the driver and the worker.
pub struct WorkQueue<W> {
    inner: Mutex<Inner<W>>,
    /// Signaled when compaction frees a slot.
    space: Condvar,
    /// Signaled when a pending slot (or the sentinel) appears.
    items: Condvar,
    balancer: BalancerConfig,
}

impl<W: Write> WorkQueue<W> {
    /// Create a queue with a fixed slot capacity, owning the output sink.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, balancer: BalancerConfig, sink: W) -> Self {
        Self {
            inner: Mutex::new(Inner {
                table: SlotTable::new(capacity),
                pending_count: 0,
                pending_bytes: 0,
                next_token: 0,
                failed: false,
                peak_count: 0,
                emitted_items: 0,
                emitted_bytes: 0,
                sink,
            }),
            space: Condvar::new(),
            items: Condvar::new(),
            balancer,
        }
    }

    /// Append an item, blocking while the queue is at capacity.
    ///
    /// Drivers normally call [`WorkQueue::enqueue_or_steal`] instead, which
    /// tries to make room by finishing existing work before waiting.
    pub fn enqueue(&self, payload: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.lock();
        while inner.table.is_full() {
            if inner.failed {
                return Err(PipelineError::Aborted);
            }
            self.space.wait(&mut inner);
        }
        if inner.failed {
            return Err(PipelineError::Aborted);
        }
        self.append_pending(&mut inner, payload);
        Ok(())
    }

    /// Append an item, or hand back a claim when the queue is full and there
    /// is enough pending work to steal from.
    ///
    /// Steal-before-block: if the queue is full with at least two pending
    /// slots, the first pending slot is claimed and returned along with the
    /// rejected payload, leaving one slot for the worker. With fewer than two
    /// pending the driver waits on "space available" instead.
    pub fn enqueue_or_steal(&self, payload: Vec<u8>) -> Result<Enqueue> {
        let mut inner = self.inner.lock();
        loop {
            if inner.failed {
                return Err(PipelineError::Aborted);
            }
            if !inner.table.is_full() {
                self.append_pending(&mut inner, payload);
                return Ok(Enqueue::Accepted);
            }
            if balance::steal_when_full(inner.pending_count) {
                let claim = claim_first(&mut inner);
                return Ok(Enqueue::Rejected { payload, claim });
            }
            self.space.wait(&mut inner);
        }
    }

    /// Claim the next pending slot, blocking until one exists.
    ///
    /// Returns `None` when the terminal sentinel is reached: input is
    /// exhausted and the worker should exit. The transformation itself must
    /// run with the lock released; this method returns as soon as the slot is
    /// marked `InProgress`.
    pub fn claim_next(&self) -> Result<Option<Claim>> {
        let mut inner = self.inner.lock();
        loop {
            if inner.failed {
                return Err(PipelineError::Aborted);
            }
            match inner.table.find_pending(0) {
                NextPending::Item(index) => return Ok(Some(claim_at(&mut inner, index))),
                NextPending::End => return Ok(None),
                NextPending::None => self.items.wait(&mut inner),
            }
        }
    }

    /// Store a transform result and flush the ready prefix to the sink.
    ///
    /// The slot is located by its token, scanning from the head. If the queue
    /// was at capacity before the flush compacted it, "space available" is
    /// signaled.
    pub fn complete(&self, token: Token, result: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.failed {
            return Err(PipelineError::Aborted);
        }
        let was_full = inner.table.is_full();
        let index = inner
            .table
            .find_claimed(token)
            .expect("an in-flight token always has a slot until it is completed");
        inner.table.store_result(index, result);
        self.flush_ready(&mut inner)?;
        if was_full && !inner.table.is_full() {
            self.space.notify_one();
        }
        Ok(())
    }

    /// Claim the first pending slot if the opportunistic rules allow it.
    ///
    /// Invoked by the driver right after a successful enqueue; see
    /// [`BalancerConfig::steal_opportunistic`] for the rules.
    pub fn steal_opportunistic(&self) -> Result<Option<Claim>> {
        let mut inner = self.inner.lock();
        if inner.failed {
            return Err(PipelineError::Aborted);
        }
        if let NextPending::Item(index) = inner.table.find_pending(0) {
            let candidate = inner.table.pending_len(index);
            if self.balancer.steal_opportunistic(
                inner.pending_count,
                inner.pending_bytes,
                candidate,
            ) {
                return Ok(Some(claim_at(&mut inner, index)));
            }
        }
        Ok(None)
    }

    /// Claim any pending slot, for the drain phase after input is exhausted.
    ///
    /// Returns `None` once nothing is pending.
    pub fn steal_remaining(&self) -> Result<Option<Claim>> {
        let mut inner = self.inner.lock();
        if inner.failed {
            return Err(PipelineError::Aborted);
        }
        if !balance::steal_at_end(inner.pending_count) {
            return Ok(None);
        }
        match inner.table.find_pending(0) {
            NextPending::Item(index) => Ok(Some(claim_at(&mut inner, index))),
            NextPending::End | NextPending::None => Ok(None),
        }
    }

    /// Signal end of input by appending the terminal sentinel.
    ///
    /// Waits out any remaining backpressure first; the sentinel is always the
    /// last slot ever enqueued.
    pub fn finish(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        while inner.table.is_full() {
            if inner.failed {
                return Err(PipelineError::Aborted);
            }
            self.space.wait(&mut inner);
        }
        if inner.failed {
            return Err(PipelineError::Aborted);
        }
        inner.table.push(Slot::End);
        self.items.notify_one();
        Ok(())
    }

    /// Mark the queue failed and wake all waiters.
    ///
    /// Idempotent. Called on the first error so the peer thread unblocks with
    /// [`PipelineError::Aborted`] rather than waiting on a signal that will
    /// never come.
    pub fn abort(&self) {
        let mut inner = self.inner.lock();
        inner.failed = true;
        self.space.notify_all();
        self.items.notify_all();
    }

    /// Snapshot the aggregate counters.
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            pending_count: inner.pending_count,
            pending_bytes: inner.pending_bytes,
            peak_count: inner.peak_count,
            emitted_items: inner.emitted_items,
            emitted_bytes: inner.emitted_bytes,
        }
    }

    /// Consume the queue, returning the sink for the final flush.
    pub fn into_sink(self) -> W {
        self.inner.into_inner().sink
    }

    fn append_pending(&self, inner: &mut Inner<W>, payload: Vec<u8>) {
        inner.pending_bytes += payload.len();
        inner.pending_count += 1;
        inner.table.push(Slot::Pending(payload));
        inner.peak_count = inner.peak_count.max(inner.table.len());
        // The new slot is the first pending one; the worker may be waiting.
        if inner.pending_count == 1 {
            self.items.notify_one();
        }
    }

    /// Emit the longest contiguous `Ready` prefix from the head.
    fn flush_ready(&self, inner: &mut Inner<W>) -> Result<()> {
        while let Some(result) = inner.table.pop_ready_front() {
            if let Err(e) = inner.sink.write_all(&result) {
                inner.failed = true;
                self.space.notify_all();
                self.items.notify_all();
                return Err(PipelineError::Sink(e));
            }
            inner.emitted_items += 1;
            inner.emitted_bytes += result.len() as u64;
        }
        Ok(())
    }
}

/// Claim the slot at `index`, assigning a fresh token and updating the
/// pending aggregates.
fn claim_at<W>(inner: &mut Inner<W>, index: usize) -> Claim {
    let token = Token(inner.next_token);
    inner.next_token += 1;
    let payload = inner.table.claim(index, token);
    inner.pending_count -= 1;
    inner.pending_bytes -= payload.len();
    Claim { token, payload }
}

/// Claim the first pending slot.
///
/// # Panics
///
/// Panics if the pending aggregates say a pending slot exists but none does.
fn claim_first<W>(inner: &mut Inner<W>) -> Claim {
    match inner.table.find_pending(0) {
        NextPending::Item(index) => claim_at(inner, index),
        _ => panic!("pending count says a pending slot exists"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::BalancerConfig;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn queue(capacity: usize) -> WorkQueue<Vec<u8>> {
        WorkQueue::new(capacity, BalancerConfig::default(), Vec::new())
    }

    #[test]
    fn test_out_of_order_completion_flushes_in_order() {
        let q = queue(4);
        q.enqueue(b"aa".to_vec()).unwrap();
        q.enqueue(b"bb".to_vec()).unwrap();

        let first = q.claim_next().unwrap().unwrap();
        let second = q.claim_next().unwrap().unwrap();
        assert_eq!(first.payload, b"aa");
        assert_eq!(second.payload, b"bb");

        // The later item completes first; nothing may be emitted yet.
        q.complete(second.token, b"BB".to_vec()).unwrap();
        assert_eq!(q.stats().emitted_items, 0);

        // Completing the head releases both, in arrival order.
        q.complete(first.token, b"AA".to_vec()).unwrap();
        let stats = q.stats();
        assert_eq!(stats.emitted_items, 2);
        assert_eq!(q.into_sink(), b"AABB");
    }

    #[test]
    fn test_enqueue_or_steal_rejects_when_full() {
        let q = queue(2);
        q.enqueue(b"a".to_vec()).unwrap();
        q.enqueue(b"b".to_vec()).unwrap();

        // Full with two pending: the payload bounces back with a claim on
        // the first pending slot.
        match q.enqueue_or_steal(b"c".to_vec()).unwrap() {
            Enqueue::Rejected { payload, claim } => {
                assert_eq!(payload, b"c");
                assert_eq!(claim.payload, b"a");
                q.complete(claim.token, b"A".to_vec()).unwrap();
            }
            Enqueue::Accepted => panic!("expected rejection from a full queue"),
        }

        // The flush freed a slot; the retry is accepted.
        assert!(matches!(q.enqueue_or_steal(b"c".to_vec()).unwrap(), Enqueue::Accepted));
        let stats = q.stats();
        assert_eq!(stats.pending_count, 2);
        assert_eq!(stats.pending_bytes, 2);
    }

    #[test]
    fn test_sentinel_ends_claims() {
        let q = queue(2);
        q.enqueue(b"a".to_vec()).unwrap();
        q.finish().unwrap();

        let claim = q.claim_next().unwrap().unwrap();
        q.complete(claim.token, b"A".to_vec()).unwrap();
        assert!(q.claim_next().unwrap().is_none());
    }

    #[test]
    fn test_steal_remaining_drains_pending() {
        let q = queue(4);
        q.enqueue(b"a".to_vec()).unwrap();
        q.enqueue(b"b".to_vec()).unwrap();

        let mut drained = Vec::new();
        while let Some(claim) = q.steal_remaining().unwrap() {
            drained.push(claim.payload.clone());
            q.complete(claim.token, claim.payload).unwrap();
        }
        assert_eq!(drained, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(q.stats().pending_count, 0);
    }

    #[test]
    fn test_opportunistic_steal_respects_rules() {
        let config = BalancerConfig { low_water_bytes: 1000, min_batch: 5 };
        let q = WorkQueue::new(8, config, Vec::new());

        // A lone pending item is always at least the pending average, so it
        // is left for the worker.
        q.enqueue(b"x".to_vec()).unwrap();
        assert!(q.steal_opportunistic().unwrap().is_none());

        // A large second item drags the average up past the 1-byte head,
        // which is now cheap enough for the driver to take.
        q.enqueue(vec![0u8; 100]).unwrap();
        let claim = q.steal_opportunistic().unwrap().expect("rules now allow a steal");
        assert_eq!(claim.payload, b"x");
    }

    #[test]
    fn test_abort_wakes_blocked_producer() {
        let q = Arc::new(queue(1));
        q.enqueue(b"a".to_vec()).unwrap();

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.enqueue(b"b".to_vec()))
        };
        // Let the producer reach the wait, then fail the run.
        thread::sleep(Duration::from_millis(50));
        q.abort();

        let result = producer.join().unwrap();
        assert!(matches!(result, Err(PipelineError::Aborted)));
    }

    #[test]
    fn test_zero_length_items_are_ordinary() {
        let q = queue(4);
        q.enqueue(Vec::new()).unwrap();
        assert_eq!(q.stats().pending_count, 1);

        // A zero-length payload is data, not a sentinel.
        let claim = q.claim_next().unwrap().unwrap();
        assert!(claim.payload.is_empty());
        q.complete(claim.token, b"!".to_vec()).unwrap();
        assert_eq!(q.into_sink(), b"!");
    }

    #[test]
    fn test_peak_count_tracks_occupancy() {
        let q = queue(3);
        q.enqueue(b"a".to_vec()).unwrap();
        q.enqueue(b"b".to_vec()).unwrap();
        assert_eq!(q.stats().peak_count, 2);

        let claim = q.claim_next().unwrap().unwrap();
        q.complete(claim.token, b"A".to_vec()).unwrap();
        // One slot flushed; the peak stays at the high-water mark.
        assert_eq!(q.stats().peak_count, 2);
    }
}
