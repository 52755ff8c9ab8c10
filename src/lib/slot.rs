//! Slot table for the ordered job queue.
//!
//! Each slot records one item's journey through the pipeline. Slots are kept
//! in input arrival order and are only ever compacted from the front (when a
//! contiguous `Ready` prefix is emitted), never reordered. The table is a
//! pure data structure: all mutation happens while the caller holds the
//! queue's lock.
//!
//! Because compaction shifts positions, an in-flight transformation cannot
//! remember "my slot is at index 3". Claiming a slot assigns it a [`Token`],
//! a monotonic identity that is never reused and stays valid across
//! compaction; completion looks the token up with a linear scan from the
//! head. In-flight counts are small (bounded by the capacity and, in
//! practice, by two concurrent transformers), so the scan is cheap.

use std::collections::VecDeque;

/// Identity token for an in-flight slot.
///
/// Assigned at the `Pending` → `InProgress` transition, monotonically
/// increasing, never reused. Unique among all slots that are in flight at the
/// same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token(pub(crate) u64);

/// One slot's stage in its lifecycle, carrying the buffer it owns.
#[derive(Debug)]
pub(crate) enum Slot {
    /// Waiting for a transformer; owns the raw item.
    Pending(Vec<u8>),
    /// Claimed by a transformer; the payload moved out with the claim.
    InProgress(Token),
    /// Transformed; owns the result awaiting ordered emission.
    Ready(Vec<u8>),
    /// Terminal sentinel. Enqueued exactly once, always last.
    End,
}

/// Result of scanning for the next claimable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NextPending {
    /// Index of the first `Pending` slot at or after the start index.
    Item(usize),
    /// The terminal sentinel was reached before any pending item.
    End,
    /// No pending slot in the live range.
    None,
}

/// Fixed-capacity table of slots in input arrival order.
#[derive(Debug)]
pub(crate) struct SlotTable {
    slots: VecDeque<Slot>,
    capacity: usize,
}

impl SlotTable {
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "slot table capacity must be at least 1");
        Self { slots: VecDeque::with_capacity(capacity), capacity }
    }

    /// Number of occupied (non-flushed) slots.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    /// Append a slot at the tail.
    ///
    /// Callers must have checked `is_full()` under the queue lock.
    pub(crate) fn push(&mut self, slot: Slot) {
        debug_assert!(!self.is_full(), "push into a full slot table");
        self.slots.push_back(slot);
    }

    /// Find the first `Pending` slot at or after `start`, stopping early if
    /// the sentinel is reached first.
    ///
    /// The sentinel is always last, so a real pending item is always found
    /// before it when one exists.
    pub(crate) fn find_pending(&self, start: usize) -> NextPending {
        for (offset, slot) in self.slots.iter().skip(start).enumerate() {
            match slot {
                Slot::Pending(_) => return NextPending::Item(start + offset),
                Slot::End => return NextPending::End,
                Slot::InProgress(_) | Slot::Ready(_) => {}
            }
        }
        NextPending::None
    }

    /// Byte length of the pending payload at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the slot at `index` is not `Pending`.
    pub(crate) fn pending_len(&self, index: usize) -> usize {
        match &self.slots[index] {
            Slot::Pending(payload) => payload.len(),
            other => panic!("pending_len on a non-pending slot: {other:?}"),
        }
    }

    /// Transition the slot at `index` from `Pending` to `InProgress`,
    /// returning the payload it owned.
    ///
    /// # Panics
    ///
    /// Panics if the slot at `index` is not `Pending`.
    pub(crate) fn claim(&mut self, index: usize, token: Token) -> Vec<u8> {
        match std::mem::replace(&mut self.slots[index], Slot::InProgress(token)) {
            Slot::Pending(payload) => payload,
            other => panic!("claimed a non-pending slot: {other:?}"),
        }
    }

    /// Locate an in-flight slot by its token, scanning from the head.
    ///
    /// Results usually complete near-in-order, so the scan is short.
    pub(crate) fn find_claimed(&self, token: Token) -> Option<usize> {
        self.slots.iter().position(|slot| matches!(slot, Slot::InProgress(t) if *t == token))
    }

    /// Transition the slot at `index` from `InProgress` to `Ready`, storing
    /// the transform result.
    pub(crate) fn store_result(&mut self, index: usize, result: Vec<u8>) {
        debug_assert!(
            matches!(self.slots[index], Slot::InProgress(_)),
            "storing a result into a slot that was never claimed"
        );
        self.slots[index] = Slot::Ready(result);
    }

    /// Pop the head slot if it is `Ready`, returning its result.
    ///
    /// This is the compaction step of the flush loop: repeated calls emit the
    /// longest contiguous `Ready` prefix and stop at the first slot that is
    /// still `Pending` or `InProgress`, preserving arrival order.
    pub(crate) fn pop_ready_front(&mut self) -> Option<Vec<u8>> {
        if matches!(self.slots.front(), Some(Slot::Ready(_))) {
            match self.slots.pop_front() {
                Some(Slot::Ready(result)) => return Some(result),
                _ => unreachable!(),
            }
        }
        None
    }
}
