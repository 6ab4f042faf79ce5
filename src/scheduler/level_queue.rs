use alloc::vec::Vec;

use super::config::{N, Q_L};

/// Result of an `unqueue` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnqueueMode {
    /// Miss is a fatal invariant violation.
    Strict,
    /// Miss returns `None` instead of panicking.
    Try,
}

/// A bounded FIFO of PCB pool-slot indices for a single priority level.
///
/// Invariants: `0 <= numproc <= N`; elements in `[0, numproc)` are
/// distinct; mid-queue removal preserves the relative order of survivors.
pub struct LevelQueue {
    elements: Vec<usize>,
    /// Ticks this level may still consume while in the active staircase.
    /// Always equal to `Q_L` while this queue sits in the expired staircase.
    pub level_ticks: u32,
}

impl LevelQueue {
    pub fn new() -> Self {
        LevelQueue {
            elements: Vec::with_capacity(N),
            level_ticks: Q_L,
        }
    }

    pub fn numproc(&self) -> usize {
        self.elements.len()
    }

    pub fn is_full(&self) -> bool {
        self.elements.len() >= N
    }

    pub fn has_ticks(&self) -> bool {
        self.level_ticks > 0
    }

    /// Appends `slot` at the tail. Fatal if the queue is already full.
    pub fn enqueue(&mut self, slot: usize) {
        if self.elements.len() >= N {
            panic!("enqueue in full level queue");
        }
        self.elements.push(slot);
    }

    /// Removes `slot` wherever it sits, shifting survivors toward the head
    /// so insertion order is preserved. Returns the pre-removal index.
    pub fn unqueue(&mut self, slot: usize, mode: UnqueueMode) -> Option<usize> {
        match self.elements.iter().position(|&s| s == slot) {
            Some(idx) => {
                self.elements.remove(idx);
                Some(idx)
            }
            None => match mode {
                UnqueueMode::Strict => panic!("unqueue of slot not belonging to this level"),
                UnqueueMode::Try => None,
            },
        }
    }

    pub fn peek_head(&self) -> Option<usize> {
        self.elements.first().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.elements.iter().copied()
    }

    /// Drains every element in FIFO order, resetting the queue to empty.
    /// Used by Case A mass-demotion and by active/expired rotation.
    pub fn drain_all(&mut self) -> Vec<usize> {
        core::mem::take(&mut self.elements)
    }

    pub fn refresh_ticks(&mut self) {
        self.level_ticks = Q_L;
    }
}

impl Default for LevelQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_then_strict_unqueue_is_a_no_op_on_state() {
        let mut q = LevelQueue::new();
        q.enqueue(3);
        q.enqueue(7);
        let before = q.elements.clone();
        let before_numproc = q.numproc();
        q.enqueue(9);
        q.unqueue(9, UnqueueMode::Strict);
        assert_eq!(q.elements, before);
        assert_eq!(q.numproc(), before_numproc);
    }

    #[test]
    fn unqueue_preserves_order_of_survivors() {
        let mut q = LevelQueue::new();
        for s in [10, 20, 30, 40] {
            q.enqueue(s);
        }
        q.unqueue(20, UnqueueMode::Strict);
        assert_eq!(q.iter().collect::<Vec<_>>(), alloc::vec![10, 30, 40]);
    }

    #[test]
    fn try_unqueue_of_absent_slot_returns_none() {
        let mut q = LevelQueue::new();
        q.enqueue(1);
        assert_eq!(q.unqueue(99, UnqueueMode::Try), None);
    }

    #[test]
    #[should_panic(expected = "not belonging")]
    fn strict_unqueue_of_absent_slot_is_fatal() {
        let mut q = LevelQueue::new();
        q.enqueue(1);
        q.unqueue(99, UnqueueMode::Strict);
    }

    #[test]
    #[should_panic(expected = "full")]
    fn enqueue_beyond_capacity_is_fatal() {
        let mut q = LevelQueue::new();
        for i in 0..N {
            q.enqueue(i);
        }
        q.enqueue(N);
    }

    #[test]
    fn peek_head_returns_fifo_front() {
        let mut q = LevelQueue::new();
        assert_eq!(q.peek_head(), None);
        q.enqueue(5);
        q.enqueue(6);
        assert_eq!(q.peek_head(), Some(5));
    }

    #[test]
    fn drain_all_empties_queue_in_order() {
        let mut q = LevelQueue::new();
        for s in [1, 2, 3] {
            q.enqueue(s);
        }
        let drained = q.drain_all();
        assert_eq!(drained, alloc::vec![1, 2, 3]);
        assert_eq!(q.numproc(), 0);
    }

    use proptest::prelude::*;

    fn distinct_slots(max_len: usize) -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(0..10_000usize, 1..=max_len).prop_filter("distinct slots", |v| {
            let mut sorted = v.clone();
            sorted.sort_unstable();
            sorted.dedup();
            sorted.len() == v.len()
        })
    }

    proptest! {
        // Invariant (2)/(3) of the Level Queue: enqueue/unqueue on an
        // arbitrary distinct-slot sequence preserves the relative order of
        // every survivor and shrinks numproc by exactly one.
        #[test]
        fn unqueue_of_any_member_preserves_survivor_order(
            slots in distinct_slots(N),
            pick in 0usize..N,
        ) {
            let idx = pick % slots.len();
            let removed = slots[idx];

            let mut q = LevelQueue::new();
            for &s in &slots {
                q.enqueue(s);
            }
            q.unqueue(removed, UnqueueMode::Strict);

            let expected: Vec<usize> = slots.iter().copied().filter(|&s| s != removed).collect();
            prop_assert_eq!(q.iter().collect::<Vec<_>>(), expected);
            prop_assert_eq!(q.numproc(), slots.len() - 1);
        }

        // Round-trip law: enqueuing a slot and immediately unqueueing it
        // again is a no-op on every other element's position.
        #[test]
        fn enqueue_then_unqueue_round_trip_is_a_no_op(
            slots in distinct_slots(N - 1),
            extra in 10_000usize..20_000usize,
        ) {
            let mut q = LevelQueue::new();
            for &s in &slots {
                q.enqueue(s);
            }
            let before = q.iter().collect::<Vec<_>>();

            q.enqueue(extra);
            q.unqueue(extra, UnqueueMode::Strict);

            prop_assert_eq!(q.iter().collect::<Vec<_>>(), before);
        }
    }
}
