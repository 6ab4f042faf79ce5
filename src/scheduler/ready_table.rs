use alloc::vec::Vec;
use spin::Mutex;

use super::config::{L, N, Q_P};
use super::level_queue::LevelQueue;
use super::task::{Pcb, ProcessId, ProcessState};

/// Fallible, caller-visible failures: configuration violations and
/// resource exhaustion that is expected to happen under normal load (an
/// empty PCB pool) surface as `Err` rather than panicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    NoSlot,
    InvalidLevel,
    NoChildren,
    UnknownPid,
    Killed,
}

/// Which staircase a level index names. An explicit tag rather than an
/// address-range pointer comparison, so membership doesn't depend on
/// pointer arithmetic against the staircase's backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaircaseSet {
    Active,
    Expired,
}

/// The global, lock-protected table of every PCB plus the two staircases.
/// Callers hold this behind a single `spin::Mutex` (see
/// `scheduler::READY_TABLE`); level-queue locks nest inside it, never the
/// other way around.
pub struct ReadyTable {
    /// Fixed-size PCB pool. Level queues reference slots by index; a PCB is
    /// never moved or copied once it is allocated here.
    pub procs: Vec<Pcb>,
    nextpid: u64,
    set_a: Vec<Mutex<LevelQueue>>,
    set_b: Vec<Mutex<LevelQueue>>,
    /// `true` when `set_a` is the active staircase. Flipping this bit is the
    /// safe-Rust equivalent of the source's `active`/`expired` pointer swap.
    active_is_a: bool,
}

impl ReadyTable {
    /// Boot-time initialization: all PCBs unused, both staircases
    /// empty, both `level_ticks = Q_L`.
    pub fn new() -> Self {
        let mut procs = Vec::with_capacity(N);
        for _ in 0..N {
            procs.push(Pcb::unused());
        }
        let set_a = (0..L).map(|_| Mutex::new(LevelQueue::new())).collect();
        let set_b = (0..L).map(|_| Mutex::new(LevelQueue::new())).collect();
        ReadyTable { procs, nextpid: 1, set_a, set_b, active_is_a: true }
    }

    pub fn active_queues(&self) -> &[Mutex<LevelQueue>] {
        if self.active_is_a { &self.set_a } else { &self.set_b }
    }

    pub fn expired_queues(&self) -> &[Mutex<LevelQueue>] {
        if self.active_is_a { &self.set_b } else { &self.set_a }
    }

    pub fn queue(&self, set: StaircaseSet, level: usize) -> &Mutex<LevelQueue> {
        match set {
            StaircaseSet::Active => &self.active_queues()[level],
            StaircaseSet::Expired => &self.expired_queues()[level],
        }
    }

    /// Atomically exchanges the active and expired staircase identities.
    pub fn swap_sets(&mut self) {
        self.active_is_a = !self.active_is_a;
    }

    /// Scans the PCB pool for an `unused` slot; on success transitions it to
    /// `embryo`, assigns the next pid and `ticks_left = Q_P`. Does not
    /// enqueue — callers finish initialization and enqueue
    /// atomically with the `embryo -> runnable` transition.
    pub fn allocate(&mut self) -> Result<usize, SchedError> {
        let slot = self
            .procs
            .iter()
            .position(|p| p.state == ProcessState::Unused)
            .ok_or(SchedError::NoSlot)?;

        let pid = ProcessId(self.nextpid);
        self.nextpid += 1;

        let p = &mut self.procs[slot];
        *p = Pcb::unused();
        p.pid = pid;
        p.state = ProcessState::Embryo;
        p.ticks_left = Q_P;
        Ok(slot)
    }

    /// Finds the first level `>= start_active` in the active staircase with
    /// spare budget and room, else the first level `>= fallback_expired` in
    /// the expired staircase with room. Fatal if neither search
    /// succeeds: that indicates the ready structure is over-subscribed,
    /// which should not happen since the sum of `numproc` across every
    /// queue always equals the runnable+running+sleeping count, and that
    /// count never exceeds `N`.
    pub fn find_available_queue(&self, start_active: usize, fallback_expired: usize) -> (StaircaseSet, usize) {
        let active = self.active_queues();
        for k in start_active..L {
            let q = active[k].lock();
            if q.has_ticks() && q.numproc() < N {
                return (StaircaseSet::Active, k);
            }
        }

        let expired = self.expired_queues();
        for k in fallback_expired..L {
            let q = expired[k].lock();
            if q.numproc() < N {
                return (StaircaseSet::Expired, k);
            }
        }

        panic!("find_available_queue: ready structure over-subscribed, no level has room");
    }

    pub fn find_pid(&self, pid: ProcessId) -> Option<usize> {
        self.procs.iter().position(|p| p.pid == pid)
    }

    /// Removes `slot` from whichever level queue (active or expired) it
    /// currently sits in. Fatal if it is in neither.
    pub fn remove_from_levels(&self, slot: usize) {
        for set in [StaircaseSet::Active, StaircaseSet::Expired] {
            for k in 0..L {
                let mut q = self.queue(set, k).lock();
                if q.unqueue(slot, super::level_queue::UnqueueMode::Try).is_some() {
                    return;
                }
            }
        }
        panic!("remove_from_levels: pcb not found in any level queue");
    }
}

impl Default for ReadyTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::level_queue::UnqueueMode;

    #[test]
    fn allocate_assigns_monotonic_pids_and_embryo_state() {
        let mut rt = ReadyTable::new();
        let a = rt.allocate().unwrap();
        let b = rt.allocate().unwrap();
        assert_eq!(rt.procs[a].pid.0 + 1, rt.procs[b].pid.0);
        assert_eq!(rt.procs[a].state, ProcessState::Embryo);
        assert_eq!(rt.procs[a].ticks_left, Q_P);
    }

    #[test]
    fn allocate_fails_when_pool_exhausted() {
        let mut rt = ReadyTable::new();
        for _ in 0..N {
            rt.allocate().unwrap();
        }
        assert_eq!(rt.allocate(), Err(SchedError::NoSlot));
    }

    #[test]
    fn swap_sets_is_its_own_inverse() {
        let mut rt = ReadyTable::new();
        let before_active_is_a = rt.active_is_a;
        rt.swap_sets();
        rt.swap_sets();
        assert_eq!(rt.active_is_a, before_active_is_a);
    }

    #[test]
    fn find_available_queue_prefers_active_from_start_level() {
        let rt = ReadyTable::new();
        let (set, level) = rt.find_available_queue(2, 0);
        assert_eq!(set, StaircaseSet::Active);
        assert_eq!(level, 2);
    }

    #[test]
    fn find_available_queue_falls_back_to_expired_at_home_level() {
        let mut rt = ReadyTable::new();
        // Exhaust every active level's budget.
        for k in 0..L {
            rt.active_queues()[k].lock().level_ticks = 0;
        }
        let (set, level) = rt.find_available_queue(0, 3);
        assert_eq!(set, StaircaseSet::Expired);
        assert_eq!(level, 3);
    }

    #[test]
    #[should_panic(expected = "over-subscribed")]
    fn find_available_queue_is_fatal_when_both_staircases_are_full() {
        let mut rt = ReadyTable::new();
        for k in 0..L {
            let mut q = rt.active_queues()[k].lock();
            for slot in 0..N {
                q.enqueue(slot);
            }
        }
        for k in 0..L {
            let mut q = rt.expired_queues()[k].lock();
            for slot in 0..N {
                q.enqueue(slot);
            }
        }
        rt.find_available_queue(0, 0);
    }

    #[test]
    fn remove_from_levels_finds_pcb_in_either_staircase() {
        let rt = ReadyTable::new();
        rt.queue(StaircaseSet::Expired, 1).lock().enqueue(5);
        rt.remove_from_levels(5);
        assert_eq!(rt.queue(StaircaseSet::Expired, 1).lock().numproc(), 0);
    }

    #[test]
    #[should_panic(expected = "not found")]
    fn remove_from_levels_is_fatal_if_absent() {
        let rt = ReadyTable::new();
        rt.remove_from_levels(42);
    }

    #[test]
    fn try_unqueue_mode_is_exercised_by_remove_from_levels() {
        // sanity: Try mode never panics on miss, used internally above.
        let mut q = LevelQueue::new();
        assert_eq!(q.unqueue(1, UnqueueMode::Try), None);
    }

    use proptest::prelude::*;

    proptest! {
        // Round-trip law: swapping the active/expired identity is its own
        // inverse, for any number of swaps (I1).
        #[test]
        fn swap_sets_n_times_matches_parity(n in 0usize..20) {
            let mut rt = ReadyTable::new();
            let start = rt.active_is_a;
            for _ in 0..n {
                rt.swap_sets();
            }
            prop_assert_eq!(rt.active_is_a, if n % 2 == 0 { start } else { !start });
        }

        // I1: the active and expired staircases are always distinct
        // storage, regardless of how many times they've been swapped.
        #[test]
        fn active_and_expired_queues_never_alias(n in 0usize..10) {
            let mut rt = ReadyTable::new();
            for _ in 0..n {
                rt.swap_sets();
            }
            for k in 0..L {
                let active_ptr = rt.queue(StaircaseSet::Active, k) as *const Mutex<LevelQueue>;
                let expired_ptr = rt.queue(StaircaseSet::Expired, k) as *const Mutex<LevelQueue>;
                prop_assert_ne!(active_ptr, expired_ptr);
            }
        }
    }
}
