//! Quantum accounting. Reacts to exactly one event: a
//! clock-driven tick credited to the currently running process. Queue-to-queue
//! movement is never performed here — only the Demotion Policy (`demotion.rs`)
//! moves PCBs between queues, and only after the process returns control to
//! the dispatcher.

use super::dispatcher::Cpu;
use super::ready_table::{ReadyTable, StaircaseSet};

/// Decrements the running process's `ticks_left` and its source level's
/// `level_ticks`, both clamped at zero, and reports whether either counter
/// just hit zero — the caller's cue to arrange a return to the dispatcher.
/// Returns `false` if no process is currently recorded on this CPU (e.g.
/// the dispatcher itself is between selections).
pub fn tick(rt: &mut ReadyTable, cpu: &Cpu) -> bool {
    let (Some(slot), Some(level)) = (cpu.current, cpu.source) else {
        return false;
    };

    let proc_exhausted = {
        let p = &mut rt.procs[slot];
        p.ticks_left = p.ticks_left.saturating_sub(1);
        p.ticks_left == 0
    };

    let level_exhausted = {
        let mut q = rt.queue(StaircaseSet::Active, level).lock();
        q.level_ticks = q.level_ticks.saturating_sub(1);
        q.level_ticks == 0
    };

    proc_exhausted || level_exhausted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::task::ProcessState;

    fn running_proc(rt: &mut ReadyTable, level: usize) -> (usize, Cpu) {
        let slot = rt.allocate().unwrap();
        rt.procs[slot].state = ProcessState::Running;
        rt.procs[slot].ticks_left = 2;
        rt.queue(StaircaseSet::Active, level).lock().enqueue(slot);
        let mut cpu = Cpu::new();
        cpu.current = Some(slot);
        cpu.source = Some(level);
        (slot, cpu)
    }

    #[test]
    fn tick_decrements_both_counters_and_clamps_at_zero() {
        let mut rt = ReadyTable::new();
        let (slot, cpu) = running_proc(&mut rt, 0);

        assert!(!tick(&mut rt, &cpu));
        assert_eq!(rt.procs[slot].ticks_left, 1);

        assert!(tick(&mut rt, &cpu));
        assert_eq!(rt.procs[slot].ticks_left, 0);

        // Further ticks must not underflow.
        assert!(tick(&mut rt, &cpu));
        assert_eq!(rt.procs[slot].ticks_left, 0);
    }

    #[test]
    fn tick_reports_exhaustion_when_level_budget_hits_zero() {
        let mut rt = ReadyTable::new();
        let (_slot, cpu) = running_proc(&mut rt, 0);
        rt.queue(StaircaseSet::Active, 0).lock().level_ticks = 1;

        assert!(tick(&mut rt, &cpu));
        assert_eq!(rt.queue(StaircaseSet::Active, 0).lock().level_ticks, 0);
    }

    #[test]
    fn tick_is_a_no_op_when_no_process_is_current() {
        let mut rt = ReadyTable::new();
        let cpu = Cpu::new();
        assert!(!tick(&mut rt, &cpu));
    }
}
