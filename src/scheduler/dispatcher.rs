//! Per-CPU dispatcher loop. Selects the highest-priority
//! runnable process, performs the voluntary context switch, and on return
//! applies the Quantum Accountant's verdict via the Demotion Policy.

use lazy_static::lazy_static;
use spin::Mutex;

use super::config::{L, MAX_CPUS};
use super::context::{self, Context};
use super::demotion;
use super::ready_table::ReadyTable;
use super::schedlog;
use super::task::ProcessState;

/// Per-CPU scheduling descriptor. `scheduler_context` is the resume point
/// the running process hands control back to via `switch_context`/
/// `restore_context` when it yields, sleeps, or exits — the same
/// two-context handoff (`swtch(&cpu->scheduler, p->context)`) classic
/// xv6-style schedulers use, kept in place of a simpler direct
/// task-to-task handoff so the Ready Table lock acquired before a context
/// switch is always released by whichever side resumes, and re-acquired
/// before switching back, never simply dropped and independently relocked
/// by each side.
pub struct Cpu {
    pub scheduler_context: Context,
    pub current: Option<usize>,
    /// Source *active-staircase* level the current process was dispatched
    /// from; demotion is only ever triggered from there.
    pub source: Option<usize>,
}

impl Cpu {
    pub const fn new() -> Self {
        Cpu { scheduler_context: Context::empty(), current: None, source: None }
    }
}

lazy_static! {
    pub static ref CPUS: alloc::vec::Vec<Mutex<Cpu>> =
        (0..MAX_CPUS).map(|_| Mutex::new(Cpu::new())).collect();
}

/// Disables interrupts around the per-CPU "who am I" query. Real
/// SMP bring-up (reading a LAPIC id and mapping it to a `Cpu` slot) is out
/// of scope (Non-goal); every dispatcher in this kernel runs as logical
/// CPU 0 until application-processor bring-up lands.
pub fn current_cpu_id() -> usize {
    x86_64::instructions::interrupts::without_interrupts(|| 0)
}

/// Scans active levels in index order, skipping exhausted ones; within a
/// level, head-of-FIFO first runnable PCB with budget remaining wins.
/// Returns the winning slot and its source level.
fn select(rt: &ReadyTable) -> Option<(usize, usize)> {
    let active = rt.active_queues();
    for level in 0..L {
        let q = active[level].lock();
        if !q.has_ticks() {
            continue;
        }
        for slot in q.iter() {
            let p = &rt.procs[slot];
            if p.state == ProcessState::Runnable && p.ticks_left > 0 {
                return Some((slot, level));
            }
        }
    }
    None
}

/// One per-CPU dispatcher loop; never returns.
pub fn run(rt_lock: &Mutex<ReadyTable>, cpu_id: usize) -> ! {
    loop {
        run_once(rt_lock, cpu_id);
    }
}

/// A single dispatcher iteration. Split out from `run` so it can be driven
/// directly; `run` is just `loop { run_once(..) }`.
pub fn run_once(rt_lock: &Mutex<ReadyTable>, cpu_id: usize) {
    // Interrupts are briefly enabled here (responsiveness for e.g. a pending
    // keyboard interrupt between iterations) then disabled again before the
    // Ready Table lock is taken — per §5, "interrupts are disabled while
    // holding the Ready Table lock" is an invariant the timer handler
    // depends on (`on_timer_tick` unconditionally takes this same lock); it
    // must hold for every acquisition, not just the context-switch window.
    x86_64::instructions::interrupts::enable();
    x86_64::instructions::interrupts::disable();
    let mut rt = rt_lock.lock();

    let Some((slot, level)) = select(&rt) else {
        demotion::rotate(&mut rt);
        return;
    };

    rt.procs[slot].state = ProcessState::Running;
    {
        let mut cpu = CPUS[cpu_id].lock();
        cpu.current = Some(slot);
        cpu.source = Some(level);
    }

    schedlog::maybe_log(&rt, super::ticks_now());

    let address_space = rt.procs[slot].address_space;
    let proc_ctx_ptr = &mut rt.procs[slot].context as *mut Context;
    let scheduler_ctx_ptr = {
        let mut cpu = CPUS[cpu_id].lock();
        &mut cpu.scheduler_context as *mut Context
    };

    // Hand the Ready Table lock off to the process about to run: forget
    // this guard instead of dropping it, so the mutex stays locked across
    // the switch. Interrupts are already disabled (above) and `switch_context`
    // never touches RFLAGS, so the resumed side comes back with IF=0 too -
    // it must explicitly re-enable once it has released (or hand back) this
    // same lock. The process releases it itself once dispatched (at
    // `first_return`, or right after resuming inside `sleep`/`yield_`),
    // and re-acquires and forgets it the same way before switching back
    // here — mirroring the `mem::forget(p.lock())` hand-off classic
    // xv6-style schedulers use to carry a lock across `swtch`.
    core::mem::forget(rt);

    crate::memory::paging::switch_user_space(address_space);
    unsafe {
        context::switch_context(scheduler_ctx_ptr, proc_ctx_ptr);
    }

    // Resumed here once the process has yielded, slept, or exited, having
    // already re-locked-and-forgotten the table itself before switching
    // back. Reclaim it via a raw pointer rather than `lock()`, which would
    // spin forever against a lock we already (logically) hold.
    let rt: &mut ReadyTable = unsafe { &mut *rt_lock.as_mut_ptr() };
    let source_level = CPUS[cpu_id]
        .lock()
        .source
        .expect("dispatcher resumed without a recorded source level");
    demotion::on_return(rt, slot, source_level);

    let mut cpu = CPUS[cpu_id].lock();
    cpu.current = None;
    cpu.source = None;
    drop(cpu);
    unsafe {
        rt_lock.force_unlock();
    }
}

/// Used by `lifecycle` to hand control back to this CPU's dispatcher loop.
pub fn scheduler_context_ptr(cpu_id: usize) -> *mut Context {
    let mut cpu = CPUS[cpu_id].lock();
    &mut cpu.scheduler_context as *mut Context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::config::Q_P;
    use crate::scheduler::ready_table::StaircaseSet;

    fn runnable_at(rt: &mut ReadyTable, level: usize) -> usize {
        let slot = rt.allocate().unwrap();
        rt.procs[slot].state = ProcessState::Runnable;
        rt.procs[slot].ticks_left = Q_P;
        rt.queue(StaircaseSet::Active, level).lock().enqueue(slot);
        slot
    }

    #[test]
    fn select_prefers_lowest_index_level() {
        let mut rt = ReadyTable::new();
        let low = runnable_at(&mut rt, 2);
        let high = runnable_at(&mut rt, 0);

        let (slot, level) = select(&rt).expect("a runnable candidate exists");
        assert_eq!((slot, level), (high, 0));
        assert_ne!(slot, low);
    }

    #[test]
    fn select_skips_levels_with_no_budget_left() {
        let mut rt = ReadyTable::new();
        rt.queue(StaircaseSet::Active, 0).lock().level_ticks = 0;
        let candidate = runnable_at(&mut rt, 1);

        assert_eq!(select(&rt), Some((candidate, 1)));
    }

    #[test]
    fn select_returns_none_when_nothing_is_runnable() {
        let rt = ReadyTable::new();
        assert_eq!(select(&rt), None);
    }
}
