//! Module wiring for the RSDL scheduler core. Every data structure and
//! policy lives in a sibling module; this file owns the one genuinely
//! global object (`READY_TABLE`, a single owning root with interior
//! mutability under a single coarse lock), the tick counter the Quantum
//! Accountant and `schedlog` are timestamped against, boot-time wiring,
//! and the trampolines a freshly created process's saved `Context` points
//! its `rip` at.

pub mod accountant;
pub mod config;
pub mod context;
pub mod demotion;
pub mod dispatcher;
pub mod level_queue;
pub mod lifecycle;
pub mod ready_table;
pub mod schedlog;
pub mod task;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use lazy_static::lazy_static;
use spin::Mutex;

use context::Context;
pub use ready_table::{ReadyTable, SchedError, StaircaseSet};
pub use task::{Pcb, ProcessId, ProcessState, TrapFrame, WaitChannel};

lazy_static! {
    /// The global Ready Table. Every other
    /// module in this crate that touches process state takes this lock
    /// first.
    pub static ref READY_TABLE: Mutex<ReadyTable> = Mutex::new(ReadyTable::new());

    /// Per-CPU "this CPU's quantum just ran out" latch, set by
    /// `on_timer_tick` and drained by `maybe_resched`. Sized like
    /// `dispatcher::CPUS` rather than a const-generic array so it can be a
    /// plain `Vec` of a non-`Copy` atomic, matching that module's own
    /// `(0..MAX_CPUS).map(..).collect()` idiom.
    static ref NEED_RESCHED: Vec<AtomicBool> =
        (0..config::MAX_CPUS).map(|_| AtomicBool::new(false)).collect();
}

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Monotonic tick counter. `schedlog`'s trace window and the Accountant's
/// bookkeeping are both timestamped against this.
pub fn ticks_now() -> u64 {
    TICKS.load(Ordering::SeqCst)
}

/// Timer-interrupt hook: credits one tick to whatever `cpu_id`
/// is currently running. If the Accountant reports that the process's own
/// quantum or its level's collective quantum just hit zero, latches
/// `NEED_RESCHED` for this CPU rather than unwinding the interrupted
/// instruction stream right here - preemption only requires reaching "the
/// next entry to the scheduler", and deferring to the next syscall return (see
/// `maybe_resched`, called from `syscalls::dispatch`) avoids needing a
/// second, interrupt-context variant of the context-switch primitive in a
/// kernel whose Non-goals already exclude bounded-latency real-time
/// guarantees.
pub fn on_timer_tick(cpu_id: usize) {
    TICKS.fetch_add(1, Ordering::SeqCst);
    let mut rt = READY_TABLE.lock();
    let cpu = dispatcher::CPUS[cpu_id].lock();
    if accountant::tick(&mut rt, &cpu) {
        NEED_RESCHED[cpu_id].store(true, Ordering::SeqCst);
    }
}

/// Consulted at the next safe return-to-scheduler point. Voluntarily yields
/// exactly once if `on_timer_tick` latched this CPU since the last check;
/// a no-op otherwise.
pub fn maybe_resched(cpu_id: usize) {
    if NEED_RESCHED[cpu_id].swap(false, Ordering::SeqCst) {
        lifecycle::yield_(&READY_TABLE, cpu_id);
    }
}

/// Boot-time wiring.
/// `READY_TABLE`'s `lazy_static` already covers that; this just creates the
/// first process - the interactive shell loop - and enqueues it exactly
/// like any process created later. The boot CPU's own thread never becomes
/// a process itself: after this returns, `_start` falls straight into
/// `dispatcher::run` and stays that CPU's dispatcher loop forever, the same
/// relationship `scheduler()` has to `userinit`'s child in the source RSDL
/// patch.
pub fn init() {
    let mut rt = READY_TABLE.lock();
    let shell_entry = crate::drivers::tty::process_input_loop as *const () as u64;
    lifecycle::create_process(&mut rt, shell_entry, "shell", config::DEFAULT_HOME)
        .expect("scheduler::init: failed to create the initial shell process");
    drop(rt);

    crate::log_info!(
        "RSDL scheduler online: L={} N={} Q_P={} Q_L={}",
        config::L,
        config::N,
        config::Q_P,
        config::Q_L
    );
}

/// Snapshot of every non-`unused` PCB for display purposes (the `ps` shell
/// command). Not part of the scheduling core itself; a thin read-only view
/// over the Ready Table.
pub fn list_tasks() -> Vec<(u64, String, String)> {
    x86_64::instructions::interrupts::without_interrupts(|| {
        let rt = READY_TABLE.lock();
        rt.procs
            .iter()
            .filter(|p| p.state != ProcessState::Unused)
            .map(|p| (p.pid.0, p.name.clone(), format!("{:?}", p.state)))
            .collect()
    })
}

/// The pid of whatever `cpu_id` is currently running, or `ProcessId::NONE`
/// if nothing is (e.g. queried between dispatcher iterations).
pub fn current_pid(cpu_id: usize) -> ProcessId {
    x86_64::instructions::interrupts::without_interrupts(|| {
        match dispatcher::CPUS[cpu_id].lock().current {
            Some(slot) => READY_TABLE.lock().procs[slot].pid,
            None => ProcessId::NONE,
        }
    })
}

/// The pool-slot index `cpu_id` is currently running, if any. Collaborators
/// outside this module (`syscalls::dispatch`) use this to reach fields on
/// the current PCB (the fd table, `cwd`, ...) that are not part of the
/// scheduler's own lifecycle/dispatch surface.
pub fn current_slot(cpu_id: usize) -> Option<usize> {
    dispatcher::CPUS[cpu_id].lock().current
}

/// Entry point every freshly created process's `Context.rip` points at.
/// Runs the one-time `first_return` prologue, then jumps to the real entry
/// point stashed in `r12` by `lifecycle::create_process` - `r12` is
/// callee-saved across the `call`, so it survives untouched.
#[unsafe(naked)]
pub extern "C" fn kernel_entry_trampoline() -> ! {
    core::arch::naked_asm!(
        "call {first_return}",
        "jmp r12",
        first_return = sym lifecycle::first_return,
    );
}

/// Entry point a freshly forked child's `Context.rip` points at.
/// Runs `first_return`, then `iretq`s into the child's copied trap frame.
#[unsafe(naked)]
pub extern "C" fn trap_return_trampoline() -> ! {
    core::arch::naked_asm!(
        "call {first_return}",
        "call {frame_ptr}",
        "mov rdi, rax",
        "jmp {iretq}",
        first_return = sym lifecycle::first_return,
        frame_ptr = sym current_trap_frame_ptr,
        iretq = sym context::iretq_to_trapframe,
    );
}

extern "C" fn current_trap_frame_ptr() -> *const TrapFrame {
    // `first_return` (called just before this, in `trap_return_trampoline`)
    // already re-enabled interrupts, so this lock acquisition needs its own
    // disable/enable bracket same as any other mainline caller (§5).
    x86_64::instructions::interrupts::without_interrupts(|| {
        let cpu_id = dispatcher::current_cpu_id();
        let slot = dispatcher::CPUS[cpu_id]
            .lock()
            .current
            .expect("trap_return_trampoline: resumed without a recorded current process");
        let rt = READY_TABLE.lock();
        &rt.procs[slot].trap_frame as *const TrapFrame
    })
}
