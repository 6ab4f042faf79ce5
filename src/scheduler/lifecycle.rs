//! Process lifecycle operations: the syscall-facing surface
//! built on top of the Ready Table, Dispatcher, and Demotion Policy.
//! Mirrors xv6-style `fork`/`exit`/`wait`/`sleep`/`wakeup`/`kill`/`forkret`,
//! adapted to the fixed-PCB-pool plus index-referenced level-queue data
//! model and this kernel's own kernel-stack/trap-frame/page-table
//! conventions. The initial process is created through the same
//! `create_process` path as any other - there is no separate `userinit`.

use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

use super::config::{L, Q_P};
use super::context::Context;
use super::dispatcher;
use super::ready_table::{ReadyTable, SchedError};
use super::task::{Pcb, ProcessId, ProcessState, WaitChannel};

/// Kernel stack size for every process.
const KERNEL_STACK_SIZE: usize = 4096 * 4;

fn default_fd_table() -> Vec<Option<Arc<Mutex<crate::fs::fd::File>>>> {
    let mut table = Vec::with_capacity(64);
    table.push(Some(crate::fs::fd::File::new_console())); // stdin
    table.push(Some(crate::fs::fd::File::new_console())); // stdout
    table.push(Some(crate::fs::fd::File::new_console())); // stderr
    table.resize_with(64, || None);
    table
}

fn kernel_stack_top(stack: &[u8]) -> u64 {
    (stack.as_ptr() as u64 + KERNEL_STACK_SIZE as u64) & !0xF
}

/// Common PCB construction shared by `create_process` and `fork`: allocates
/// a slot, fills in a kernel stack, address space, fd table and cwd, and
/// leaves the process in `embryo` for the caller to finish.
fn new_pcb(
    rt: &mut ReadyTable,
    name: &str,
    parent: Option<ProcessId>,
    address_space: u64,
    fd_table: Vec<Option<Arc<Mutex<crate::fs::fd::File>>>>,
    cwd: String,
) -> Result<usize, SchedError> {
    let slot = rt.allocate()?;
    let stack = vec![0u8; KERNEL_STACK_SIZE].into_boxed_slice();
    let p = &mut rt.procs[slot];
    p.name = String::from(name);
    p.parent = parent;
    p.address_space = address_space;
    p.fd_table = fd_table;
    p.cwd = cwd;
    p.kernel_stack = stack;
    Ok(slot)
}

/// Creates a brand-new process running `entry` in the current address
/// space. Used for kernel-side tasks (the
/// initial shell) and by the ELF loader for a freshly exec'd program; both
/// start from a clean kernel stack rather than forking an existing one.
pub fn create_process(rt: &mut ReadyTable, entry: u64, name: &str, home_level: usize) -> Result<ProcessId, SchedError> {
    if home_level >= L {
        return Err(SchedError::InvalidLevel);
    }

    let (current_p4, _) = x86_64::registers::control::Cr3::read();
    let slot = new_pcb(
        rt,
        name,
        None,
        current_p4.start_address().as_u64(),
        default_fd_table(),
        String::from("/"),
    )?;

    let stack_top = kernel_stack_top(&rt.procs[slot].kernel_stack);
    rt.procs[slot].context = Context::new(super::kernel_entry_trampoline as *const () as u64, stack_top);
    rt.procs[slot].context.r12 = entry;
    rt.procs[slot].home_level = home_level;
    rt.procs[slot].ticks_left = Q_P;
    rt.procs[slot].state = ProcessState::Runnable;

    let (dest_set, dest_level) = rt.find_available_queue(home_level, home_level);
    rt.queue(dest_set, dest_level).lock().enqueue(slot);

    Ok(rt.procs[slot].pid)
}

/// Duplicates the calling process into a new child (the `fork` syscall).
/// Returns the child pid to the parent; the child itself observes a return value of `0` the
/// first time its trap frame resumes at user level (`trap_frame.rax = 0`,
/// set below).
pub fn fork(rt_lock: &Mutex<ReadyTable>, cpu_id: usize) -> i64 {
    fork_at(rt_lock, cpu_id, None)
}

/// Like `fork`, but the child starts at `home_level` instead of inheriting
/// the parent's (the `priofork` syscall). Returns `-1` without forking if
/// `home_level` is out of range, so a bad argument never costs a PCB slot.
pub fn priofork(rt_lock: &Mutex<ReadyTable>, cpu_id: usize, home_level: usize) -> i64 {
    if home_level >= L {
        return -1;
    }
    fork_at(rt_lock, cpu_id, Some(home_level))
}

fn fork_at(rt_lock: &Mutex<ReadyTable>, cpu_id: usize, home_level_override: Option<usize>) -> i64 {
    // Ready Table lock must only ever be held with interrupts off (§5), so
    // the timer handler's own unconditional `READY_TABLE.lock()` can never
    // spin against this CPU.
    x86_64::instructions::interrupts::without_interrupts(|| {
        let mut rt = rt_lock.lock();
        let parent_slot = match dispatcher_current(cpu_id) {
            Some(s) => s,
            None => return -1,
        };

        let home_level = home_level_override.unwrap_or(rt.procs[parent_slot].home_level);
        let parent_pid = rt.procs[parent_slot].pid;
        let parent_name = rt.procs[parent_slot].name.clone();
        let parent_fd_table = rt.procs[parent_slot].fd_table.clone();
        let parent_cwd = rt.procs[parent_slot].cwd.clone();
        let parent_trap_frame = rt.procs[parent_slot].trap_frame;

        let child_p4 = match crate::memory::addrspace::new_kernel_space() {
            Some(addr) => addr,
            None => return -1,
        };

        let slot = match new_pcb(&mut rt, &format!("{}_child", parent_name), Some(parent_pid), child_p4, parent_fd_table, parent_cwd) {
            Ok(s) => s,
            Err(_) => return -1,
        };

        {
            let p = &mut rt.procs[slot];
            p.trap_frame = parent_trap_frame;
            p.trap_frame.rax = 0; // fork() returns 0 in the child
            let stack_top = kernel_stack_top(&p.kernel_stack);
            p.context = Context::new(super::trap_return_trampoline as *const () as u64, stack_top);
            p.home_level = home_level;
            p.ticks_left = Q_P;
            p.state = ProcessState::Runnable;
        }
        rt.procs[parent_slot].children.push(rt.procs[slot].pid);

        let child_pid = rt.procs[slot].pid;
        let (dest_set, dest_level) = rt.find_available_queue(home_level, home_level);
        rt.queue(dest_set, dest_level).lock().enqueue(slot);

        child_pid.0 as i64
    })
}

/// Puts the calling process to sleep on `chan` (the `sleep(chan, user_lock)`
/// syscall of §4.6): acquires the Ready Table lock, transitions to
/// `sleeping`, records `chan`, *then* releases the caller's own lock via
/// `release_user_lock` - only once the state transition that makes the
/// process visible to a racing `wakeup` has already happened - and finally
/// yields to the dispatcher. This ordering is what closes the lost-wakeup
/// window `§5` guarantee (i) promises: a `wakeup(chan)` that runs on another
/// CPU between the caller's condition check and this call can only ever
/// observe the process as `sleeping` already on `chan`, never "about to
/// sleep" with its own lock already dropped. Pass `|| {}` when there is no
/// separate lock to release (the Ready Table lock itself always counts as
/// already held, never as the `user_lock`).
///
/// The process keeps its level-queue position across the sleep - unlike
/// `yield_`, it is never unqueued.
pub fn sleep(rt_lock: &Mutex<ReadyTable>, cpu_id: usize, chan: WaitChannel, release_user_lock: impl FnOnce()) {
    x86_64::instructions::interrupts::disable();
    let mut rt = rt_lock.lock();
    let Some(slot) = dispatcher_current(cpu_id) else {
        release_user_lock();
        x86_64::instructions::interrupts::enable();
        return;
    };
    rt.procs[slot].chan = Some(chan);
    rt.procs[slot].state = ProcessState::Sleeping;
    release_user_lock();
    let proc_ctx = &mut rt.procs[slot].context as *mut Context;

    // Hand the lock off across the switch; we reclaim it the instant we
    // resume, only to immediately release it again - nothing left to do
    // with the table once we're back on our own feet.
    core::mem::forget(rt);
    unsafe {
        yield_to_dispatcher(cpu_id, proc_ctx);
        rt_lock.force_unlock();
    }
    x86_64::instructions::interrupts::enable();
}

/// Wakes every process sleeping on `chan`: back to
/// `runnable`, still at its current level-queue position.
pub fn wakeup(rt: &mut ReadyTable, chan: WaitChannel) {
    for slot in 0..rt.procs.len() {
        let p = &mut rt.procs[slot];
        if p.state == ProcessState::Sleeping && p.chan == Some(chan) {
            p.state = ProcessState::Runnable;
            p.chan = None;
        }
    }
}

/// Marks `pid` for termination: sets the killed flag, wakes it on its own
/// wait-channel (in case it is blocked in its own `wait()`), and if it is
/// currently sleeping, wakes it so it observes the flag promptly.
/// Actual teardown happens the next time that process reaches `exit`.
pub fn kill(rt: &mut ReadyTable, pid: ProcessId) -> Result<(), SchedError> {
    let slot = rt.find_pid(pid).ok_or(SchedError::UnknownPid)?;
    rt.procs[slot].killed = true;
    wakeup(rt, wait_channel_for(pid));
    if rt.procs[slot].state == ProcessState::Sleeping {
        rt.procs[slot].state = ProcessState::Runnable;
    }
    Ok(())
}

/// Terminates the calling process: frees its address
/// space and file descriptors, reparents its children to init (pid 1,
/// waking it if it is already blocked in `wait`), becomes a zombie, and
/// never returns - the dispatcher reaps control via the usual context
/// switch back into the scheduler loop.
pub fn exit(rt_lock: &Mutex<ReadyTable>, cpu_id: usize, exit_status: u64) -> ! {
    // Ready Table lock must only ever be held with interrupts off (§5).
    x86_64::instructions::interrupts::disable();
    let mut rt = rt_lock.lock();
    let slot = dispatcher_current(cpu_id).expect("exit called without a current process");

    for fd in rt.procs[slot].fd_table.iter_mut() {
        *fd = None;
    }
    for &(vaddr, size) in &rt.procs[slot].user_allocations {
        crate::memory::addrspace::free_user_space(x86_64::VirtAddr::new(vaddr), size);
    }
    rt.procs[slot].user_allocations.clear();

    let children: Vec<ProcessId> = rt.procs[slot].children.clone();
    for child_pid in children {
        if let Some(child_slot) = rt.find_pid(child_pid) {
            rt.procs[child_slot].parent = Some(ProcessId(1));
            if rt.procs[child_slot].state == ProcessState::Zombie {
                wakeup(&mut rt, wait_channel_for(ProcessId(1)));
            }
        }
    }

    if let Some(parent) = rt.procs[slot].parent {
        wakeup(&mut rt, wait_channel_for(parent));
    }

    rt.remove_from_levels(slot);
    rt.procs[slot].exit_status = exit_status;
    rt.procs[slot].state = ProcessState::Zombie;

    // This process never resumes, so it never releases this lock itself -
    // hand it off exactly like a live process would; the dispatcher
    // reclaims it on the other side of the switch either way.
    core::mem::forget(rt);
    die_to_dispatcher(cpu_id);
}

/// Blocks until a child exits, then reaps it. Returns the
/// reaped pid and its exit status, or an error if the caller has no
/// children or has been killed while waiting.
pub fn wait(rt_lock: &Mutex<ReadyTable>, cpu_id: usize) -> Result<(ProcessId, u64), SchedError> {
    loop {
        // Ready Table lock must only ever be held with interrupts off (§5).
        let outcome = x86_64::instructions::interrupts::without_interrupts(|| {
            let mut rt = rt_lock.lock();
            let slot = dispatcher_current(cpu_id).ok_or(SchedError::UnknownPid)?;
            if rt.procs[slot].killed {
                return Err(SchedError::Killed);
            }
            let pid = rt.procs[slot].pid;
            let children = rt.procs[slot].children.clone();
            if children.is_empty() {
                return Err(SchedError::NoChildren);
            }

            for &child_pid in &children {
                if let Some(child_slot) = rt.find_pid(child_pid) {
                    if rt.procs[child_slot].state == ProcessState::Zombie {
                        let status = rt.procs[child_slot].exit_status;
                        rt.procs[child_slot] = Pcb::unused();
                        rt.procs[slot].children.retain(|&c| c != child_pid);
                        return Ok(Some((child_pid, status)));
                    }
                }
            }
            let _ = pid;
            Ok(None)
        });

        if let Some(reaped) = outcome? {
            return Ok(reaped);
        }
        sleep(rt_lock, cpu_id, wait_channel_for(current_pid(rt_lock, cpu_id)), || {});
    }
}

/// Voluntarily gives up the remainder of the current quantum: stays `runnable`, keeps its level-queue position, lets
/// `on_return` (Case B, "budget remains") re-enqueue it at the tail of the
/// same level.
pub fn yield_(rt_lock: &Mutex<ReadyTable>, cpu_id: usize) {
    // Ready Table lock must only ever be held with interrupts off (§5).
    x86_64::instructions::interrupts::disable();
    let mut rt = rt_lock.lock();
    let Some(slot) = dispatcher_current(cpu_id) else {
        x86_64::instructions::interrupts::enable();
        return;
    };
    rt.procs[slot].state = ProcessState::Runnable;
    let proc_ctx = &mut rt.procs[slot].context as *mut Context;

    core::mem::forget(rt);
    unsafe {
        yield_to_dispatcher(cpu_id, proc_ctx);
        rt_lock.force_unlock();
    }
    x86_64::instructions::interrupts::enable();
}

/// Saves the caller's own context into `proc_ctx` and hands control to this
/// CPU's dispatcher loop, returning only once this process is dispatched
/// again - the process side of the `swtch(&p->context, &cpu->scheduler)`
/// handoff.
///
/// # Safety
/// The caller must currently hold (or have been handed, via a forgotten
/// guard) the Ready Table lock, and `proc_ctx` must point at its own slot's
/// `Context`.
unsafe fn yield_to_dispatcher(cpu_id: usize, proc_ctx: *mut Context) {
    let scheduler_ctx = dispatcher::scheduler_context_ptr(cpu_id);
    unsafe {
        super::context::switch_context(proc_ctx, scheduler_ctx);
    }
}

/// One-way hand-off for a process that will never be resumed (`exit`):
/// no context needs saving, so this never returns.
fn die_to_dispatcher(cpu_id: usize) -> ! {
    let scheduler_ctx = dispatcher::scheduler_context_ptr(cpu_id);
    unsafe {
        super::context::restore_context(scheduler_ctx);
    }
    unreachable!("a zombie is never rescheduled");
}

fn dispatcher_current(cpu_id: usize) -> Option<usize> {
    dispatcher::CPUS[cpu_id].lock().current
}

fn current_pid(rt_lock: &Mutex<ReadyTable>, cpu_id: usize) -> ProcessId {
    x86_64::instructions::interrupts::without_interrupts(|| {
        let rt = rt_lock.lock();
        let slot = dispatcher_current(cpu_id).expect("current_pid called with no running process");
        rt.procs[slot].pid
    })
}

/// Synthesizes a stable wait-channel token from a pid, used by `wait`/`exit`
/// for the parent/child rendezvous.
fn wait_channel_for(pid: ProcessId) -> WaitChannel {
    pid.0 as usize
}

static FS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Runs once per process, the first time it resumes through either
/// scheduler entry trampoline. The dispatcher hands off the Ready Table
/// lock (forgotten, not dropped) across that very first switch, so the
/// first thing every process does on its own first breath is release it -
/// mirroring xv6's `forkret`, "still holding p->lock from scheduler".
pub extern "C" fn first_return() {
    unsafe {
        super::READY_TABLE.force_unlock();
    }
    // The dispatcher disabled interrupts before handing off this lock (§5);
    // re-enable now that it's released, same as `sleep`/`yield_` do on their
    // own resume. `trap_return_trampoline`'s later `iretq` restores the
    // child's own saved RFLAGS anyway, so this is a no-op on that path and
    // the only one that matters for `kernel_entry_trampoline`.
    x86_64::instructions::interrupts::enable();

    if FS_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        crate::fs::init();
    }
}
