//! The int 0x80 syscall surface, built directly on `scheduler::lifecycle` and the Ready Table -
//! this module owns no scheduling state of its own, only the register
//! marshalling and the fd-table/pipe bookkeeping layered on top.

use alloc::string::String;
use alloc::sync::Arc;
use spin::Mutex;

use crate::fs::fd::{File, FileType};
use crate::fs::pipe::PipeInner;
use crate::scheduler::{self, dispatcher, lifecycle, READY_TABLE};

/// Syscall numbers (passed in RAX from userland).
pub const SYS_EXIT: u64 = 0;
pub const SYS_WRITE: u64 = 1;
pub const SYS_YIELD: u64 = 2;
pub const SYS_GETPID: u64 = 3;
pub const SYS_FORK: u64 = 4;
pub const SYS_EXEC: u64 = 5;
pub const SYS_WAIT: u64 = 6;

pub const SYS_OPEN: u64 = 7;
pub const SYS_CLOSE: u64 = 8;
pub const SYS_READ: u64 = 9;
pub const SYS_DUP: u64 = 10;
pub const SYS_DUP2: u64 = 11;
pub const SYS_PIPE: u64 = 12;

/// Enables `schedlog(n)` for the next `n` ticks: a diagnostic window, not part of the core scheduling
/// algorithm.
pub const SYS_SCHEDLOG: u64 = 13;

pub const SYS_PRIOFORK: u64 = 14;
pub const SYS_KILL: u64 = 15;

const MAX_FDS: usize = 64;

/// Central syscall dispatcher, called from the int 0x80 handler.
/// Arguments come from registers: rax=number, rdi=arg0, rsi=arg1, rdx=arg2.
/// Returns the result in rax.
pub extern "C" fn dispatch(number: u64, arg0: u64, arg1: u64, arg2: u64) -> u64 {
    // int 0x80 is an interrupt gate, so the CPU cleared IF on entry; re-enable
    // it so the timer can still credit ticks while a syscall runs.
    x86_64::instructions::interrupts::enable();
    let cpu_id = dispatcher::current_cpu_id();

    let result = match number {
        SYS_EXIT => {
            lifecycle::exit(&READY_TABLE, cpu_id, arg0);
        }
        SYS_READ => sys_read(cpu_id, arg0 as usize, arg1 as *mut u8, arg2 as usize),
        SYS_WRITE => sys_write_fd(cpu_id, arg0 as usize, arg1 as *const u8, arg2 as usize),
        SYS_YIELD => {
            lifecycle::yield_(&READY_TABLE, cpu_id);
            0
        }
        SYS_GETPID => scheduler::current_pid(cpu_id).0,
        SYS_FORK => lifecycle::fork(&READY_TABLE, cpu_id) as u64,
        SYS_EXEC => sys_exec(arg0 as *const u8, arg1 as usize),
        SYS_WAIT => match lifecycle::wait(&READY_TABLE, cpu_id) {
            Ok((pid, _status)) => pid.0,
            Err(_) => u64::MAX,
        },
        SYS_OPEN => sys_open(cpu_id, arg0 as *const u8, arg1 as usize),
        SYS_CLOSE => sys_close(cpu_id, arg0 as usize),
        SYS_DUP => sys_dup(cpu_id, arg0 as usize),
        SYS_DUP2 => sys_dup2(cpu_id, arg0 as usize, arg1 as usize),
        SYS_PIPE => sys_pipe(cpu_id, arg0 as *mut [u32; 2]),
        SYS_SCHEDLOG => {
            scheduler::schedlog::enable(scheduler::ticks_now(), arg0);
            0
        }
        SYS_PRIOFORK => lifecycle::priofork(&READY_TABLE, cpu_id, arg0 as usize) as u64,
        SYS_KILL => x86_64::instructions::interrupts::without_interrupts(|| {
            let mut rt = READY_TABLE.lock();
            match lifecycle::kill(&mut rt, scheduler::task::ProcessId(arg0)) {
                Ok(()) => 0,
                Err(_) => u64::MAX,
            }
        }),
        _ => {
            crate::log_warn!("syscall: unknown number {}", number);
            u64::MAX
        }
    };

    scheduler::maybe_resched(cpu_id);
    result
}

fn current_fd(cpu_id: usize, fd: usize) -> Option<Arc<Mutex<File>>> {
    let slot = scheduler::current_slot(cpu_id)?;
    x86_64::instructions::interrupts::without_interrupts(|| {
        let rt = READY_TABLE.lock();
        rt.procs[slot].fd_table.get(fd).cloned().flatten()
    })
}

fn pipe_chan(inner: &Arc<Mutex<PipeInner>>) -> usize {
    Arc::as_ptr(inner) as usize
}

fn sys_read(cpu_id: usize, fd: usize, ptr: *mut u8, len: usize) -> u64 {
    if fd >= MAX_FDS || len == 0 || len > 1024 * 1024 {
        return u64::MAX;
    }
    let slice = unsafe { core::slice::from_raw_parts_mut(ptr, len) };

    let file_arc = match current_fd(cpu_id, fd) {
        Some(f) => f,
        None => return u64::MAX,
    };

    loop {
        let mut file = file_arc.lock();
        if !file.readable {
            return u64::MAX;
        }
        let inner_arc = match &file.file_type {
            FileType::Console => {
                slice[0] = b'\n';
                return 1;
            }
            FileType::Regular => return 0,
            FileType::PipeRead(inner_arc) => inner_arc.clone(),
            _ => return u64::MAX,
        };

        let mut inner = inner_arc.lock();
        if !inner.is_empty() {
            let read_bytes = inner.read(slice);
            drop(inner);
            x86_64::instructions::interrupts::without_interrupts(|| {
                lifecycle::wakeup(&mut READY_TABLE.lock(), pipe_chan(&inner_arc));
            });
            return read_bytes as u64;
        }
        if inner.active_writers() == 0 {
            return 0;
        }
        let chan = pipe_chan(&inner_arc);
        // `sleep` only transitions to `Sleeping` once it holds the Ready
        // Table lock, then releases these guards itself - closing the
        // window between our own unlock and the state transition where a
        // racing `wakeup(chan)` could otherwise be missed (§4.6, §5 (i)).
        lifecycle::sleep(&READY_TABLE, cpu_id, chan, move || {
            drop(inner);
            drop(file);
        });
    }
}

fn sys_write_fd(cpu_id: usize, fd: usize, ptr: *const u8, len: usize) -> u64 {
    if fd >= MAX_FDS || len == 0 || len > 1024 * 1024 {
        return u64::MAX;
    }
    let slice = unsafe { core::slice::from_raw_parts(ptr, len) };

    let file_arc = match current_fd(cpu_id, fd) {
        Some(f) => f,
        None => return u64::MAX,
    };

    loop {
        let mut file = file_arc.lock();
        if !file.writable {
            return u64::MAX;
        }
        let inner_arc = match &file.file_type {
            FileType::Console => {
                if let Ok(s) = core::str::from_utf8(slice) {
                    print_no_newline(s);
                }
                return len as u64;
            }
            FileType::Regular => return len as u64,
            FileType::PipeWrite(inner_arc) => inner_arc.clone(),
            _ => return u64::MAX,
        };

        let mut inner = inner_arc.lock();
        if !inner.is_full() {
            let written = inner.write(slice);
            drop(inner);
            x86_64::instructions::interrupts::without_interrupts(|| {
                lifecycle::wakeup(&mut READY_TABLE.lock(), pipe_chan(&inner_arc));
            });
            return written as u64;
        }
        if inner.active_readers() == 0 {
            return u64::MAX;
        }
        let chan = pipe_chan(&inner_arc);
        lifecycle::sleep(&READY_TABLE, cpu_id, chan, move || {
            drop(inner);
            drop(file);
        });
    }
}

/// Spawns a new process running the ELF binary at `path`. Mirrors the shell's
/// own `exec` command rather than implementing a POSIX in-place image
/// replace; the loader always creates a fresh process.
fn sys_exec(ptr: *const u8, len: usize) -> u64 {
    if len == 0 || len > 4096 {
        return u64::MAX;
    }
    let slice = unsafe { core::slice::from_raw_parts(ptr, len) };
    let path = match core::str::from_utf8(slice) {
        Ok(p) => p,
        Err(_) => return u64::MAX,
    };
    match crate::loader::elf::load(path) {
        Ok(pid) => pid,
        Err(e) => {
            crate::log_error!("sys_exec: {} failed: {:?}", path, e);
            u64::MAX
        }
    }
}

fn sys_open(cpu_id: usize, ptr: *const u8, len: usize) -> u64 {
    if len == 0 || len > 4096 {
        return u64::MAX;
    }
    let slice = unsafe { core::slice::from_raw_parts(ptr, len) };
    let path = match core::str::from_utf8(slice) {
        Ok(p) => p,
        Err(_) => return u64::MAX,
    };

    let slot = match scheduler::current_slot(cpu_id) {
        Some(s) => s,
        None => return u64::MAX,
    };
    x86_64::instructions::interrupts::without_interrupts(|| {
        let mut rt = READY_TABLE.lock();
        let fd_table = &mut rt.procs[slot].fd_table;
        match fd_table.iter().position(|f| f.is_none()) {
            Some(fd) => {
                fd_table[fd] = Some(File::new_regular(path, true, true));
                fd as u64
            }
            None => u64::MAX,
        }
    })
}

fn sys_close(cpu_id: usize, fd: usize) -> u64 {
    if fd >= MAX_FDS {
        return u64::MAX;
    }
    let slot = match scheduler::current_slot(cpu_id) {
        Some(s) => s,
        None => return u64::MAX,
    };
    x86_64::instructions::interrupts::without_interrupts(|| {
        READY_TABLE.lock().procs[slot].fd_table[fd] = None;
    });
    0
}

fn sys_dup(cpu_id: usize, old_fd: usize) -> u64 {
    if old_fd >= MAX_FDS {
        return u64::MAX;
    }
    let slot = match scheduler::current_slot(cpu_id) {
        Some(s) => s,
        None => return u64::MAX,
    };
    x86_64::instructions::interrupts::without_interrupts(|| {
        let mut rt = READY_TABLE.lock();
        let fd_table = &mut rt.procs[slot].fd_table;
        let file_arc = match fd_table[old_fd].clone() {
            Some(f) => f,
            None => return u64::MAX,
        };
        match fd_table.iter().position(|f| f.is_none()) {
            Some(new_fd) => {
                fd_table[new_fd] = Some(file_arc);
                new_fd as u64
            }
            None => u64::MAX,
        }
    })
}

fn sys_dup2(cpu_id: usize, old_fd: usize, new_fd: usize) -> u64 {
    if old_fd >= MAX_FDS || new_fd >= MAX_FDS {
        return u64::MAX;
    }
    if old_fd == new_fd {
        return new_fd as u64;
    }
    let slot = match scheduler::current_slot(cpu_id) {
        Some(s) => s,
        None => return u64::MAX,
    };
    x86_64::instructions::interrupts::without_interrupts(|| {
        let mut rt = READY_TABLE.lock();
        let fd_table = &mut rt.procs[slot].fd_table;
        match fd_table[old_fd].clone() {
            Some(file_arc) => {
                fd_table[new_fd] = Some(file_arc);
                new_fd as u64
            }
            None => u64::MAX,
        }
    })
}

fn sys_pipe(cpu_id: usize, fds_ptr: *mut [u32; 2]) -> u64 {
    let slot = match scheduler::current_slot(cpu_id) {
        Some(s) => s,
        None => return u64::MAX,
    };
    let ok = x86_64::instructions::interrupts::without_interrupts(|| {
        let mut rt = READY_TABLE.lock();
        let fd_table = &mut rt.procs[slot].fd_table;

        let mut fd0 = None;
        let mut fd1 = None;
        for i in 0..MAX_FDS {
            if fd_table[i].is_none() {
                if fd0.is_none() {
                    fd0 = Some(i);
                    continue;
                }
                if fd1.is_none() {
                    fd1 = Some(i);
                    break;
                }
            }
        }
        let (fd_read, fd_write) = match (fd0, fd1) {
            (Some(r), Some(w)) => (r, w),
            _ => return None,
        };

        let inner = PipeInner::new();
        inner.lock().add_reader();
        inner.lock().add_writer();

        let read_file = Arc::new(Mutex::new(File {
            file_type: FileType::PipeRead(inner.clone()),
            path: String::from("pipe"),
            offset: 0,
            readable: true,
            writable: false,
        }));
        let write_file = Arc::new(Mutex::new(File {
            file_type: FileType::PipeWrite(inner),
            path: String::from("pipe"),
            offset: 0,
            readable: false,
            writable: true,
        }));

        fd_table[fd_read] = Some(read_file);
        fd_table[fd_write] = Some(write_file);
        Some((fd_read, fd_write))
    });
    let Some((fd_read, fd_write)) = ok else {
        return u64::MAX;
    };

    unsafe {
        (*fds_ptr)[0] = fd_read as u32;
        (*fds_ptr)[1] = fd_write as u32;
    }
    0
}

/// Print without a trailing newline (raw syscall writes don't add one).
fn print_no_newline(s: &str) {
    use core::fmt::Write;
    let _ = crate::vga::WRITER.lock().write_str(s);
    let _ = crate::serial::SERIAL1.lock().write_str(s);
}

// ── Kernel-side wrappers (called directly from kernel code, not via int 0x80) ──

/// Writes a string to the VGA terminal (kernel-side, bypassing the fd table).
pub fn sys_write(msg: &str) {
    crate::println!("{}", msg);
}

/// Cooperatively yields the CPU on behalf of whatever process is running
/// on `cpu_id` - used by drivers that poll from process context (e.g. the
/// keyboard buffer) rather than at a true syscall boundary.
pub fn sys_yield(cpu_id: usize) {
    lifecycle::yield_(&READY_TABLE, cpu_id);
}

/// Terminates the current process with exit status 0.
pub fn sys_exit(cpu_id: usize) -> ! {
    lifecycle::exit(&READY_TABLE, cpu_id, 0);
}

/// Returns the pid of whatever process is running on `cpu_id`.
pub fn sys_getpid(cpu_id: usize) -> u64 {
    scheduler::current_pid(cpu_id).0
}

pub fn init() {
    crate::log_info!("Syscall interface initialized.");
}
