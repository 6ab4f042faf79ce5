use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use super::context::Context;

/// Unique process identifier. `ProcessId(0)` is reserved for "none"/init's
/// absent parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u64);

impl ProcessId {
    pub const NONE: ProcessId = ProcessId(0);
}

/// A wait channel is any stable value the kernel treats as an opaque
/// rendezvous token (a pointer cast to `usize`, or a synthetic id for the
/// parent/child rendezvous inside `wait()`).
pub type WaitChannel = usize;

/// Process state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Unused,
    Embryo,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

/// Saved Ring-3 register state, restored by the trap-return path on resume.
/// Owned directly by the PCB rather than read off a fixed offset into the
/// process's kernel stack, since every mutable field on a PCB already sits
/// behind the Ready Table lock - storing the trap frame as a plain struct
/// field keeps `fork`'s child setup a simple struct copy.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl TrapFrame {
    pub const fn empty() -> Self {
        TrapFrame {
            rax: 0, rbx: 0, rcx: 0, rdx: 0, rsi: 0, rdi: 0, rbp: 0,
            r8: 0, r9: 0, r10: 0, r11: 0, r12: 0, r13: 0, r14: 0, r15: 0,
            rip: 0, cs: 0, rflags: 0, rsp: 0, ss: 0,
        }
    }
}

/// Process Control Block.
///
/// The Ready Table exclusively owns every `Pcb`; level queues hold only the
/// PCB's pool-slot index, never the PCB itself (see `ready_table::ReadyTable`).
pub struct Pcb {
    pub pid: ProcessId,
    pub parent: Option<ProcessId>,
    pub children: Vec<ProcessId>,
    pub name: String,
    pub state: ProcessState,
    pub killed: bool,
    pub chan: Option<WaitChannel>,
    /// Value passed to `exit`; meaningful only once `state == Zombie`.
    pub exit_status: u64,

    /// Remaining personal quantum, in ticks. Always in `0 ..= Q_P`.
    pub ticks_left: u32,
    /// Level this process returns to when promoted expired -> active.
    /// Always in `[0, L)`.
    pub home_level: usize,

    pub context: Context,
    pub trap_frame: TrapFrame,
    /// Root of the process's address space (e.g. a CR3 physical frame
    /// address); owned and interpreted by the address-space collaborator.
    pub address_space: u64,
    /// Owned kernel stack; freed on reap.
    pub kernel_stack: Box<[u8]>,

    pub fd_table: Vec<Option<Arc<Mutex<crate::fs::fd::File>>>>,
    pub cwd: String,
    /// User-space regions backed by this process's address space, for the
    /// address-space collaborator to free on exit (`(vaddr, size)` pairs).
    pub user_allocations: Vec<(u64, u64)>,
}

impl Pcb {
    /// A fresh `unused` slot. Real initialization happens in
    /// `ReadyTable::allocate` and the lifecycle glue built on top of it.
    pub fn unused() -> Self {
        Pcb {
            pid: ProcessId::NONE,
            parent: None,
            children: Vec::new(),
            name: String::new(),
            state: ProcessState::Unused,
            killed: false,
            chan: None,
            exit_status: 0,
            ticks_left: 0,
            home_level: 0,
            context: Context::empty(),
            trap_frame: TrapFrame::empty(),
            address_space: 0,
            kernel_stack: Box::new([]),
            fd_table: Vec::new(),
            cwd: String::from("/"),
            user_allocations: Vec::new(),
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(
            self.state,
            ProcessState::Runnable | ProcessState::Running | ProcessState::Sleeping
        )
    }
}
