//! Compile-time configuration for the RSDL scheduler core.

/// Number of priority levels in each staircase. Index 0 is highest priority.
pub const L: usize = 4;

/// Maximum number of concurrently live processes (size of the PCB pool and
/// the bound on every level queue's FIFO).
pub const N: usize = 64;

/// Per-process quantum: ticks a process may run before being demoted one level.
pub const Q_P: u32 = 5;

/// Per-level quantum: ticks a level may collectively consume before every
/// member still on it is demoted.
pub const Q_L: u32 = 30;

/// Home level newly created processes land on unless a caller asks for a
/// specific starting priority via `priofork`.
pub const DEFAULT_HOME: usize = L / 2;

/// Number of per-CPU dispatcher descriptors. Every dispatcher currently
/// runs as logical CPU 0; this sizes the per-CPU tables for real SMP
/// bring-up without attempting it here.
pub const MAX_CPUS: usize = 4;

const _: () = assert!(L > 0, "RSDL requires at least one priority level");
const _: () = assert!(N > 0, "RSDL requires a non-empty process table");
const _: () = assert!(Q_P > 0, "per-process quantum must be positive");
const _: () = assert!(Q_L > 0, "per-level quantum must be positive");
const _: () = assert!(DEFAULT_HOME < L, "default home level must be in [0, L)");
