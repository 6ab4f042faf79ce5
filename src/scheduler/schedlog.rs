//! Diagnostic trace: `T|<set>|<level>(<level_ticks>)[,[pid]name:
//! state(ticks_left)]*`, one line per staircase/level pair, emitted once per
//! dispatch while the trace window is open. Uses this kernel's own
//! `log_info!` macro instead of a raw `cprintf`.

use alloc::string::String;
use core::fmt::Write as _;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::config::L;
use super::ready_table::{ReadyTable, StaircaseSet};
use super::task::ProcessState;

static ACTIVE: AtomicBool = AtomicBool::new(false);
static LAST_TICK: AtomicU64 = AtomicU64::new(0);

/// Opens the trace window for the next `n` timer ticks`).
pub fn enable(ticks_now: u64, n: u64) {
    LAST_TICK.store(ticks_now.saturating_add(n), Ordering::SeqCst);
    ACTIVE.store(true, Ordering::SeqCst);
}

pub fn is_active(ticks_now: u64) -> bool {
    ACTIVE.load(Ordering::SeqCst) && ticks_now <= LAST_TICK.load(Ordering::SeqCst)
}

/// Called by the dispatcher on every dispatch. Emits one trace line per
/// staircase/level pair if the window is open, then auto-disables once the
/// window has elapsed.
pub fn maybe_log(rt: &ReadyTable, ticks_now: u64) {
    if ACTIVE.load(Ordering::SeqCst) && ticks_now > LAST_TICK.load(Ordering::SeqCst) {
        ACTIVE.store(false, Ordering::SeqCst);
        return;
    }
    if !is_active(ticks_now) {
        return;
    }

    for set in [StaircaseSet::Active, StaircaseSet::Expired] {
        let set_name = match set {
            StaircaseSet::Active => "active",
            StaircaseSet::Expired => "expired",
        };
        for level in 0..L {
            let q = rt.queue(set, level).lock();
            let mut line = String::new();
            let _ = write!(line, "T|{}|{}({})", set_name, level, q.level_ticks);
            for slot in q.iter() {
                let p = &rt.procs[slot];
                if p.state == ProcessState::Unused {
                    continue;
                }
                let _ = write!(line, ",[{}]{}:{:?}({})", p.pid.0, p.name, p.state, p.ticks_left);
            }
            crate::log_info!("{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_opens_window_for_exactly_n_ticks() {
        enable(100, 5);
        assert!(is_active(100));
        assert!(is_active(105));
        assert!(!is_active(106));
    }

    #[test]
    fn maybe_log_auto_disables_once_the_window_elapses() {
        let rt = ReadyTable::new();
        enable(0, 0);
        assert!(is_active(0));
        maybe_log(&rt, 1);
        assert!(!is_active(1));
    }
}
