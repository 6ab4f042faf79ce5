use super::config::{L, Q_P};
use super::level_queue::UnqueueMode;
use super::ready_table::{ReadyTable, StaircaseSet};
use super::task::ProcessState;

/// Applied at exactly one place: once a process has yielded control back to
/// the dispatcher. `slot` is the returned process; `level` is
/// its source level in the active staircase it was dispatched from.
pub fn on_return(rt: &mut ReadyTable, slot: usize, level: usize) {
    let level_exhausted = !rt.queue(StaircaseSet::Active, level).lock().has_ticks();

    if level_exhausted {
        mass_demote(rt, level, slot);
    } else {
        demote_one(rt, slot, level);
    }
}

/// Case A: the level's collective budget hit zero, so every process
/// currently on it migrates. `p_slot` moves last so that if other migrated
/// processes land in the same destination queue, `p` trails them in FIFO
/// order. A `p` that already exited removed
/// itself from the queue during `exit()` and so is simply absent here.
fn mass_demote(rt: &mut ReadyTable, level: usize, p_slot: usize) {
    let members = rt.queue(StaircaseSet::Active, level).lock().drain_all();

    for &slot in &members {
        if slot != p_slot {
            migrate(rt, slot, level + 1);
        }
    }

    if members.contains(&p_slot) && rt.procs[p_slot].state != ProcessState::Zombie {
        migrate(rt, p_slot, level + 1);
    }
}

/// Refreshes `ticks_left` and re-enqueues `slot` starting the search at
/// `start_active`, falling back to its `home_level` in the expired
/// staircase. Used by both mass demotion and rotation.
fn migrate(rt: &mut ReadyTable, slot: usize, start_active: usize) {
    rt.procs[slot].ticks_left = Q_P;
    let home = rt.procs[slot].home_level;
    let (dest_set, dest_level) = rt.find_available_queue(start_active, home);
    if dest_set == StaircaseSet::Expired {
        // Already a no-op here, since `ticks_left` was just refreshed above;
        // kept so the expired-path refresh stays explicit at the call site.
        rt.procs[slot].ticks_left = Q_P;
    }
    rt.queue(dest_set, dest_level).lock().enqueue(slot);
}

/// Case B: only `p` moves. A process that went to sleep, exited, or was
/// already removed elsewhere is left exactly where it is - but `nk` and a
/// zeroed `ticks_left` are still refreshed unconditionally, since a sleeping
/// process woken later is re-enqueued from its stored level-queue position
/// rather than through this function, and must not wake up with a
/// permanently exhausted quantum.
fn demote_one(rt: &mut ReadyTable, p_slot: usize, level: usize) {
    let nk = if rt.procs[p_slot].ticks_left == 0 {
        rt.procs[p_slot].ticks_left = Q_P;
        level + 1
    } else {
        level
    };

    if matches!(rt.procs[p_slot].state, ProcessState::Sleeping | ProcessState::Zombie) {
        return;
    }

    if rt
        .queue(StaircaseSet::Active, level)
        .lock()
        .unqueue(p_slot, UnqueueMode::Try)
        .is_none()
    {
        return;
    }

    let home = rt.procs[p_slot].home_level;
    let (dest_set, dest_level) = rt.find_available_queue(nk, home);
    if dest_set == StaircaseSet::Expired {
        rt.procs[p_slot].ticks_left = Q_P;
    }
    rt.queue(dest_set, dest_level).lock().enqueue(p_slot);
}

/// Active/expired rotation: the dispatcher calls this when a
/// full pass over the active staircase finds no runnable, budgeted PCB.
/// Swaps the staircase identities, then resets every queue in the
/// newly-relabeled expired set to `level_ticks == Q_L` and promotes its
/// members back into the new active staircase at their home levels,
/// preserving relative order within a level.
pub fn rotate(rt: &mut ReadyTable) {
    rt.swap_sets();

    for level in 0..L {
        let members = {
            let mut q = rt.queue(StaircaseSet::Expired, level).lock();
            q.refresh_ticks();
            q.drain_all()
        };
        for slot in members {
            rt.procs[slot].ticks_left = Q_P;
            let home = rt.procs[slot].home_level;
            let (dest_set, dest_level) = rt.find_available_queue(home, home);
            rt.queue(dest_set, dest_level).lock().enqueue(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_proc(rt: &mut ReadyTable, home_level: usize) -> usize {
        let slot = rt.allocate().unwrap();
        rt.procs[slot].state = ProcessState::Runnable;
        rt.procs[slot].home_level = home_level;
        rt.procs[slot].ticks_left = Q_P;
        slot
    }

    #[test]
    fn demote_one_keeps_same_level_when_budget_remains() {
        let mut rt = ReadyTable::new();
        let slot = with_proc(&mut rt, 1);
        rt.procs[slot].ticks_left = 3; // yielded early, budget remains
        rt.queue(StaircaseSet::Active, 1).lock().enqueue(slot);

        on_return(&mut rt, slot, 1);

        assert_eq!(rt.procs[slot].ticks_left, 3);
        assert!(rt.queue(StaircaseSet::Active, 1).lock().iter().any(|s| s == slot));
    }

    #[test]
    fn demote_one_drops_a_level_when_quantum_exhausted() {
        let mut rt = ReadyTable::new();
        let slot = with_proc(&mut rt, 1);
        rt.procs[slot].ticks_left = 0;
        rt.queue(StaircaseSet::Active, 1).lock().enqueue(slot);

        on_return(&mut rt, slot, 1);

        assert_eq!(rt.procs[slot].ticks_left, Q_P);
        assert!(rt.queue(StaircaseSet::Active, 2).lock().iter().any(|s| s == slot));
    }

    #[test]
    fn demote_one_leaves_sleeping_process_queue_position_untouched() {
        let mut rt = ReadyTable::new();
        let slot = with_proc(&mut rt, 1);
        rt.procs[slot].ticks_left = 0;
        rt.procs[slot].state = ProcessState::Sleeping;
        rt.queue(StaircaseSet::Active, 1).lock().enqueue(slot);

        on_return(&mut rt, slot, 1);

        // `ticks_left` is still refreshed - a sleeper woken later must not
        // stay stuck with an exhausted quantum it can never work off - but
        // its level-queue position is left alone since sleep() never
        // unqueues it.
        assert_eq!(rt.procs[slot].ticks_left, Q_P);
        assert!(rt.queue(StaircaseSet::Active, 1).lock().iter().any(|s| s == slot));
    }

    #[test]
    fn demote_one_refreshes_ticks_for_a_zombie_without_reenqueuing() {
        let mut rt = ReadyTable::new();
        let slot = with_proc(&mut rt, 1);
        rt.procs[slot].ticks_left = 0;
        rt.procs[slot].state = ProcessState::Zombie;

        on_return(&mut rt, slot, 1);

        assert_eq!(rt.procs[slot].ticks_left, Q_P);
        assert!(!rt.queue(StaircaseSet::Active, 2).lock().iter().any(|s| s == slot));
    }

    #[test]
    fn mass_demotion_moves_returning_process_last() {
        let mut rt = ReadyTable::new();
        let a = with_proc(&mut rt, 0);
        let b = with_proc(&mut rt, 0);
        let p = with_proc(&mut rt, 0);
        {
            let mut q = rt.queue(StaircaseSet::Active, 0).lock();
            q.enqueue(a);
            q.enqueue(b);
            q.enqueue(p);
            q.level_ticks = 0;
        }

        on_return(&mut rt, p, 0);

        let dest = rt.queue(StaircaseSet::Active, 1).lock().iter().collect::<alloc::vec::Vec<_>>();
        assert_eq!(dest, alloc::vec![a, b, p]);
        for slot in [a, b, p] {
            assert_eq!(rt.procs[slot].ticks_left, Q_P);
        }
    }

    #[test]
    fn mass_demotion_skips_a_returning_process_that_already_exited() {
        let mut rt = ReadyTable::new();
        let a = with_proc(&mut rt, 0);
        let p = with_proc(&mut rt, 0);
        {
            let mut q = rt.queue(StaircaseSet::Active, 0).lock();
            q.enqueue(a);
            q.level_ticks = 0;
        }
        rt.procs[p].state = ProcessState::Zombie; // exit() already unqueued it

        on_return(&mut rt, p, 0);

        assert!(rt.queue(StaircaseSet::Active, 1).lock().iter().any(|s| s == a));
        assert!(!rt.queue(StaircaseSet::Active, 1).lock().iter().any(|s| s == p));
    }

    #[test]
    fn rotation_promotes_members_to_their_home_level() {
        let mut rt = ReadyTable::new();
        let slot = with_proc(&mut rt, 2);
        rt.procs[slot].ticks_left = 0;
        rt.queue(StaircaseSet::Active, 0).lock().level_ticks = 0;
        rt.queue(StaircaseSet::Expired, 0).lock().enqueue(slot);

        rotate(&mut rt);

        assert_eq!(rt.procs[slot].ticks_left, Q_P);
        assert!(rt.queue(StaircaseSet::Active, 2).lock().iter().any(|s| s == slot));
    }

    #[test]
    fn rotation_gives_every_new_active_level_a_full_quantum() {
        let mut rt = ReadyTable::new();
        for level in 0..L {
            rt.queue(StaircaseSet::Active, level).lock().level_ticks = 0;
        }
        rotate(&mut rt);
        for level in 0..L {
            assert_eq!(rt.queue(StaircaseSet::Active, level).lock().level_ticks, super::super::config::Q_L);
        }
    }

    #[test]
    fn rotation_preserves_relative_order_within_a_home_level() {
        let mut rt = ReadyTable::new();
        let a = with_proc(&mut rt, 1);
        let b = with_proc(&mut rt, 1);
        rt.queue(StaircaseSet::Expired, 1).lock().enqueue(a);
        rt.queue(StaircaseSet::Expired, 1).lock().enqueue(b);

        rotate(&mut rt);

        let order = rt.queue(StaircaseSet::Active, 1).lock().iter().collect::<alloc::vec::Vec<_>>();
        assert_eq!(order, alloc::vec![a, b]);
    }

    use alloc::vec::Vec;
    use proptest::prelude::*;

    proptest! {
        // P3: the expired-staircase fallback never lands a process at a
        // level with higher priority than its own home_level.
        #[test]
        fn demote_one_never_lands_above_home_level_via_expired_fallback(
            home in 0usize..L,
            start_level in 0usize..(L - 1),
        ) {
            let mut rt = ReadyTable::new();
            // `start_level` keeps its budget (forces Case B, not Case A);
            // every level above it is exhausted so the active-staircase
            // search can't find room and must fall back to expired.
            for k in (start_level + 1)..L {
                rt.queue(StaircaseSet::Active, k).lock().level_ticks = 0;
            }

            let slot = rt.allocate().unwrap();
            rt.procs[slot].state = ProcessState::Runnable;
            rt.procs[slot].home_level = home;
            rt.procs[slot].ticks_left = 0;
            rt.queue(StaircaseSet::Active, start_level).lock().enqueue(slot);

            on_return(&mut rt, slot, start_level);

            let mut dest = None;
            for k in 0..L {
                if rt.queue(StaircaseSet::Expired, k).lock().iter().any(|s| s == slot) {
                    dest = Some(k);
                }
            }
            let dest = dest.expect("process must land in the expired staircase");
            prop_assert!(dest >= home);
        }

        // P5 + P6: rotation always hands every migrated process a full
        // quantum at its own home_level, and gives every new active level a
        // full level quantum, regardless of how many processes or which
        // home levels are involved.
        #[test]
        fn rotation_promotes_every_member_to_its_home_level_with_full_quanta(
            homes in prop::collection::vec(0usize..L, 0..=8),
        ) {
            let mut rt = ReadyTable::new();
            let mut members = Vec::new();
            for &home in &homes {
                let slot = rt.allocate().unwrap();
                rt.procs[slot].state = ProcessState::Runnable;
                rt.procs[slot].home_level = home;
                rt.procs[slot].ticks_left = 0;
                rt.queue(StaircaseSet::Expired, (home + 1) % L).lock().enqueue(slot);
                members.push((slot, home));
            }
            for k in 0..L {
                rt.queue(StaircaseSet::Active, k).lock().level_ticks = 0;
            }

            rotate(&mut rt);

            for k in 0..L {
                prop_assert_eq!(rt.queue(StaircaseSet::Active, k).lock().level_ticks, super::super::config::Q_L);
            }
            for (slot, home) in members {
                prop_assert_eq!(rt.procs[slot].ticks_left, Q_P);
                prop_assert!(rt.queue(StaircaseSet::Active, home).lock().iter().any(|s| s == slot));
            }
        }
    }
}
