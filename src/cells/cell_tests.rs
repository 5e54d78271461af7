use crate::cells::*;
use crate::scheduler::{Scheduler, TaskKind, TaskSubkind};

fn unit_cell() -> Cell {
    Cell::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0], 0, None)
}

#[test]
fn test_center_is_pivot() {
    let c = Cell::new([1.0, 2.0, 3.0], [2.0, 2.0, 2.0], 0, None);
    assert_eq!(c.center(), [2.0, 3.0, 4.0]);
}

#[test]
fn test_dmin_is_smallest_width() {
    let c = Cell::new([0.0; 3], [4.0, 2.0, 8.0], 0, None);
    assert_eq!(c.dmin, 2.0);
}

#[test]
fn test_activity_matches_end_min() {
    let mut c = unit_cell();
    c.ti_hydro_end_min = 8;
    c.ti_gravity_end_min = 16;

    assert!(c.is_active_hydro(8));
    assert!(!c.is_active_hydro(16));
    assert!(c.is_active_gravity(16));
    assert!(!c.is_active_gravity(8));
}

#[test]
fn test_arena_insert_and_recycle() {
    let mut arena = CellArena::new();
    let root = arena.insert(unit_cell());
    let child = arena.insert(Cell::new([0.0; 3], [0.5; 3], 1, Some(root)));
    arena[root].progeny[0] = Some(child);
    arena[root].split = true;
    assert_eq!(arena.len(), 2);

    arena.recycle(root);
    assert_eq!(arena.len(), 0);

    // Recycled slots are handed out again.
    let again = arena.insert(unit_cell());
    assert!(again == root || again == child);
}

#[test]
#[should_panic(expected = "recycled")]
fn test_arena_rejects_stale_ids() {
    let mut arena = CellArena::new();
    let root = arena.insert(unit_cell());
    arena.recycle(root);
    let _ = &arena[root];
}

#[test]
fn test_has_tasks_probes_subtree() {
    let mut arena = CellArena::new();
    let mut sched = Scheduler::new();

    let root = arena.insert(unit_cell());
    let child = arena.insert(Cell::new([0.0; 3], [0.5; 3], 1, Some(root)));
    arena[root].progeny[0] = Some(child);
    arena[root].split = true;

    assert!(!has_tasks(&arena, root));

    let t = sched.add_task(TaskKind::Timestep, TaskSubkind::None, Some(child), None, 0);
    arena[child].tasks.timestep = Some(t);
    assert!(has_tasks(&arena, root));
}

#[test]
fn test_clear_drift_flags() {
    let c = unit_cell();
    c.do_drift.store(true, std::sync::atomic::Ordering::Relaxed);
    c.do_grav_sub_drift.store(true, std::sync::atomic::Ordering::Relaxed);

    c.clear_drift_flags();

    assert!(!c.do_drift.load(std::sync::atomic::Ordering::Relaxed));
    assert!(!c.do_grav_sub_drift.load(std::sync::atomic::Ordering::Relaxed));
}

#[test]
fn test_clean_sorts_drops_arrays() {
    let mut c = unit_cell();
    c.sort[4] = Some(vec![SortEntry { d: 0.0, i: 0 }].into_boxed_slice());
    c.sorted.store(1 << 4, std::sync::atomic::Ordering::Relaxed);

    c.clean_sorts();

    assert!(c.sort[4].is_none());
    assert_eq!(c.sorted.load(std::sync::atomic::Ordering::Relaxed), 0);
}

#[test]
fn test_multipole_slot_locked_access() {
    let c = unit_cell();
    c.multipole.with_locked(&c.multipole_lock, |state| {
        state.m.r_max = 2.0;
        state.ti_old = 7;
    });
    let (r_max, ti_old) = c.multipole.with_locked(&c.multipole_lock, |state| (state.m.r_max, state.ti_old));
    assert_eq!(r_max, 2.0);
    assert_eq!(ti_old, 7);
}
