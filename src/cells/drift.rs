// src/cells/drift.rs

//! The drift engine.
//!
//! Drifting brings a subtree's particle state from the cell's recorded
//! time up to the engine's current time, on demand. A drift is idempotent
//! (same target time twice does no further work) and monotonic (the
//! target may only advance); drifting backwards or drifting a foreign
//! cell is a programming error and aborts.
//!
//! Actual work is deferred: `activate_drift_*` only records the intent on
//! the cell and climbs the tree to enqueue the drift task at the
//! registered super cell, so activation stays O(active cells).

use std::sync::atomic::Ordering;

use crate::engine::Engine;
use crate::gravity;
use crate::hydro;
use crate::integrator;
use crate::particles::{GPart, Part, SPart, XPart};
use crate::scheduler::Scheduler;
use crate::timeline::bin_is_active;

use super::cell::{CellArena, CellId};

/// Recursively drift the gas particles of a subtree to the engine's
/// current time, folding the motion envelopes upward.
///
/// `force` drifts the subtree irrespective of the cell's own flags; it is
/// OR-ed with the cell's `do_drift` intent on the way down.
pub fn drift_part(
    arena: &mut CellArena,
    parts: &mut [Part],
    xparts: &mut [XPart],
    e: &Engine,
    c: CellId,
    force: bool,
) {
    let ti_current = e.ti_current;
    let (ti_old_part, split, depth) = {
        let cell = &arena[c];
        (cell.ti_old_part, cell.split, cell.depth)
    };

    let force = force || arena[c].do_drift.load(Ordering::Relaxed);

    assert_eq!(
        arena[c].node_id, e.node_id,
        "drifting a foreign cell (depth {})",
        depth
    );
    assert!(
        ti_current >= ti_old_part,
        "attempt to drift to the past (depth {}, ti_old_part {}, ti_current {})",
        depth,
        ti_old_part,
        ti_current
    );

    if split && (force || arena[c].do_sub_drift.load(Ordering::Relaxed)) {
        let mut dx_max = 0.0_f32;
        let mut dx_max_sort = 0.0_f32;
        let mut cell_h_max = 0.0_f32;

        let progeny = arena[c].progeny;
        for child in progeny.into_iter().flatten() {
            drift_part(arena, parts, xparts, e, child, force);

            let cp = &arena[child];
            dx_max = dx_max.max(cp.dx_max_part);
            dx_max_sort = dx_max_sort.max(cp.dx_max_sort);
            cell_h_max = cell_h_max.max(cp.h_max);
        }

        let cell = &mut arena[c];
        cell.h_max = cell_h_max;
        cell.dx_max_part = dx_max;
        cell.dx_max_sort = dx_max_sort;
        cell.ti_old_part = ti_current;
    } else if !split && force && ti_current > ti_old_part {
        let dt = (ti_current - ti_old_part) as f64 * e.time_base;
        let mut dx2_max = 0.0_f32;
        let mut dx2_max_sort = 0.0_f32;
        let mut cell_h_max = 0.0_f32;

        let (offset, count) = {
            let cell = &arena[c];
            (cell.parts_offset, cell.count)
        };
        for k in offset..offset + count {
            let p = &mut parts[k];
            let xp = &mut xparts[k];

            integrator::drift_part(p, xp, dt, ti_current);

            // Limit h to within the allowed range.
            p.h = p.h.min(e.hydro.h_max);

            // Motion since the last tree construction and the last sort.
            let dx2 = xp.x_diff[0] * xp.x_diff[0]
                + xp.x_diff[1] * xp.x_diff[1]
                + xp.x_diff[2] * xp.x_diff[2];
            dx2_max = dx2_max.max(dx2);
            let dx2_sort = xp.x_diff_sort[0] * xp.x_diff_sort[0]
                + xp.x_diff_sort[1] * xp.x_diff_sort[1]
                + xp.x_diff_sort[2] * xp.x_diff_sort[2];
            dx2_max_sort = dx2_max_sort.max(dx2_sort);

            cell_h_max = cell_h_max.max(p.h);

            // Get ready for a density calculation.
            if bin_is_active(p.time_bin, ti_current) {
                hydro::init_part(p);
            }
        }

        let cell = &mut arena[c];
        cell.h_max = cell_h_max;
        cell.dx_max_part = dx2_max.sqrt();
        cell.dx_max_sort = dx2_max_sort.sqrt();
        cell.ti_old_part = ti_current;
    }

    arena[c].do_drift.store(false, Ordering::Relaxed);
    arena[c].do_sub_drift.store(false, Ordering::Relaxed);
}

/// Recursively drift the gravity (and star) particles of a subtree.
pub fn drift_gpart(
    arena: &mut CellArena,
    gparts: &mut [GPart],
    sparts: &mut [SPart],
    e: &Engine,
    c: CellId,
    force: bool,
) {
    let ti_current = e.ti_current;
    let (ti_old_gpart, split, depth) = {
        let cell = &arena[c];
        (cell.ti_old_gpart, cell.split, cell.depth)
    };

    let force = force || arena[c].do_grav_drift.load(Ordering::Relaxed);

    assert_eq!(
        arena[c].node_id, e.node_id,
        "drifting a foreign cell (depth {})",
        depth
    );
    assert!(
        ti_current >= ti_old_gpart,
        "attempt to drift to the past (depth {}, ti_old_gpart {}, ti_current {})",
        depth,
        ti_old_gpart,
        ti_current
    );

    if split && (force || arena[c].do_grav_sub_drift.load(Ordering::Relaxed)) {
        let mut dx_max = 0.0_f32;

        let progeny = arena[c].progeny;
        for child in progeny.into_iter().flatten() {
            drift_gpart(arena, gparts, sparts, e, child, force);
            dx_max = dx_max.max(arena[child].dx_max_gpart);
        }

        let cell = &mut arena[c];
        cell.dx_max_gpart = dx_max;
        cell.ti_old_gpart = ti_current;
    } else if !split && force && ti_current > ti_old_gpart {
        let dt = (ti_current - ti_old_gpart) as f64 * e.time_base;
        let mut dx2_max = 0.0_f32;

        let (g_off, gcount, s_off, scount) = {
            let cell = &arena[c];
            (cell.gparts_offset, cell.gcount, cell.sparts_offset, cell.scount)
        };

        for gp in &mut gparts[g_off..g_off + gcount] {
            integrator::drift_gpart(gp, dt, ti_current);

            let dx2 = gp.x_diff[0] * gp.x_diff[0]
                + gp.x_diff[1] * gp.x_diff[1]
                + gp.x_diff[2] * gp.x_diff[2];
            dx2_max = dx2_max.max(dx2);

            if bin_is_active(gp.time_bin, ti_current) {
                gravity::init_gpart(gp);
            }
        }

        // No displacement envelope for stars: every star has a gravity
        // particle whose envelope covers it.
        for sp in &mut sparts[s_off..s_off + scount] {
            integrator::drift_spart(sp, dt, ti_current);
        }

        let cell = &mut arena[c];
        cell.dx_max_gpart = dx2_max.sqrt();
        cell.ti_old_gpart = ti_current;
    }

    arena[c].do_grav_drift.store(false, Ordering::Relaxed);
    arena[c].do_grav_sub_drift.store(false, Ordering::Relaxed);
}

/// Drift the multipole at this level only.
pub fn drift_multipole(arena: &mut CellArena, e: &Engine, c: CellId) {
    let dx_max_gpart = arena[c].dx_max_gpart;
    let depth = arena[c].depth;
    let state = arena[c].multipole.get_mut();

    assert!(
        e.ti_current >= state.ti_old,
        "attempt to drift a multipole to the past (depth {})",
        depth
    );

    if e.ti_current > state.ti_old {
        let dt = (e.ti_current - state.ti_old) as f64 * e.time_base;
        state.m.drift(dt, dx_max_gpart);
    }
    state.ti_old = e.ti_current;
}

/// Atomically drift the multipole at this level, under the cell's
/// multipole lock, and return the expansion centre and radius bound.
///
/// This is the form gravity activation uses: several workers may reach
/// the same cell through different pair tasks.
pub fn drift_multipole_locked(arena: &CellArena, e: &Engine, c: CellId) -> ([f64; 3], f64) {
    let cell = &arena[c];
    cell.multipole.with_locked(&cell.multipole_lock, |state| {
        assert!(
            e.ti_current >= state.ti_old,
            "attempt to drift a multipole to the past (depth {})",
            cell.depth
        );
        if e.ti_current > state.ti_old {
            let dt = (e.ti_current - state.ti_old) as f64 * e.time_base;
            state.m.drift(dt, cell.dx_max_gpart);
            state.ti_old = e.ti_current;
        }
        (state.m.com, state.m.r_max)
    })
}

/// Recursively drift every multipole of a subtree.
pub fn drift_all_multipoles(arena: &mut CellArena, e: &Engine, c: CellId) {
    drift_multipole(arena, e, c);

    if arena[c].split {
        let progeny = arena[c].progeny;
        for child in progeny.into_iter().flatten() {
            drift_all_multipoles(arena, e, child);
        }
    }
}

/// Record the intent to drift a cell's gas particles and make sure the
/// drift task at the hydro super cell is enqueued.
///
/// Short-circuits when the cell is already flagged, which keeps the whole
/// activation pass O(active cells) rather than O(active tasks).
pub fn activate_drift_part(arena: &CellArena, sched: &Scheduler, c: CellId) {
    let cell = &arena[c];
    if cell.do_drift.swap(true, Ordering::Relaxed) {
        return;
    }

    if cell.super_hydro == Some(c) {
        sched.activate(cell.tasks.drift_part.expect("hydro super cell without a drift task"));
    } else {
        let mut finger = cell.parent;
        while let Some(p) = finger {
            let parent = &arena[p];
            if parent.do_sub_drift.swap(true, Ordering::Relaxed) {
                break;
            }
            if parent.super_hydro == Some(p) {
                sched.activate(
                    parent.tasks.drift_part.expect("hydro super cell without a drift task"),
                );
                break;
            }
            finger = parent.parent;
        }
    }
}

/// Record the intent to drift a cell's gravity particles and make sure
/// the drift task at the gravity super cell is enqueued.
pub fn activate_drift_gpart(arena: &CellArena, sched: &Scheduler, c: CellId) {
    let cell = &arena[c];
    if cell.do_grav_drift.swap(true, Ordering::Relaxed) {
        return;
    }

    if cell.super_gravity == Some(c) {
        sched.activate(cell.tasks.drift_gpart.expect("gravity super cell without a drift task"));
    } else {
        let mut finger = cell.parent;
        while let Some(p) = finger {
            let parent = &arena[p];
            if parent.do_grav_sub_drift.swap(true, Ordering::Relaxed) {
                break;
            }
            if parent.super_gravity == Some(p) {
                sched.activate(
                    parent.tasks.drift_gpart.expect("gravity super cell without a drift task"),
                );
                break;
            }
            finger = parent.parent;
        }
    }
}

/// Check that every gas particle of a local subtree sits at the current
/// drift time. Aborts on the first violation.
pub fn check_part_drift_point(arena: &CellArena, parts: &[Part], e: &Engine, c: CellId) {
    let cell = &arena[c];
    if cell.node_id != e.node_id {
        return;
    }

    assert_eq!(
        cell.ti_old_part, e.ti_current,
        "cell in an incorrect time-zone (depth {}, ti_old_part {}, ti_current {})",
        cell.depth, cell.ti_old_part, e.ti_current
    );
    for p in &parts[cell.parts_offset..cell.parts_offset + cell.count] {
        assert_eq!(
            p.ti_drift, e.ti_current,
            "particle in an incorrect time-zone (depth {})",
            cell.depth
        );
    }

    if cell.split {
        for &child in cell.progeny.iter().flatten() {
            check_part_drift_point(arena, parts, e, child);
        }
    }
}

/// Check that every gravity and star particle of a local subtree sits at
/// the current drift time.
pub fn check_gpart_drift_point(
    arena: &CellArena,
    gparts: &[GPart],
    sparts: &[SPart],
    e: &Engine,
    c: CellId,
) {
    let cell = &arena[c];
    if cell.node_id != e.node_id {
        return;
    }

    assert_eq!(
        cell.ti_old_gpart, e.ti_current,
        "cell in an incorrect time-zone (depth {}, ti_old_gpart {}, ti_current {})",
        cell.depth, cell.ti_old_gpart, e.ti_current
    );
    for gp in &gparts[cell.gparts_offset..cell.gparts_offset + cell.gcount] {
        assert_eq!(
            gp.ti_drift, e.ti_current,
            "g-particle in an incorrect time-zone (depth {})",
            cell.depth
        );
    }
    for sp in &sparts[cell.sparts_offset..cell.sparts_offset + cell.scount] {
        assert_eq!(
            sp.ti_drift, e.ti_current,
            "s-particle in an incorrect time-zone (depth {})",
            cell.depth
        );
    }

    if cell.split {
        for &child in cell.progeny.iter().flatten() {
            check_gpart_drift_point(arena, gparts, sparts, e, child);
        }
    }
}

/// Check that the multipole of a cell sits at the current drift time.
pub fn check_multipole_drift_point(arena: &mut CellArena, e: &Engine, c: CellId) {
    let depth = arena[c].depth;
    let ti_old = arena[c].multipole.get_mut().ti_old;
    assert_eq!(
        ti_old, e.ti_current,
        "cell multipole in an incorrect time-zone (depth {}, ti_old {}, ti_current {})",
        depth, ti_old, e.ti_current
    );

    if arena[c].split {
        let progeny = arena[c].progeny;
        for child in progeny.into_iter().flatten() {
            check_multipole_drift_point(arena, e, child);
        }
    }
}
