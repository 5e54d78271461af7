// src/engine/runner.rs

//! Task bodies for the worker pool.
//!
//! The runner dispatches on the task kind and executes the bodies the
//! tree machinery owns: drifts (under the subtree locks, with
//! yield-and-retry on contention), sorts, kicks and the time-step fold.
//! The interaction loops, ghosts, cooling and the communication endpoint
//! internals belong to their collaborators; their stubs complete
//! immediately here so the dependency graph stays exercised.

use log::trace;

use crate::cells::{
    drift_gpart, drift_part, locktree, run_sort, unlocktree, CellArena, CellId, LockKind,
    LockStatus,
};
use crate::integrator;
use crate::particles::{GPart, Part};
use crate::scheduler::{Scheduler, Task, TaskId, TaskKind, TaskOutcome};
use crate::space::{SharedSpace, Space};
use crate::timeline::{bin_is_active, get_integer_time_end, get_integer_timestep, MAX_NR_TIMESTEPS};

use super::Engine;

pub struct Runner<'a> {
    space: &'a SharedSpace<'a>,
    e: &'a Engine,
}

impl<'a> Runner<'a> {
    pub fn new(space: &'a SharedSpace<'a>, e: &'a Engine) -> Self {
        Runner { space, e }
    }

    /// Execute one task body. Never blocks: contention on a cell lock
    /// reports [`TaskOutcome::Requeue`] and leaves all state untouched.
    pub fn execute(&self, sched: &Scheduler, tid: TaskId) -> TaskOutcome {
        let t = sched.task(tid);
        match t.kind {
            TaskKind::DriftPart => self.run_drift_part(t),
            TaskKind::DriftGPart => self.run_drift_gpart(t),
            TaskKind::Sort => self.run_sort(t),
            TaskKind::Kick1 | TaskKind::Kick2 => self.run_kick_gparts(t),
            TaskKind::Timestep => self.run_timestep(t),
            other => {
                // Interaction loops, ghosts and communication internals
                // live with their collaborators.
                trace!("completing collaborator-owned task {:?}", other);
                TaskOutcome::Done
            }
        }
    }

    fn run_drift_part(&self, t: &Task) -> TaskOutcome {
        let c = t.ci.expect("drift task without a cell");
        // Safe per the dependency graph: this task is the only writer of
        // the subtree while the lock below is held.
        let space = unsafe { self.space.get() };

        if locktree(&space.cells, c, LockKind::Part) == LockStatus::Busy {
            return TaskOutcome::Requeue;
        }
        {
            let Space { cells, parts, xparts, .. } = space;
            drift_part(cells, parts, xparts, self.e, c, false);
        }
        unlocktree(&space.cells, c, LockKind::Part);
        TaskOutcome::Done
    }

    fn run_drift_gpart(&self, t: &Task) -> TaskOutcome {
        let c = t.ci.expect("drift task without a cell");
        let space = unsafe { self.space.get() };

        // The gravity drift also moves the stars, so both windows lock.
        if locktree(&space.cells, c, LockKind::GPart) == LockStatus::Busy {
            return TaskOutcome::Requeue;
        }
        if locktree(&space.cells, c, LockKind::SPart) == LockStatus::Busy {
            unlocktree(&space.cells, c, LockKind::GPart);
            return TaskOutcome::Requeue;
        }
        {
            let Space { cells, gparts, sparts, .. } = space;
            drift_gpart(cells, gparts, sparts, self.e, c, false);
        }
        unlocktree(&space.cells, c, LockKind::SPart);
        unlocktree(&space.cells, c, LockKind::GPart);
        TaskOutcome::Done
    }

    fn run_sort(&self, t: &Task) -> TaskOutcome {
        let c = t.ci.expect("sort task without a cell");
        let space = unsafe { self.space.get() };

        if locktree(&space.cells, c, LockKind::Part) == LockStatus::Busy {
            return TaskOutcome::Requeue;
        }
        {
            let Space { cells, parts, .. } = space;
            run_sort(cells, c, parts, t.flags as u16);
        }
        unlocktree(&space.cells, c, LockKind::Part);
        TaskOutcome::Done
    }

    /// Half-kick the active gravity particles of the subtree. The gas
    /// kick consumes hydro accelerations the core does not own.
    fn run_kick_gparts(&self, t: &Task) -> TaskOutcome {
        let c = t.ci.expect("kick task without a cell");
        let space = unsafe { self.space.get() };

        if locktree(&space.cells, c, LockKind::GPart) == LockStatus::Busy {
            return TaskOutcome::Requeue;
        }
        {
            let Space { cells, gparts, .. } = space;
            kick_cell_gparts(cells, gparts, self.e, c);
        }
        unlocktree(&space.cells, c, LockKind::GPart);
        TaskOutcome::Done
    }

    fn run_timestep(&self, t: &Task) -> TaskOutcome {
        let c = t.ci.expect("timestep task without a cell");
        let space = unsafe { self.space.get() };
        let Space { cells, parts, gparts, .. } = space;
        timestep_cell(cells, parts, gparts, self.e, c);
        TaskOutcome::Done
    }
}

fn kick_cell_gparts(arena: &CellArena, gparts: &mut [GPart], e: &Engine, c: CellId) {
    let cell = &arena[c];
    if cell.split {
        for &child in cell.progeny.iter().flatten() {
            kick_cell_gparts(arena, gparts, e, child);
        }
        return;
    }
    for gp in &mut gparts[cell.gparts_offset..cell.gparts_offset + cell.gcount] {
        if bin_is_active(gp.time_bin, e.ti_current) {
            let dt = get_integer_timestep(gp.time_bin) as f64 * e.time_base / 2.0;
            integrator::kick_gpart(gp, dt);
        }
    }
}

/// Fold the next wake-time envelopes of a subtree up from its particles.
fn timestep_cell(arena: &mut CellArena, parts: &[Part], gparts: &[GPart], e: &Engine, c: CellId) {
    let split = arena[c].split;
    let mut hydro_end_min = MAX_NR_TIMESTEPS;
    let mut hydro_end_max = 0;
    let mut gravity_end_min = MAX_NR_TIMESTEPS;
    let mut gravity_end_max = 0;

    if split {
        let progeny = arena[c].progeny;
        for child in progeny.into_iter().flatten() {
            timestep_cell(arena, parts, gparts, e, child);
            let cp = &arena[child];
            if cp.count > 0 {
                hydro_end_min = hydro_end_min.min(cp.ti_hydro_end_min);
                hydro_end_max = hydro_end_max.max(cp.ti_hydro_end_max);
            }
            if cp.gcount > 0 {
                gravity_end_min = gravity_end_min.min(cp.ti_gravity_end_min);
                gravity_end_max = gravity_end_max.max(cp.ti_gravity_end_max);
            }
        }
    } else {
        let cell = &arena[c];
        for p in &parts[cell.parts_offset..cell.parts_offset + cell.count] {
            let ti_end = get_integer_time_end(e.ti_current, p.time_bin);
            hydro_end_min = hydro_end_min.min(ti_end);
            hydro_end_max = hydro_end_max.max(ti_end);
        }
        for gp in &gparts[cell.gparts_offset..cell.gparts_offset + cell.gcount] {
            let ti_end = get_integer_time_end(e.ti_current, gp.time_bin);
            gravity_end_min = gravity_end_min.min(ti_end);
            gravity_end_max = gravity_end_max.max(ti_end);
        }
    }

    let cell = &mut arena[c];
    cell.ti_hydro_end_min = hydro_end_min;
    cell.ti_hydro_end_max = hydro_end_max;
    cell.ti_gravity_end_min = gravity_end_min;
    cell.ti_gravity_end_max = gravity_end_max;
}
