// src/engine/step.rs

//! Engine-level passes over the top-level cells, and the step driver
//! that strings them together.

use log::{debug, warn};
use rayon::prelude::*;

use crate::cells::{
    drift_all_multipoles, drift_gpart, drift_part, set_super, set_super_gravity, set_super_hydro,
    ActivationContext, CellId,
};
use crate::scheduler::Scheduler;
use crate::space::{SharedSpace, Space};
use crate::timeline::{bin_is_active, get_integer_time_begin, MAX_NR_TIMESTEPS};

use super::collect::{StepReduce, StepSummary};
use super::runner::Runner;
use super::{Engine, POLICY_EXTERNAL_GRAVITY, POLICY_HYDRO, POLICY_SELF_GRAVITY};

/// Assign the super pointers of every cell ahead of activation.
pub fn set_super_all(space: &mut Space, e: &Engine) {
    let top: Vec<CellId> = space.top.clone();
    for &c in &top {
        if e.has_policy(POLICY_HYDRO) {
            set_super_hydro(&mut space.cells, c, None);
        }
        if e.has_policy(POLICY_SELF_GRAVITY | POLICY_EXTERNAL_GRAVITY) {
            set_super_gravity(&mut space.cells, c, None);
        }
        set_super(&mut space.cells, c, None);
    }
}

/// Run the activation pass over every top-level cell, in parallel.
/// Returns whether any pair demands a rebuild.
pub fn unskip_all(space: &Space, sched: &Scheduler, e: &Engine) -> bool {
    let ctx = ActivationContext {
        arena: &space.cells,
        sched,
        e,
        dim: space.config.dim,
        periodic: space.config.periodic,
    };

    space
        .top
        .par_iter()
        .map(|&c| {
            // Foreign top cells are handled by their own rank; every
            // pair that crosses the boundary sits in a local cell's
            // task list as well.
            if space.cells[c].node_id != e.node_id {
                return false;
            }
            let mut rebuild = false;
            if e.has_policy(POLICY_HYDRO) {
                rebuild |= ctx.unskip_hydro_tasks(c);
            }
            if e.has_policy(POLICY_SELF_GRAVITY | POLICY_EXTERNAL_GRAVITY) {
                rebuild |= ctx.unskip_gravity_tasks(c);
            }
            rebuild
        })
        .reduce(|| false, |a, b| a || b)
}

/// Force-drift every local cell and multipole to the current time. Used
/// ahead of a rebuild, when everything must be current at once.
pub fn drift_all(space: &mut Space, e: &Engine) {
    let top: Vec<CellId> = space.top.clone();
    for &c in &top {
        if space.cells[c].node_id != e.node_id {
            continue;
        }
        {
            let Space { cells, parts, xparts, .. } = space;
            drift_part(cells, parts, xparts, e, c, true);
        }
        {
            let Space { cells, gparts, sparts, .. } = space;
            drift_gpart(cells, gparts, sparts, e, c, true);
        }
        drift_all_multipoles(&mut space.cells, e, c);
    }
}

/// Run one step at the engine's current time: activate the task subset,
/// drain it with `nr_threads` workers, gather this rank's summary, fold
/// it across ranks through the given transport and apply the global
/// result. Returns the applied summary.
///
/// The caller advances `e.ti_current` between steps and triggers a
/// rebuild (plus task reconstruction) when `e.force_rebuild` comes back
/// set.
pub fn step<T: StepReduce>(
    space: &mut Space,
    sched: &Scheduler,
    e: &mut Engine,
    nr_threads: usize,
    transport: &T,
) -> StepSummary {
    sched.skip_all();
    let rebuild = unskip_all(space, sched, e);
    if rebuild {
        warn!("neighbour conditions degraded; a rebuild will be requested");
    }
    debug!("step at ti={}: {} tasks active", e.ti_current, sched.nr_active());

    sched.start();
    {
        let shared = SharedSpace::new(space);
        let runner = Runner::new(&shared, e);
        sched.run(nr_threads, |s, t| runner.execute(s, t));
    }

    let mut local = collect_summary(space, e);
    local.rebuild |= rebuild;

    let global = transport.reduce(local);
    global.apply(e);
    global
}

/// Build this rank's step summary by scanning the top-level cells and the
/// particle arrays.
pub fn collect_summary(space: &Space, e: &Engine) -> StepSummary {
    let mut s = StepSummary {
        updates: 0,
        g_updates: 0,
        s_updates: 0,
        ti_hydro_end_min: MAX_NR_TIMESTEPS,
        ti_hydro_end_max: 0,
        ti_hydro_beg_max: 0,
        ti_gravity_end_min: MAX_NR_TIMESTEPS,
        ti_gravity_end_max: 0,
        ti_gravity_beg_max: 0,
        rebuild: false,
    };

    for &c in &space.top {
        let cell = &space.cells[c];
        if cell.node_id != e.node_id {
            continue;
        }
        if cell.count > 0 {
            s.ti_hydro_end_min = s.ti_hydro_end_min.min(cell.ti_hydro_end_min);
            s.ti_hydro_end_max = s.ti_hydro_end_max.max(cell.ti_hydro_end_max);
        }
        if cell.gcount > 0 {
            s.ti_gravity_end_min = s.ti_gravity_end_min.min(cell.ti_gravity_end_min);
            s.ti_gravity_end_max = s.ti_gravity_end_max.max(cell.ti_gravity_end_max);
        }
    }

    for p in &space.parts {
        if bin_is_active(p.time_bin, e.ti_current) {
            s.updates += 1;
            let begin = get_integer_time_begin(e.ti_current + 1, p.time_bin);
            s.ti_hydro_beg_max = s.ti_hydro_beg_max.max(begin);
        }
    }
    for gp in &space.gparts {
        if bin_is_active(gp.time_bin, e.ti_current) {
            s.g_updates += 1;
            let begin = get_integer_time_begin(e.ti_current + 1, gp.time_bin);
            s.ti_gravity_beg_max = s.ti_gravity_beg_max.max(begin);
        }
    }
    for sp in &space.sparts {
        if bin_is_active(sp.time_bin, e.ti_current) {
            s.s_updates += 1;
        }
    }

    s
}
