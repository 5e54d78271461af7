// src/engine/maketasks.rs

//! Construction of the task graph after a rebuild.
//!
//! Tasks anchor at the top-level cells: one self interaction per occupied
//! cell, one pair interaction per neighbouring cell pair, and the per-cell
//! chain (kick1 → drift → sort → interactions → ghost → end-force → kick2
//! → timestep). Gravity gets its own drift, init, interactions and down
//! pass. Every stub starts skipped; the activation pass decides each step
//! which ones run.
//!
//! Pairs that cross a rank boundary additionally get their communication
//! endpoints here: the receive chain (xv → rho → tend) on the foreign
//! cell, feeding its sort task and the pair interactions, and the send
//! set on the local cell, fed by the drift, the ghost and the time-step
//! fold. Foreign cells carry only a sort task of their own; everything
//! else about them is driven by the receives.

use std::collections::HashSet;

use log::debug;

use crate::cells::{get_sid, CellId};
use crate::scheduler::{Scheduler, TaskId, TaskKind, TaskSubkind};
use crate::space::Space;

use super::{Engine, POLICY_HYDRO, POLICY_SELF_GRAVITY};

/// Build the task stubs and their dependency edges for the current
/// decomposition. Must be rerun after every rebuild.
pub fn make_tasks(space: &mut Space, sched: &mut Scheduler, e: &Engine) {
    let top = space.top.clone();

    // Per-cell task chains.
    for &c in &top {
        let (count, gcount, local) = {
            let cell = &space.cells[c];
            (cell.count, cell.gcount, cell.node_id == e.node_id)
        };
        if !local {
            // A foreign cell only sorts; the received positions feed it.
            if e.has_policy(POLICY_HYDRO) && count > 0 {
                let sorts = sched.add_task(TaskKind::Sort, TaskSubkind::None, Some(c), None, 0);
                space.cells[c].tasks.sorts = Some(sorts);
            }
            continue;
        }

        let kick1 = sched.add_task(TaskKind::Kick1, TaskSubkind::None, Some(c), None, 0);
        let kick2 = sched.add_task(TaskKind::Kick2, TaskSubkind::None, Some(c), None, 0);
        let timestep = sched.add_task(TaskKind::Timestep, TaskSubkind::None, Some(c), None, 0);
        let end_force = sched.add_task(TaskKind::EndForce, TaskSubkind::None, Some(c), None, 0);
        sched.add_unlock(end_force, kick2);
        sched.add_unlock(kick2, timestep);

        let cell = &mut space.cells[c];
        cell.tasks.kick1 = Some(kick1);
        cell.tasks.kick2 = Some(kick2);
        cell.tasks.timestep = Some(timestep);
        cell.tasks.end_force = Some(end_force);

        if e.has_policy(POLICY_HYDRO) && count > 0 {
            let drift = sched.add_task(TaskKind::DriftPart, TaskSubkind::None, Some(c), None, 0);
            let sorts = sched.add_task(TaskKind::Sort, TaskSubkind::None, Some(c), None, 0);
            let ghost = sched.add_task(TaskKind::Ghost, TaskSubkind::None, Some(c), None, 0);
            let cooling = sched.add_task(TaskKind::Cooling, TaskSubkind::None, Some(c), None, 0);
            let sourceterms =
                sched.add_task(TaskKind::SourceTerms, TaskSubkind::None, Some(c), None, 0);
            sched.add_unlock(kick1, drift);
            sched.add_unlock(drift, sorts);
            sched.add_unlock(ghost, end_force);
            sched.add_unlock(kick2, cooling);
            sched.add_unlock(cooling, sourceterms);

            let cell = &mut space.cells[c];
            cell.tasks.drift_part = Some(drift);
            cell.tasks.sorts = Some(sorts);
            cell.tasks.ghost = Some(ghost);
            cell.tasks.cooling = Some(cooling);
            cell.tasks.sourceterms = Some(sourceterms);
        }

        if e.has_policy(POLICY_SELF_GRAVITY) && gcount > 0 {
            let drift_g = sched.add_task(TaskKind::DriftGPart, TaskSubkind::None, Some(c), None, 0);
            let init = sched.add_task(TaskKind::InitGrav, TaskSubkind::None, Some(c), None, 0);
            let down = sched.add_task(TaskKind::GravDown, TaskSubkind::None, Some(c), None, 0);
            let long_range =
                sched.add_task(TaskKind::GravLongRange, TaskSubkind::Grav, Some(c), None, 0);
            sched.add_unlock(kick1, drift_g);
            sched.add_unlock(init, long_range);
            sched.add_unlock(long_range, down);
            sched.add_unlock(down, end_force);

            let cell = &mut space.cells[c];
            cell.tasks.drift_gpart = Some(drift_g);
            cell.tasks.init_grav = Some(init);
            cell.tasks.grav_down = Some(down);
            cell.tasks.grav_long_range = Some(long_range);
        }
    }

    // Self interactions.
    for &c in &top {
        let (count, gcount, local) = {
            let cell = &space.cells[c];
            (cell.count, cell.gcount, cell.node_id == e.node_id)
        };
        if !local {
            continue;
        }

        if e.has_policy(POLICY_HYDRO) && count > 0 {
            let t = sched.add_task(TaskKind::SubSelf, TaskSubkind::Density, Some(c), None, 0);
            link_hydro_interaction(space, sched, t, c, None);
        }
        if e.has_policy(POLICY_SELF_GRAVITY) && gcount > 0 {
            let t = sched.add_task(TaskKind::SelfTask, TaskSubkind::Grav, Some(c), None, 0);
            link_grav_interaction(space, sched, t, c, None);
        }
    }

    // Pair interactions between neighbouring top-level cells.
    let mut seen: HashSet<(u32, u32)> = HashSet::new();
    let grid = space.config.top_grid;
    for ii in 0..grid[0] {
        for jj in 0..grid[1] {
            for kk in 0..grid[2] {
                let flat_i = (ii * grid[1] + jj) * grid[2] + kk;
                let ci = top[flat_i];

                for di in -1i64..=1 {
                    for dj in -1i64..=1 {
                        for dk in -1i64..=1 {
                            if di == 0 && dj == 0 && dk == 0 {
                                continue;
                            }
                            let Some(flat_j) =
                                neighbour_index(grid, space.config.periodic, [ii, jj, kk], [di, dj, dk])
                            else {
                                continue;
                            };
                            let cj = top[flat_j];
                            if ci == cj {
                                continue;
                            }
                            let key = (ci.0.min(cj.0), ci.0.max(cj.0));
                            if !seen.insert(key) {
                                continue;
                            }

                            make_pair_tasks(space, sched, e, ci, cj);
                        }
                    }
                }
            }
        }
    }

    debug!("task graph built: {} stubs", sched.nr_tasks());
}

/// Flat index of a grid neighbour, wrapping when periodic.
fn neighbour_index(
    grid: [usize; 3],
    periodic: bool,
    at: [usize; 3],
    delta: [i64; 3],
) -> Option<usize> {
    let mut idx = [0usize; 3];
    for k in 0..3 {
        let raw = at[k] as i64 + delta[k];
        if periodic {
            idx[k] = raw.rem_euclid(grid[k] as i64) as usize;
        } else if raw < 0 || raw >= grid[k] as i64 {
            return None;
        } else {
            idx[k] = raw as usize;
        }
    }
    Some((idx[0] * grid[1] + idx[1]) * grid[2] + idx[2])
}

fn make_pair_tasks(space: &mut Space, sched: &mut Scheduler, e: &Engine, ci: CellId, cj: CellId) {
    let ci_local = space.cells[ci].node_id == e.node_id;
    let cj_local = space.cells[cj].node_id == e.node_id;
    if !ci_local && !cj_local {
        return;
    }
    let crossing = ci_local != cj_local;
    let (local, foreign) = if ci_local { (ci, cj) } else { (cj, ci) };

    let hydro = e.has_policy(POLICY_HYDRO)
        && space.cells[ci].count > 0
        && space.cells[cj].count > 0;
    let gravity = e.has_policy(POLICY_SELF_GRAVITY)
        && space.cells[ci].gcount > 0
        && space.cells[cj].gcount > 0;

    if hydro {
        if crossing {
            ensure_hydro_comms(space, sched, e, local, foreign);
        }

        let (sid, _, flipped) = get_sid(
            space.config.dim,
            space.config.periodic,
            &space.cells[ci],
            &space.cells[cj],
        );
        let (ci, cj) = if flipped { (cj, ci) } else { (ci, cj) };
        let t = sched.add_task(
            TaskKind::Pair,
            TaskSubkind::Density,
            Some(ci),
            Some(cj),
            sid as u32,
        );
        link_hydro_interaction(space, sched, t, ci, Some(cj));

        if crossing {
            // The pair consumes received positions and produces the
            // densities the reply carries.
            let recv_xv = space.cells[foreign].tasks.recv_xv.unwrap();
            sched.add_unlock(recv_xv, t);
            let send_rho = space.cells[local].tasks.send_rho.unwrap();
            sched.add_unlock(t, send_rho);
        }
    }

    if gravity {
        if crossing {
            ensure_grav_comms(space, sched, e, local, foreign);
        }

        let t = sched.add_task(TaskKind::Pair, TaskSubkind::Grav, Some(ci), Some(cj), 0);
        link_grav_interaction(space, sched, t, ci, Some(cj));

        if crossing {
            let recv_grav = space.cells[foreign].tasks.recv_grav.unwrap();
            sched.add_unlock(recv_grav, t);
        }
    }
}

/// Create the foreign receive chain and the local send set of a
/// boundary-crossing hydro pair, once per cell. Both endpoints of an
/// exchange agree on the cell's communication tag.
fn ensure_hydro_comms(space: &mut Space, sched: &mut Scheduler, e: &Engine, local: CellId, foreign: CellId) {
    if space.cells[foreign].tasks.recv_xv.is_none() {
        let tag = e.next_cell_tag();
        space.cells[foreign].tag = tag;

        let recv_xv = sched.add_task(TaskKind::Recv, TaskSubkind::Xv, Some(foreign), None, tag);
        let recv_rho = sched.add_task(TaskKind::Recv, TaskSubkind::Rho, Some(foreign), None, tag);
        #[cfg(feature = "extra-hydro-loop")]
        let recv_gradient =
            sched.add_task(TaskKind::Recv, TaskSubkind::Gradient, Some(foreign), None, tag);
        let recv_ti = match space.cells[foreign].tasks.recv_ti {
            Some(t) => t,
            None => sched.add_task(TaskKind::Recv, TaskSubkind::Tend, Some(foreign), None, tag),
        };
        sched.add_unlock(recv_xv, recv_rho);
        sched.add_unlock(recv_rho, recv_ti);
        #[cfg(feature = "extra-hydro-loop")]
        sched.add_unlock(recv_rho, recv_gradient);

        // Received positions feed the foreign cell's sort.
        if let Some(sorts) = space.cells[foreign].tasks.sorts {
            sched.add_unlock(recv_xv, sorts);
        }

        let cell = &mut space.cells[foreign].tasks;
        cell.recv_xv = Some(recv_xv);
        cell.recv_rho = Some(recv_rho);
        #[cfg(feature = "extra-hydro-loop")]
        {
            cell.recv_gradient = Some(recv_gradient);
        }
        cell.recv_ti = Some(recv_ti);
    }

    if space.cells[local].tasks.send_xv.is_none() {
        let tag = e.next_cell_tag();
        space.cells[local].tag = tag;
        let (drift, ghost, timestep, existing_ti) = {
            let tasks = &space.cells[local].tasks;
            (tasks.drift_part, tasks.ghost, tasks.timestep, tasks.send_ti)
        };

        // Positions go out drifted, densities once the ghost has closed
        // the loop, end times once the fold has produced them.
        let send_xv = sched.add_task(TaskKind::Send, TaskSubkind::Xv, Some(local), None, tag);
        let send_rho = sched.add_task(TaskKind::Send, TaskSubkind::Rho, Some(local), None, tag);
        #[cfg(feature = "extra-hydro-loop")]
        let send_gradient =
            sched.add_task(TaskKind::Send, TaskSubkind::Gradient, Some(local), None, tag);
        if let Some(drift) = drift {
            sched.add_unlock(drift, send_xv);
        }
        if let Some(ghost) = ghost {
            sched.add_unlock(ghost, send_rho);
        }
        #[cfg(feature = "extra-hydro-loop")]
        if let Some(ghost) = ghost {
            sched.add_unlock(ghost, send_gradient);
        }
        let send_ti = match existing_ti {
            Some(t) => t,
            None => {
                let t = sched.add_task(TaskKind::Send, TaskSubkind::Tend, Some(local), None, tag);
                if let Some(timestep) = timestep {
                    sched.add_unlock(timestep, t);
                }
                t
            }
        };

        let cell = &mut space.cells[local].tasks;
        cell.send_xv = Some(send_xv);
        cell.send_rho = Some(send_rho);
        #[cfg(feature = "extra-hydro-loop")]
        {
            cell.send_gradient = Some(send_gradient);
        }
        cell.send_ti = Some(send_ti);
    }
}

/// Create the gravity communication endpoints of a boundary-crossing
/// pair, once per cell. The end-time exchange is shared with hydro.
fn ensure_grav_comms(space: &mut Space, sched: &mut Scheduler, e: &Engine, local: CellId, foreign: CellId) {
    if space.cells[foreign].tasks.recv_grav.is_none() {
        let tag = if space.cells[foreign].tag != 0 {
            space.cells[foreign].tag
        } else {
            let tag = e.next_cell_tag();
            space.cells[foreign].tag = tag;
            tag
        };

        let recv_grav = sched.add_task(TaskKind::Recv, TaskSubkind::Grav, Some(foreign), None, tag);
        let recv_ti = match space.cells[foreign].tasks.recv_ti {
            Some(t) => t,
            None => sched.add_task(TaskKind::Recv, TaskSubkind::Tend, Some(foreign), None, tag),
        };
        sched.add_unlock(recv_grav, recv_ti);

        let cell = &mut space.cells[foreign].tasks;
        cell.recv_grav = Some(recv_grav);
        cell.recv_ti = Some(recv_ti);
    }

    if space.cells[local].tasks.send_grav.is_none() {
        let tag = if space.cells[local].tag != 0 {
            space.cells[local].tag
        } else {
            let tag = e.next_cell_tag();
            space.cells[local].tag = tag;
            tag
        };
        let (drift_g, timestep, existing_ti) = {
            let tasks = &space.cells[local].tasks;
            (tasks.drift_gpart, tasks.timestep, tasks.send_ti)
        };

        // Particles go out drifted; end times follow the fold (and the
        // end-time send may already exist from the hydro side).
        let send_grav = sched.add_task(TaskKind::Send, TaskSubkind::Grav, Some(local), None, tag);
        if let Some(drift_g) = drift_g {
            sched.add_unlock(drift_g, send_grav);
        }
        let send_ti = match existing_ti {
            Some(t) => t,
            None => {
                let t = sched.add_task(TaskKind::Send, TaskSubkind::Tend, Some(local), None, tag);
                if let Some(timestep) = timestep {
                    sched.add_unlock(timestep, t);
                }
                t
            }
        };

        let cell = &mut space.cells[local].tasks;
        cell.send_grav = Some(send_grav);
        cell.send_ti = Some(send_ti);
    }
}

/// Link a hydro interaction into the cells it touches and give it its
/// dependency edges: the sorts (and through them the drifts) come first,
/// the ghosts wait for it.
fn link_hydro_interaction(
    space: &mut Space,
    sched: &mut Scheduler,
    t: TaskId,
    ci: CellId,
    cj: Option<CellId>,
) {
    for c in std::iter::once(ci).chain(cj) {
        let cell = &mut space.cells[c];
        cell.tasks.density.push(t);
        cell.nr_tasks += 1;
        if let Some(sorts) = cell.tasks.sorts {
            sched.add_unlock(sorts, t);
        }
        if let Some(ghost) = cell.tasks.ghost {
            sched.add_unlock(t, ghost);
        }
    }
}

/// Link a gravity interaction into the cells it touches: the gravity
/// drift and init come first, the down pass waits for it.
fn link_grav_interaction(
    space: &mut Space,
    sched: &mut Scheduler,
    t: TaskId,
    ci: CellId,
    cj: Option<CellId>,
) {
    for c in std::iter::once(ci).chain(cj) {
        let cell = &mut space.cells[c];
        cell.tasks.grav.push(t);
        cell.nr_tasks += 1;
        if let Some(drift_g) = cell.tasks.drift_gpart {
            sched.add_unlock(drift_g, t);
        }
        if let Some(init) = cell.tasks.init_grav {
            sched.add_unlock(init, t);
        }
        if let Some(down) = cell.tasks.grav_down {
            sched.add_unlock(t, down);
        }
    }
}
