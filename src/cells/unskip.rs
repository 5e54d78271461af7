// src/cells/unskip.rs

//! The task graph activator.
//!
//! Every rebuild constructs the full set of task stubs; every step this
//! pass walks the cells that hold an active particle and un-skips the
//! minimal subset of stubs that must run, inserting the supporting
//! prerequisites (drifts, sorts, sends, receives) as it goes. It also
//! watches for particle motion that has degraded the neighbour
//! decomposition and reports the need for a rebuild.
//!
//! Activation is pure orchestration over atomic flags: it runs in
//! parallel over the top-level cells and never fails. Inconsistencies
//! (a missing task link, a foreign-only activation) abort.

use std::sync::atomic::Ordering;

use crate::engine::Engine;
use crate::gravity::m2l_accept;
use crate::scheduler::{Scheduler, TaskId, TaskKind, TaskSubkind};
use crate::utils::{nearest, KERNEL_GAMMA, SPACE_MAXRELDX};

use super::cell::{Cell, CellArena, CellId};
use super::drift::{activate_drift_gpart, activate_drift_part, drift_multipole_locked};
use super::sort::get_sid;

/// Everything the activation pass reads. One context is shared by all
/// workers of the pass; every mutation it performs goes through atomics
/// or the scheduler.
pub struct ActivationContext<'a> {
    pub arena: &'a CellArena,
    pub sched: &'a Scheduler,
    pub e: &'a Engine,
    pub dim: [f64; 3],
    pub periodic: bool,
}

/// Has particle motion degraded this pair beyond what the decomposition
/// tolerates?
///
/// Either cell having out-sorted its displacement budget, or the combined
/// smoothing-length growth overrunning the buffer between the cells,
/// means the next step must rebuild the tree.
pub fn need_rebuild_for_pair(ci: &Cell, cj: &Cell) -> bool {
    if ci.dx_max_sort > SPACE_MAXRELDX * ci.dmin as f32
        || cj.dx_max_sort > SPACE_MAXRELDX * cj.dmin as f32
    {
        return true;
    }
    KERNEL_GAMMA * ci.h_max.max(cj.h_max) + ci.dx_max_part + cj.dx_max_part > cj.dmin as f32
}

/// May a pair interaction recurse into this cell's progeny? The compact
/// support of its particles, inflated by their motion, must fit within
/// half the cell extent.
#[inline]
fn can_recurse_in_pair_hydro(c: &Cell) -> bool {
    c.split && KERNEL_GAMMA * c.h_max + c.dx_max_part <= 0.5 * c.dmin as f32
}

/// May a self interaction recurse into this cell's progeny? Motion does
/// not enter here; the bound is on the support alone.
#[inline]
fn can_recurse_in_self_hydro(c: &Cell) -> bool {
    c.split && KERNEL_GAMMA * c.h_max < 0.5 * c.dmin as f32
}

/// Do two axis-aligned boxes touch (faces, edges or corners count)?
fn boxes_touch(li: [f64; 3], wi: [f64; 3], lj: [f64; 3], wj: [f64; 3]) -> bool {
    let eps = 0.01 * wi[0].min(wi[1]).min(wi[2]);
    for k in 0..3 {
        if lj[k] > li[k] + wi[k] + eps || li[k] > lj[k] + wj[k] + eps {
            return false;
        }
    }
    true
}

#[inline]
fn activate_option(sched: &Scheduler, task: Option<TaskId>) {
    if let Some(t) = task {
        sched.activate(t);
    }
}

impl<'a> ActivationContext<'a> {
    #[inline]
    fn is_local(&self, c: CellId) -> bool {
        self.arena[c].node_id == self.e.node_id
    }

    /// Activate the sort task chain of a cell: enqueue the sort at the
    /// hydro super cell (with the drift it depends on) and mark the
    /// intermediate levels.
    fn activate_sorts_up(&self, c: CellId) {
        let cell = &self.arena[c];
        if cell.super_hydro == Some(c) {
            self.sched
                .activate(cell.tasks.sorts.expect("hydro super cell without a sort task"));
            if cell.node_id == self.e.node_id {
                activate_drift_part(self.arena, self.sched, c);
            }
        } else {
            let mut finger = cell.parent;
            while let Some(p) = finger {
                let parent = &self.arena[p];
                if parent.do_sub_sort.swap(true, Ordering::Relaxed) {
                    break;
                }
                if parent.super_hydro == Some(p) {
                    self.sched.activate(
                        parent.tasks.sorts.expect("hydro super cell without a sort task"),
                    );
                    if parent.node_id == self.e.node_id {
                        activate_drift_part(self.arena, self.sched, p);
                    }
                    break;
                }
                finger = parent.parent;
            }
        }
    }

    /// Make sure the cell will be sorted in the given direction this
    /// step, discarding every cached direction first if the particles
    /// have moved too far since the arrays were built.
    pub fn activate_sorts(&self, c: CellId, sid: usize) {
        let cell = &self.arena[c];

        // Do we need to re-sort the whole chain?
        if cell.dx_max_sort > SPACE_MAXRELDX * cell.dmin as f32 {
            let mut finger = Some(c);
            while let Some(f) = finger {
                let fc = &self.arena[f];
                let required = fc.requires_sorts.load(Ordering::Relaxed);
                if required != 0 {
                    fc.do_sort.fetch_or(required, Ordering::Relaxed);
                    self.activate_sorts_up(f);
                }
                fc.sorted.store(0, Ordering::Relaxed);
                finger = fc.parent;
            }
        }

        // Has this cell been sorted at all for the given direction?
        if cell.sorted.load(Ordering::Relaxed) & (1 << sid) == 0 || !self.is_local(c) {
            cell.do_sort.fetch_or(1 << sid, Ordering::Relaxed);
            self.activate_sorts_up(c);
        }
    }

    /// Record what a pair interaction at this level needs from both
    /// cells: the sort direction, the motion snapshots, the drifts (local
    /// sides only, and before the sorts) and the sorts themselves.
    fn activate_pair_level(&self, ci: CellId, cj: CellId, sid: usize) {
        let cell_i = &self.arena[ci];
        let cell_j = &self.arena[cj];

        cell_i.requires_sorts.fetch_or(1 << sid, Ordering::Relaxed);
        cell_j.requires_sorts.fetch_or(1 << sid, Ordering::Relaxed);
        cell_i.dx_max_sort_old.store(cell_i.dx_max_sort);
        cell_j.dx_max_sort_old.store(cell_j.dx_max_sort);
        cell_i.dx_max_part_old.store(cell_i.dx_max_part);
        cell_j.dx_max_part_old.store(cell_j.dx_max_part);

        if self.is_local(ci) {
            activate_drift_part(self.arena, self.sched, ci);
        }
        if self.is_local(cj) {
            activate_drift_part(self.arena, self.sched, cj);
        }

        self.activate_sorts(ci, sid);
        self.activate_sorts(cj, sid);
    }

    /// Traverse a sub-cell hydro task and activate the drifts and sorts
    /// the interactions inside it require.
    pub fn activate_subcell_hydro_tasks(&self, ci: CellId, cj: Option<CellId>) {
        let ti_current = self.e.ti_current;

        let Some(cj) = cj else {
            // Self interaction.
            if !self.arena[ci].is_active_hydro(ti_current) {
                return;
            }
            let cell = &self.arena[ci];
            if can_recurse_in_self_hydro(cell) {
                let progeny = cell.progeny;
                for j in 0..8 {
                    let Some(pj) = progeny[j] else { continue };
                    self.activate_subcell_hydro_tasks(pj, None);
                    for &pk in progeny[j + 1..].iter().flatten() {
                        self.activate_subcell_hydro_tasks(pj, Some(pk));
                    }
                }
            } else {
                // Bottom of the traversal: the interaction happens here.
                activate_drift_part(self.arena, self.sched, ci);
            }
            return;
        };

        // Pair interaction.
        if !self.arena[ci].is_active_hydro(ti_current) && !self.arena[cj].is_active_hydro(ti_current)
        {
            return;
        }

        let (sid, shift, flipped) = get_sid(self.dim, self.periodic, &self.arena[ci], &self.arena[cj]);
        let (ci, cj) = if flipped { (cj, ci) } else { (ci, cj) };

        if can_recurse_in_pair_hydro(&self.arena[ci]) && can_recurse_in_pair_hydro(&self.arena[cj])
        {
            // Recurse into the child pairs that share the interface.
            let progeny_i = self.arena[ci].progeny;
            let progeny_j = self.arena[cj].progeny;
            for &pi in progeny_i.iter().flatten() {
                let (li, wi) = (self.arena[pi].loc, self.arena[pi].width);
                for &pj in progeny_j.iter().flatten() {
                    let mut lj = self.arena[pj].loc;
                    for k in 0..3 {
                        lj[k] += shift[k];
                    }
                    if boxes_touch(li, wi, lj, self.arena[pj].width) {
                        self.activate_subcell_hydro_tasks(pi, Some(pj));
                    }
                }
            }
        } else {
            self.activate_pair_level(ci, cj, sid);
        }
    }

    /// Traverse a sub-cell gravity task: drift the multipoles under their
    /// locks, test the acceptance criterion, and descend into the larger
    /// cell when the pair cannot interact through its expansions.
    pub fn activate_subcell_grav_tasks(&self, ci: CellId, cj: Option<CellId>) {
        let ti_current = self.e.ti_current;
        let theta_crit2 = self.e.gravity.theta_crit2;

        let Some(cj) = cj else {
            // Self interaction.
            if !self.arena[ci].is_active_gravity(ti_current) {
                return;
            }
            if self.arena[ci].split {
                let progeny = self.arena[ci].progeny;
                for j in 0..8 {
                    let Some(pj) = progeny[j] else { continue };
                    self.activate_subcell_grav_tasks(pj, None);
                    for &pk in progeny[j + 1..].iter().flatten() {
                        self.activate_subcell_grav_tasks(pj, Some(pk));
                    }
                }
            } else {
                // We have reached the bottom of the tree.
                activate_drift_gpart(self.arena, self.sched, ci);
            }
            return;
        };

        // Pair interaction.
        let ci_active = self.arena[ci].is_active_gravity(ti_current);
        let cj_active = self.arena[cj].is_active_gravity(ti_current);
        if !ci_active && !cj_active {
            return;
        }

        // Atomically drift both multipoles and read their geometry.
        let (com_i, ri_max) = drift_multipole_locked(self.arena, self.e, ci);
        let (com_j, rj_max) = drift_multipole_locked(self.arena, self.e, cj);

        let mut r2 = 0.0;
        for k in 0..3 {
            let mut dx = com_i[k] - com_j[k];
            if self.periodic {
                dx = nearest(dx, self.dim[k]);
            }
            r2 += dx * dx;
        }

        // Can we use the expansions? Then nothing needs drifting.
        if m2l_accept(ri_max, rj_max, theta_crit2, r2) {
            return;
        }

        let ci_split = self.arena[ci].split;
        let cj_split = self.arena[cj].split;

        if !ci_split && !cj_split {
            // Leaf-leaf rejection: the particles themselves will
            // interact, so the local sides must be drifted.
            if ci_active || cj_active {
                if self.is_local(ci) {
                    activate_drift_gpart(self.arena, self.sched, ci);
                }
                if self.is_local(cj) {
                    activate_drift_gpart(self.arena, self.sched, cj);
                }
            }
        } else if ri_max > rj_max {
            if ci_split {
                let progeny = self.arena[ci].progeny;
                for &pk in progeny.iter().flatten() {
                    self.activate_subcell_grav_tasks(pk, Some(cj));
                }
            } else if cj_split {
                let progeny = self.arena[cj].progeny;
                for &pk in progeny.iter().flatten() {
                    self.activate_subcell_grav_tasks(ci, Some(pk));
                }
            } else {
                panic!("fundamental error in the gravity descent logic");
            }
        } else {
            // Ties descend into cj.
            if cj_split {
                let progeny = self.arena[cj].progeny;
                for &pk in progeny.iter().flatten() {
                    self.activate_subcell_grav_tasks(ci, Some(pk));
                }
            } else if ci_split {
                let progeny = self.arena[ci].progeny;
                for &pk in progeny.iter().flatten() {
                    self.activate_subcell_grav_tasks(pk, Some(cj));
                }
            } else {
                panic!("fundamental error in the gravity descent logic");
            }
        }
    }

    /// Traverse a sub-cell external-gravity task. No pairs here: the
    /// field acts on every particle independently.
    pub fn activate_subcell_external_grav_tasks(&self, ci: CellId) {
        if !self.arena[ci].is_active_gravity(self.e.ti_current) {
            return;
        }
        if self.arena[ci].split {
            let progeny = self.arena[ci].progeny;
            for &pj in progeny.iter().flatten() {
                self.activate_subcell_external_grav_tasks(pj);
            }
        } else {
            activate_drift_gpart(self.arena, self.sched, ci);
        }
    }

    /// Un-skip all the hydro tasks associated with a cell. Returns whether
    /// the decomposition must be rebuilt before the next step.
    pub fn unskip_hydro_tasks(&self, c: CellId) -> bool {
        let ti_current = self.e.ti_current;
        let node_id = self.e.node_id;
        let mut rebuild = false;

        for &tid in &self.arena[c].tasks.density {
            let t = self.sched.task(tid);
            let ci = t.ci.expect("density task without a first cell");
            let cj = t.cj;
            let ci_active = self.arena[ci].is_active_hydro(ti_current);
            let cj_active = cj.is_some_and(|cj| self.arena[cj].is_active_hydro(ti_current));

            // Only activate tasks that involve a local active cell.
            if (ci_active && self.is_local(ci)) || (cj_active && cj.is_some_and(|cj| self.is_local(cj)))
            {
                self.sched.activate(tid);

                match t.kind {
                    TaskKind::SelfTask => {
                        if self.is_local(ci) {
                            activate_drift_part(self.arena, self.sched, ci);
                        }
                    }
                    TaskKind::Pair => {
                        let cj = cj.expect("pair task without a second cell");
                        self.activate_pair_level(ci, cj, t.flags as usize);
                    }
                    TaskKind::SubSelf | TaskKind::SubPair => {
                        self.activate_subcell_hydro_tasks(ci, cj);
                    }
                    _ => {}
                }
            }

            // Only pair interactions matter from here on.
            if t.kind != TaskKind::Pair && t.kind != TaskKind::SubPair {
                continue;
            }
            let cj = cj.expect("pair task without a second cell");

            // Too much particle motion, i.e. the cell neighbour
            // conditions were violated?
            if need_rebuild_for_pair(&self.arena[ci], &self.arena[cj]) {
                rebuild = true;
            }

            // Cross-rank pairs activate the matching communication set.
            if !self.is_local(ci) {
                self.activate_hydro_comms(ci, cj, ci_active, cj_active);
            } else if !self.is_local(cj) {
                self.activate_hydro_comms(cj, ci, cj_active, ci_active);
            }
        }

        // Unskip all the other task types anchored here.
        if self.arena[c].node_id == node_id && self.arena[c].is_active_hydro(ti_current) {
            let cell = &self.arena[c];
            for &tid in &cell.tasks.gradient {
                self.sched.activate(tid);
            }
            for &tid in &cell.tasks.force {
                self.sched.activate(tid);
            }

            activate_option(self.sched, cell.tasks.extra_ghost);
            activate_option(self.sched, cell.tasks.ghost_in);
            activate_option(self.sched, cell.tasks.ghost);
            activate_option(self.sched, cell.tasks.ghost_out);
            activate_option(self.sched, cell.tasks.kick1);
            activate_option(self.sched, cell.tasks.kick2);
            activate_option(self.sched, cell.tasks.timestep);
            activate_option(self.sched, cell.tasks.end_force);
            activate_option(self.sched, cell.tasks.cooling);
            activate_option(self.sched, cell.tasks.sourceterms);
        }

        rebuild
    }

    /// Activate the send/recv set of a cross-rank hydro pair. `foreign`
    /// is the remote cell, `local` the one this rank owns.
    fn activate_hydro_comms(&self, foreign: CellId, local: CellId, foreign_active: bool, local_active: bool) {
        let fc = &self.arena[foreign].tasks;
        let lc = &self.arena[local].tasks;
        let foreign_node = self.arena[foreign].node_id;

        // If the local cell is active, receive data from the foreign one.
        if local_active {
            self.sched
                .activate(fc.recv_xv.expect("foreign pair cell without a recv_xv task"));
            if foreign_active {
                self.sched
                    .activate(fc.recv_rho.expect("foreign pair cell without a recv_rho task"));
                #[cfg(feature = "extra-hydro-loop")]
                self.sched.activate(
                    fc.recv_gradient.expect("foreign pair cell without a recv_gradient task"),
                );
            }
        }

        // If the foreign cell is active, we want its end-of-step times.
        if foreign_active {
            self.sched
                .activate(fc.recv_ti.expect("foreign pair cell without a recv_ti task"));
        }

        // Is the foreign cell active and in need of our data?
        if foreign_active {
            self.sched.activate_send(
                lc.send_xv.expect("local pair cell without a send_xv task"),
                foreign_node,
            );

            // Drift the cell that will be sent; the send must observe
            // current positions.
            activate_drift_part(self.arena, self.sched, local);

            if local_active {
                self.sched.activate_send(
                    lc.send_rho.expect("local pair cell without a send_rho task"),
                    foreign_node,
                );
                #[cfg(feature = "extra-hydro-loop")]
                self.sched.activate_send(
                    lc.send_gradient.expect("local pair cell without a send_gradient task"),
                    foreign_node,
                );
            }
        }

        // If the local cell is active, send its end-of-step times.
        if local_active {
            self.sched.activate_send(
                lc.send_ti.expect("local pair cell without a send_ti task"),
                foreign_node,
            );
        }
    }

    /// Un-skip all the gravity tasks associated with a cell. Returns
    /// whether the decomposition must be rebuilt.
    pub fn unskip_gravity_tasks(&self, c: CellId) -> bool {
        let ti_current = self.e.ti_current;
        let node_id = self.e.node_id;
        let rebuild = false;

        for &tid in &self.arena[c].tasks.grav {
            let t = self.sched.task(tid);
            let ci = t.ci.expect("gravity task without a first cell");
            let cj = t.cj;
            let ci_active = self.arena[ci].is_active_gravity(ti_current);
            let cj_active = cj.is_some_and(|cj| self.arena[cj].is_active_gravity(ti_current));

            if (ci_active && self.is_local(ci)) || (cj_active && cj.is_some_and(|cj| self.is_local(cj)))
            {
                self.sched.activate(tid);

                match (t.kind, t.subkind) {
                    (TaskKind::SelfTask, TaskSubkind::ExternalGrav) => {
                        self.activate_subcell_external_grav_tasks(ci);
                    }
                    (TaskKind::SelfTask, TaskSubkind::Grav) => {
                        self.activate_subcell_grav_tasks(ci, None);
                    }
                    (TaskKind::Pair, _) => {
                        self.activate_subcell_grav_tasks(ci, cj);
                    }
                    _ => {}
                }
            }

            if t.kind == TaskKind::Pair {
                let cj = cj.expect("pair task without a second cell");
                if !self.is_local(ci) {
                    self.activate_grav_comms(ci, cj, ci_active, cj_active);
                } else if !self.is_local(cj) {
                    self.activate_grav_comms(cj, ci, cj_active, ci_active);
                }
            }
        }

        // Unskip all the other task types anchored here.
        if self.arena[c].node_id == node_id && self.arena[c].is_active_gravity(ti_current) {
            let cell = &self.arena[c];
            activate_option(self.sched, cell.tasks.init_grav);
            activate_option(self.sched, cell.tasks.grav_ghost_in);
            activate_option(self.sched, cell.tasks.grav_ghost_out);
            activate_option(self.sched, cell.tasks.kick1);
            activate_option(self.sched, cell.tasks.kick2);
            activate_option(self.sched, cell.tasks.timestep);
            activate_option(self.sched, cell.tasks.end_force);
            activate_option(self.sched, cell.tasks.grav_down);
            activate_option(self.sched, cell.tasks.grav_long_range);
        }

        rebuild
    }

    /// Activate the send/recv set of a cross-rank gravity pair.
    fn activate_grav_comms(&self, foreign: CellId, local: CellId, foreign_active: bool, local_active: bool) {
        let fc = &self.arena[foreign].tasks;
        let lc = &self.arena[local].tasks;
        let foreign_node = self.arena[foreign].node_id;

        if local_active {
            self.sched
                .activate(fc.recv_grav.expect("foreign pair cell without a recv_grav task"));
        }
        if foreign_active {
            self.sched
                .activate(fc.recv_ti.expect("foreign pair cell without a recv_ti task"));

            self.sched.activate_send(
                lc.send_grav.expect("local pair cell without a send_grav task"),
                foreign_node,
            );
            // Drift the cell at the level at which it is sent.
            activate_drift_gpart(self.arena, self.sched, local);
        }
        if local_active {
            self.sched.activate_send(
                lc.send_ti.expect("local pair cell without a send_ti task"),
                foreign_node,
            );
        }
    }
}

/// Set the generic super pointers of a hierarchy: the shallowest
/// self-or-ancestor owning any self/pair task.
pub fn set_super(arena: &mut CellArena, c: CellId, super_cell: Option<CellId>) {
    let super_cell = if super_cell.is_none() && arena[c].nr_tasks > 0 {
        Some(c)
    } else {
        super_cell
    };
    arena[c].super_cell = super_cell;

    if arena[c].split {
        let progeny = arena[c].progeny;
        for child in progeny.into_iter().flatten() {
            set_super(arena, child, super_cell);
        }
    }
}

/// Set the hydro super pointers: the shallowest self-or-ancestor owning
/// density tasks.
pub fn set_super_hydro(arena: &mut CellArena, c: CellId, super_hydro: Option<CellId>) {
    let super_hydro = if super_hydro.is_none() && !arena[c].tasks.density.is_empty() {
        Some(c)
    } else {
        super_hydro
    };
    arena[c].super_hydro = super_hydro;

    if arena[c].split {
        let progeny = arena[c].progeny;
        for child in progeny.into_iter().flatten() {
            set_super_hydro(arena, child, super_hydro);
        }
    }
}

/// Set the gravity super pointers: the shallowest self-or-ancestor owning
/// gravity tasks.
pub fn set_super_gravity(arena: &mut CellArena, c: CellId, super_gravity: Option<CellId>) {
    let super_gravity = if super_gravity.is_none() && !arena[c].tasks.grav.is_empty() {
        Some(c)
    } else {
        super_gravity
    };
    arena[c].super_gravity = super_gravity;

    if arena[c].split {
        let progeny = arena[c].progeny;
        for child in progeny.into_iter().flatten() {
            set_super_gravity(arena, child, super_gravity);
        }
    }
}
