// src/cells/cell.rs

//! The cell: one node of the oct-tree.
//!
//! Cells are arena-allocated; all parent/progeny references are 32-bit
//! indices into the arena, so the parent ⇄ progeny cycle never turns into
//! an ownership cycle. A cell owns no particles, only windows (offset and
//! count) into the arrays held by the [`Space`](crate::space::Space).

use std::cell::UnsafeCell;
use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use crate::gravity::Multipole;
use crate::scheduler::TaskId;
use crate::timeline::IntegerTime;
use crate::utils::AtomicF32;

use super::lock::{CellLock, LockKind};
use super::sort::{SortEntry, NR_SORT_DIRECTIONS};

/// Index of a cell inside its arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellId(pub u32);

/// A cell's multipole expansion together with its drift stamp. The stamp
/// travels with the expansion because both are read and advanced under the
/// same lock during gravity activation.
#[derive(Clone, Copy, Debug, Default)]
pub struct MultipoleState {
    pub m: Multipole,
    /// Time of the last multipole drift.
    pub ti_old: IntegerTime,
}

/// A cell's multipole, mutable through a shared reference while the
/// cell's multipole lock is held.
///
/// Gravity activation drifts expansions from several workers at once; each
/// drift happens inside [`MultipoleSlot::with_locked`], which serialises
/// the writers on the cell's multipole try-lock.
#[derive(Debug, Default)]
pub struct MultipoleSlot {
    inner: UnsafeCell<MultipoleState>,
}

// The lock discipline in `with_locked` is what makes this sound; the slot
// itself is just storage.
unsafe impl Sync for MultipoleSlot {}

impl MultipoleSlot {
    pub fn new(state: MultipoleState) -> Self {
        MultipoleSlot { inner: UnsafeCell::new(state) }
    }

    /// Exclusive access through an exclusive cell reference.
    #[inline]
    pub fn get_mut(&mut self) -> &mut MultipoleState {
        self.inner.get_mut()
    }

    /// Run `f` on the multipole while holding the given lock.
    pub fn with_locked<R>(&self, lock: &CellLock, f: impl FnOnce(&mut MultipoleState) -> R) -> R {
        lock.lock_spin();
        // Sole writer: every mutation of the slot goes through this lock.
        let result = f(unsafe { &mut *self.inner.get() });
        lock.unlock();
        result
    }
}

/// Per-phase lists of interaction tasks and the direct per-cell task
/// handles the activation pass reaches for.
#[derive(Debug, Default)]
pub struct CellTasks {
    /// Density-phase interaction tasks touching this cell.
    pub density: Vec<TaskId>,
    /// Gradient-phase interaction tasks touching this cell.
    pub gradient: Vec<TaskId>,
    /// Force-phase interaction tasks touching this cell.
    pub force: Vec<TaskId>,
    /// Gravity interaction tasks touching this cell.
    pub grav: Vec<TaskId>,

    pub sorts: Option<TaskId>,
    pub drift_part: Option<TaskId>,
    pub drift_gpart: Option<TaskId>,
    pub ghost_in: Option<TaskId>,
    pub ghost: Option<TaskId>,
    pub ghost_out: Option<TaskId>,
    pub extra_ghost: Option<TaskId>,
    pub kick1: Option<TaskId>,
    pub kick2: Option<TaskId>,
    pub timestep: Option<TaskId>,
    pub end_force: Option<TaskId>,
    pub cooling: Option<TaskId>,
    pub sourceterms: Option<TaskId>,
    pub init_grav: Option<TaskId>,
    pub grav_ghost_in: Option<TaskId>,
    pub grav_ghost_out: Option<TaskId>,
    pub grav_down: Option<TaskId>,
    pub grav_long_range: Option<TaskId>,

    pub send_xv: Option<TaskId>,
    pub send_rho: Option<TaskId>,
    pub send_gradient: Option<TaskId>,
    pub send_grav: Option<TaskId>,
    pub send_ti: Option<TaskId>,
    pub recv_xv: Option<TaskId>,
    pub recv_rho: Option<TaskId>,
    pub recv_gradient: Option<TaskId>,
    pub recv_grav: Option<TaskId>,
    pub recv_ti: Option<TaskId>,
}

impl CellTasks {
    /// Drop the per-phase interaction lists ahead of task reconstruction.
    pub fn clean_links(&mut self) {
        self.density.clear();
        self.gradient.clear();
        self.force.clear();
        self.grav.clear();
    }
}

/// A node of the oct-tree.
pub struct Cell {
    // Geometry.
    /// Origin corner.
    pub loc: [f64; 3],
    /// Side lengths.
    pub width: [f64; 3],
    /// Lower bound on half the side length, over this cell and its parents.
    pub dmin: f64,
    pub depth: u8,
    pub split: bool,
    pub parent: Option<CellId>,
    pub progeny: [Option<CellId>; 8],

    // Particle windows into the space arrays.
    pub parts_offset: usize,
    pub count: usize,
    pub gparts_offset: usize,
    pub gcount: usize,
    pub sparts_offset: usize,
    pub scount: usize,

    // Temporal state. The multipole's drift stamp lives inside the
    // multipole slot, under the multipole lock.
    pub ti_old_part: IntegerTime,
    pub ti_old_gpart: IntegerTime,
    pub ti_hydro_end_min: IntegerTime,
    pub ti_hydro_end_max: IntegerTime,
    pub ti_gravity_end_min: IntegerTime,
    pub ti_gravity_end_max: IntegerTime,

    // Motion bounds.
    pub h_max: f32,
    pub dx_max_part: f32,
    pub dx_max_gpart: f32,
    pub dx_max_sort: f32,
    /// Snapshot of `dx_max_sort` taken when a pair task is activated.
    pub dx_max_sort_old: AtomicF32,
    /// Snapshot of `dx_max_part` taken when a pair task is activated.
    pub dx_max_part_old: AtomicF32,

    // Locks, one per independent resource.
    pub part_lock: CellLock,
    pub gpart_lock: CellLock,
    pub spart_lock: CellLock,
    pub multipole_lock: CellLock,

    // Sorting cache.
    pub sort: [Option<Box<[SortEntry]>>; NR_SORT_DIRECTIONS],
    /// Directions with currently valid sort arrays.
    pub sorted: AtomicU16,
    /// Directions some activated pair interaction needs this step.
    pub requires_sorts: AtomicU16,
    /// Directions the sort task must (re)build.
    pub do_sort: AtomicU16,

    // Scheduling hooks.
    pub tasks: CellTasks,
    /// Number of self/pair tasks anchored at this cell.
    pub nr_tasks: u32,

    // Super pointers: shallowest self-or-ancestor owning tasks of a class.
    pub super_cell: Option<CellId>,
    pub super_hydro: Option<CellId>,
    pub super_gravity: Option<CellId>,

    // Activation flags.
    pub do_drift: AtomicBool,
    pub do_sub_drift: AtomicBool,
    pub do_grav_drift: AtomicBool,
    pub do_grav_sub_drift: AtomicBool,
    pub do_sub_sort: AtomicBool,

    /// Rank that owns this cell.
    pub node_id: i32,
    /// Per-step communication tag.
    pub tag: u32,
    /// Number of packed records this subtree produced in the last `pack`.
    pub pcell_size: u32,

    pub multipole: MultipoleSlot,
}

impl Cell {
    /// A fresh cell with the given geometry and no content.
    pub fn new(loc: [f64; 3], width: [f64; 3], depth: u8, parent: Option<CellId>) -> Self {
        let dmin = width[0].min(width[1]).min(width[2]);
        Cell {
            loc,
            width,
            dmin,
            depth,
            split: false,
            parent,
            progeny: [None; 8],
            parts_offset: 0,
            count: 0,
            gparts_offset: 0,
            gcount: 0,
            sparts_offset: 0,
            scount: 0,
            ti_old_part: 0,
            ti_old_gpart: 0,
            ti_hydro_end_min: 0,
            ti_hydro_end_max: 0,
            ti_gravity_end_min: 0,
            ti_gravity_end_max: 0,
            h_max: 0.0,
            dx_max_part: 0.0,
            dx_max_gpart: 0.0,
            dx_max_sort: 0.0,
            dx_max_sort_old: AtomicF32::default(),
            dx_max_part_old: AtomicF32::default(),
            part_lock: CellLock::default(),
            gpart_lock: CellLock::default(),
            spart_lock: CellLock::default(),
            multipole_lock: CellLock::default(),
            sort: Default::default(),
            sorted: AtomicU16::new(0),
            requires_sorts: AtomicU16::new(0),
            do_sort: AtomicU16::new(0),
            tasks: CellTasks::default(),
            nr_tasks: 0,
            super_cell: None,
            super_hydro: None,
            super_gravity: None,
            do_drift: AtomicBool::new(false),
            do_sub_drift: AtomicBool::new(false),
            do_grav_drift: AtomicBool::new(false),
            do_grav_sub_drift: AtomicBool::new(false),
            do_sub_sort: AtomicBool::new(false),
            node_id: 0,
            tag: 0,
            pcell_size: 0,
            multipole: MultipoleSlot::default(),
        }
    }

    /// Geometric centre, the pivot used by subdivision.
    #[inline]
    pub fn center(&self) -> [f64; 3] {
        [
            self.loc[0] + self.width[0] / 2.0,
            self.loc[1] + self.width[1] / 2.0,
            self.loc[2] + self.width[2] / 2.0,
        ]
    }

    #[inline]
    pub fn lock(&self, kind: LockKind) -> &CellLock {
        match kind {
            LockKind::Part => &self.part_lock,
            LockKind::GPart => &self.gpart_lock,
            LockKind::SPart => &self.spart_lock,
            LockKind::Multipole => &self.multipole_lock,
        }
    }

    /// Does this cell hold a gas particle waking at `ti_current`?
    #[inline]
    pub fn is_active_hydro(&self, ti_current: IntegerTime) -> bool {
        self.ti_hydro_end_min == ti_current
    }

    /// Does this cell hold a gravity particle waking at `ti_current`?
    #[inline]
    pub fn is_active_gravity(&self, ti_current: IntegerTime) -> bool {
        self.ti_gravity_end_min == ti_current
    }

    /// Clear all four drift flags.
    pub fn clear_drift_flags(&self) {
        self.do_drift.store(false, Ordering::Relaxed);
        self.do_sub_drift.store(false, Ordering::Relaxed);
        self.do_grav_drift.store(false, Ordering::Relaxed);
        self.do_grav_sub_drift.store(false, Ordering::Relaxed);
    }

    /// Drop every cached sort array.
    pub fn clean_sorts(&mut self) {
        for slot in self.sort.iter_mut() {
            *slot = None;
        }
        self.sorted.store(0, Ordering::Relaxed);
    }
}

/// The arena every cell lives in. Freed subtrees go onto a free list and
/// are handed out again at the next rebuild.
#[derive(Default)]
pub struct CellArena {
    cells: Vec<Option<Cell>>,
    free: Vec<CellId>,
}

impl CellArena {
    pub fn new() -> Self {
        CellArena::default()
    }

    /// Number of live cells.
    pub fn len(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Place a cell, reusing a recycled slot when one is free.
    pub fn insert(&mut self, cell: Cell) -> CellId {
        if let Some(id) = self.free.pop() {
            self.cells[id.0 as usize] = Some(cell);
            id
        } else {
            let id = CellId(self.cells.len() as u32);
            self.cells.push(Some(cell));
            id
        }
    }

    /// Return a whole subtree to the pool.
    pub fn recycle(&mut self, id: CellId) {
        let progeny = self[id].progeny;
        for child in progeny.into_iter().flatten() {
            self.recycle(child);
        }
        self.cells[id.0 as usize] = None;
        self.free.push(id);
    }
}

impl Index<CellId> for CellArena {
    type Output = Cell;

    #[inline]
    fn index(&self, id: CellId) -> &Cell {
        self.cells[id.0 as usize]
            .as_ref()
            .unwrap_or_else(|| panic!("cell {} has been recycled", id.0))
    }
}

impl IndexMut<CellId> for CellArena {
    #[inline]
    fn index_mut(&mut self, id: CellId) -> &mut Cell {
        self.cells[id.0 as usize]
            .as_mut()
            .unwrap_or_else(|| panic!("cell {} has been recycled", id.0))
    }
}

/// Does this cell or any of its children have any task? The
/// timestep-related tasks are used as the probe, since they exist in any
/// hierarchy that has tasks at all.
pub fn has_tasks(arena: &CellArena, c: CellId) -> bool {
    let cell = &arena[c];
    if cell.tasks.timestep.is_some() || cell.tasks.recv_ti.is_some() {
        return true;
    }
    if cell.split {
        cell.progeny
            .iter()
            .flatten()
            .any(|&child| has_tasks(arena, child))
    } else {
        false
    }
}
