// src/cells/pack.rs

//! Flat, pointer-free images of a cell subtree for cross-rank transfer.
//!
//! Three images exist: the full topology image (geometry is re-derived on
//! the receiving side, so only counts, stamps and shape travel), the
//! per-step scalar image, and the multipole snapshot. All three are
//! depth-first sequences whose traversal order is the topology itself, so
//! the two narrow images carry no indices at all.

use crate::engine::Engine;
use crate::gravity::Multipole;
use crate::timeline::IntegerTime;

use super::cell::{Cell, CellArena, CellId};

/// One record of the full topology image. Sibling offsets are indices
/// into the flat sequence, relative to this record; `-1` marks an absent
/// child.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PackedCell {
    pub h_max: f32,
    pub ti_hydro_end_min: IntegerTime,
    pub ti_hydro_end_max: IntegerTime,
    pub ti_gravity_end_min: IntegerTime,
    pub ti_gravity_end_max: IntegerTime,
    pub ti_old_part: IntegerTime,
    pub ti_old_gpart: IntegerTime,
    pub ti_old_multipole: IntegerTime,
    pub count: usize,
    pub gcount: usize,
    pub scount: usize,
    pub tag: u32,
    pub progeny: [i32; 8],
}

/// One record of the per-step scalar image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PackedStepInfo {
    pub ti_hydro_end_min: IntegerTime,
    pub ti_hydro_end_max: IntegerTime,
    pub ti_gravity_end_min: IntegerTime,
    pub ti_gravity_end_max: IntegerTime,
    pub dx_max_part: f32,
    pub dx_max_gpart: f32,
}

/// Pack a subtree into `out`, depth-first. Returns the number of records
/// appended. Fresh communication tags are drawn from the engine and also
/// recorded on the local cells, so the matching send/recv endpoints agree.
pub fn pack(arena: &mut CellArena, c: CellId, e: &Engine, out: &mut Vec<PackedCell>) -> usize {
    let tag = e.next_cell_tag();
    let slot = out.len();
    {
        let cell = &mut arena[c];
        cell.tag = tag;
        let ti_old_multipole = cell.multipole.get_mut().ti_old;
        out.push(PackedCell {
            h_max: cell.h_max,
            ti_hydro_end_min: cell.ti_hydro_end_min,
            ti_hydro_end_max: cell.ti_hydro_end_max,
            ti_gravity_end_min: cell.ti_gravity_end_min,
            ti_gravity_end_max: cell.ti_gravity_end_max,
            ti_old_part: cell.ti_old_part,
            ti_old_gpart: cell.ti_old_gpart,
            ti_old_multipole,
            count: cell.count,
            gcount: cell.gcount,
            scount: cell.scount,
            tag,
            progeny: [-1; 8],
        });
    }

    let progeny = arena[c].progeny;
    let mut packed = 1usize;
    for (k, child) in progeny.into_iter().enumerate() {
        if let Some(child) = child {
            out[slot].progeny[k] = packed as i32;
            packed += pack(arena, child, e, out);
        }
    }

    arena[c].pcell_size = packed as u32;
    packed
}

/// Unpack a subtree image into `c`, allocating progeny from the arena and
/// deriving their geometry from the parent. `pos` is the record index of
/// `c` itself. Returns the number of cells consumed.
pub fn unpack(
    arena: &mut CellArena,
    buf: &[PackedCell],
    pos: usize,
    c: CellId,
    node_id: i32,
) -> usize {
    let pc = &buf[pos];
    {
        let cell = &mut arena[c];
        cell.h_max = pc.h_max;
        cell.ti_hydro_end_min = pc.ti_hydro_end_min;
        cell.ti_hydro_end_max = pc.ti_hydro_end_max;
        cell.ti_gravity_end_min = pc.ti_gravity_end_min;
        cell.ti_gravity_end_max = pc.ti_gravity_end_max;
        cell.ti_old_part = pc.ti_old_part;
        cell.ti_old_gpart = pc.ti_old_gpart;
        cell.multipole.get_mut().ti_old = pc.ti_old_multipole;
        cell.count = pc.count;
        cell.gcount = pc.gcount;
        cell.scount = pc.scount;
        cell.tag = pc.tag;
        cell.node_id = node_id;
    }

    let (loc, width, dmin, depth) = {
        let cell = &arena[c];
        (cell.loc, cell.width, cell.dmin, cell.depth)
    };
    let half = [width[0] / 2.0, width[1] / 2.0, width[2] / 2.0];

    let mut consumed = 1usize;
    for k in 0..8 {
        let child_slot = buf[pos].progeny[k];
        if child_slot < 0 {
            continue;
        }
        let mut child_loc = loc;
        if k & 4 != 0 {
            child_loc[0] += half[0];
        }
        if k & 2 != 0 {
            child_loc[1] += half[1];
        }
        if k & 1 != 0 {
            child_loc[2] += half[2];
        }
        let mut child = Cell::new(child_loc, half, depth + 1, Some(c));
        child.dmin = dmin / 2.0;
        child.node_id = node_id;
        let child_id = arena.insert(child);
        arena[c].progeny[k] = Some(child_id);
        arena[c].split = true;
        consumed += unpack(arena, buf, pos + child_slot as usize, child_id, node_id);
    }

    arena[c].pcell_size = consumed as u32;
    consumed
}

/// Pack the per-step scalars of a subtree, depth-first.
pub fn pack_step_info(arena: &CellArena, c: CellId, out: &mut Vec<PackedStepInfo>) -> usize {
    let cell = &arena[c];
    out.push(PackedStepInfo {
        ti_hydro_end_min: cell.ti_hydro_end_min,
        ti_hydro_end_max: cell.ti_hydro_end_max,
        ti_gravity_end_min: cell.ti_gravity_end_min,
        ti_gravity_end_max: cell.ti_gravity_end_max,
        dx_max_part: cell.dx_max_part,
        dx_max_gpart: cell.dx_max_gpart,
    });

    let mut packed = 1usize;
    for &child in cell.progeny.iter().flatten() {
        packed += pack_step_info(arena, child, out);
    }
    packed
}

/// Unpack per-step scalars onto an existing subtree whose topology matches
/// the sender's.
pub fn unpack_step_info(arena: &mut CellArena, buf: &[PackedStepInfo], pos: usize, c: CellId) -> usize {
    {
        let pc = &buf[pos];
        let cell = &mut arena[c];
        cell.ti_hydro_end_min = pc.ti_hydro_end_min;
        cell.ti_hydro_end_max = pc.ti_hydro_end_max;
        cell.ti_gravity_end_min = pc.ti_gravity_end_min;
        cell.ti_gravity_end_max = pc.ti_gravity_end_max;
        cell.dx_max_part = pc.dx_max_part;
        cell.dx_max_gpart = pc.dx_max_gpart;
    }

    let progeny = arena[c].progeny;
    let mut consumed = 1usize;
    for child in progeny.into_iter().flatten() {
        consumed += unpack_step_info(arena, buf, pos + consumed, child);
    }
    consumed
}

/// Snapshot the multipoles of a subtree, depth-first.
pub fn pack_multipoles(arena: &mut CellArena, c: CellId, out: &mut Vec<Multipole>) -> usize {
    out.push(arena[c].multipole.get_mut().m);

    let progeny = arena[c].progeny;
    let mut packed = 1usize;
    for child in progeny.into_iter().flatten() {
        packed += pack_multipoles(arena, child, out);
    }
    packed
}

/// Write a multipole snapshot onto an existing subtree whose topology
/// matches the sender's.
pub fn unpack_multipoles(arena: &mut CellArena, buf: &[Multipole], pos: usize, c: CellId) -> usize {
    arena[c].multipole.get_mut().m = buf[pos];

    let progeny = arena[c].progeny;
    let mut consumed = 1usize;
    for child in progeny.into_iter().flatten() {
        consumed += unpack_multipoles(arena, buf, pos + consumed, child);
    }
    consumed
}
