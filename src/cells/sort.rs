// src/cells/sort.rs

//! Directional sort caches.
//!
//! A pair interaction walks the particles of both cells in order of their
//! projection onto the axis joining the cells. There are 27 relative
//! orientations of two neighbouring cells; antisymmetry folds them onto 13
//! canonical directions, so each cell caches up to 13 sorted index arrays
//! plus a bitmask of which ones are currently valid.

use std::sync::atomic::Ordering;

use crate::particles::Part;

use super::cell::{CellArena, CellId};

/// Number of canonical sort directions. The 27 stencil directions fold to
/// 13 by antisymmetry.
pub const NR_SORT_DIRECTIONS: usize = 13;

const FRAC_1_SQRT_3: f64 = 0.577_350_269_189_625_8;
const FRAC_1_SQRT_2: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Unit vector of each canonical direction.
pub const SORT_SHIFT: [[f64; 3]; NR_SORT_DIRECTIONS] = [
    [FRAC_1_SQRT_3, FRAC_1_SQRT_3, FRAC_1_SQRT_3],
    [FRAC_1_SQRT_2, FRAC_1_SQRT_2, 0.0],
    [FRAC_1_SQRT_3, FRAC_1_SQRT_3, -FRAC_1_SQRT_3],
    [FRAC_1_SQRT_2, 0.0, FRAC_1_SQRT_2],
    [1.0, 0.0, 0.0],
    [FRAC_1_SQRT_2, 0.0, -FRAC_1_SQRT_2],
    [FRAC_1_SQRT_3, -FRAC_1_SQRT_3, FRAC_1_SQRT_3],
    [FRAC_1_SQRT_2, -FRAC_1_SQRT_2, 0.0],
    [FRAC_1_SQRT_3, -FRAC_1_SQRT_3, -FRAC_1_SQRT_3],
    [0.0, FRAC_1_SQRT_2, FRAC_1_SQRT_2],
    [0.0, 1.0, 0.0],
    [0.0, FRAC_1_SQRT_2, -FRAC_1_SQRT_2],
    [0.0, 0.0, 1.0],
];

/// Folding of the 27 relative orientations onto the canonical directions.
const SORTLIST_ID: [usize; 27] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 0, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0,
];

/// Orientations whose cell pair must be swapped to land on the canonical
/// direction.
const FLIP: [bool; 27] = [
    true, true, true, true, true, true, true, true, true, true, true, true, true, false, false,
    false, false, false, false, false, false, false, false, false, false, false, false,
];

/// One entry of a directional sort array: a window-local particle index
/// and its signed distance along the direction's axis.
#[derive(Clone, Copy, Debug)]
pub struct SortEntry {
    pub d: f32,
    pub i: u32,
}

/// Determine the canonical sort direction of a cell pair.
///
/// Returns the direction id, the periodic shift to apply to `cj`'s
/// coordinates to bring it next to `ci`, and whether the caller must swap
/// the two cells to match the canonical orientation. When the pair is
/// flipped, the returned shift is already negated for the swapped order.
pub fn get_sid(
    dim: [f64; 3],
    periodic: bool,
    ci: &super::cell::Cell,
    cj: &super::cell::Cell,
) -> (usize, [f64; 3], bool) {
    let mut shift = [0.0_f64; 3];
    let mut dx = [0.0_f64; 3];
    for k in 0..3 {
        dx[k] = cj.loc[k] - ci.loc[k];
        if periodic && dx[k] < -dim[k] / 2.0 {
            shift[k] = dim[k];
        } else if periodic && dx[k] > dim[k] / 2.0 {
            shift[k] = -dim[k];
        }
        dx[k] += shift[k];
    }

    let mut raw = 0usize;
    for k in 0..3 {
        raw = 3 * raw
            + if dx[k] < 0.0 {
                0
            } else if dx[k] > 0.0 {
                2
            } else {
                1
            };
    }

    let flipped = FLIP[raw];
    if flipped {
        for s in shift.iter_mut() {
            *s = -*s;
        }
    }
    (SORTLIST_ID[raw], shift, flipped)
}

/// Rebuild the sort arrays of a subtree in every direction named by
/// `flags` (plus any a cell has marked pending on the way down), then
/// publish them in the `sorted` bitmasks.
///
/// The caller must hold the anchor cell's gas-particle lock, or otherwise
/// guarantee exclusive access (the sort task's dependency edges do).
pub fn run_sort(arena: &mut CellArena, c: CellId, parts: &[Part], flags: u16) {
    let wanted = flags | arena[c].do_sort.load(Ordering::Relaxed);

    if arena[c].split {
        let progeny = arena[c].progeny;
        for child in progeny.into_iter().flatten() {
            run_sort(arena, child, parts, wanted);
        }
    }

    let (offset, count) = {
        let cell = &arena[c];
        (cell.parts_offset, cell.count)
    };
    let window = &parts[offset..offset + count];

    for sid in 0..NR_SORT_DIRECTIONS {
        if wanted & (1 << sid) == 0 {
            continue;
        }
        let axis = SORT_SHIFT[sid];
        let mut entries: Vec<SortEntry> = window
            .iter()
            .enumerate()
            .map(|(i, p)| SortEntry {
                d: (p.x[0] * axis[0] + p.x[1] * axis[1] + p.x[2] * axis[2]) as f32,
                i: i as u32,
            })
            .collect();
        entries.sort_unstable_by(|a, b| a.d.total_cmp(&b.d));
        arena[c].sort[sid] = Some(entries.into_boxed_slice());
    }

    let cell = &mut arena[c];
    cell.sorted.fetch_or(wanted, Ordering::Relaxed);
    cell.do_sort.fetch_and(!wanted, Ordering::Relaxed);
}
