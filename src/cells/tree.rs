// src/cells/tree.rs

//! Tree construction primitives: counting, window linking, in-place
//! subdivision and smoothing-length sanitisation.

use crate::hydro;
use crate::particles::{
    relink_gparts_to_parts, relink_gparts_to_sparts, relink_parts_to_gparts,
    relink_sparts_to_gparts, GPart, Part, SPart, XPart,
};
use crate::utils::{KERNEL_GAMMA, SANITIZE_MAX_COUNT};

use super::cell::{Cell, CellArena, CellId};

/// Count the cells of a subtree, this one included.
pub fn subtree_size(arena: &CellArena, c: CellId) -> usize {
    let cell = &arena[c];
    let mut count = 1;
    if cell.split {
        for &child in cell.progeny.iter().flatten() {
            count += subtree_size(arena, child);
        }
    }
    count
}

/// Assign the gas-particle windows of a subtree, depth-first, starting at
/// `base`. Returns the number of particles linked.
pub fn link_parts(arena: &mut CellArena, c: CellId, base: usize) -> usize {
    arena[c].parts_offset = base;
    if arena[c].split {
        let progeny = arena[c].progeny;
        let mut offset = 0;
        for child in progeny.into_iter().flatten() {
            offset += link_parts(arena, child, base + offset);
        }
    }
    arena[c].count
}

/// Assign the gravity-particle windows of a subtree, depth-first.
pub fn link_gparts(arena: &mut CellArena, c: CellId, base: usize) -> usize {
    arena[c].gparts_offset = base;
    if arena[c].split {
        let progeny = arena[c].progeny;
        let mut offset = 0;
        for child in progeny.into_iter().flatten() {
            offset += link_gparts(arena, child, base + offset);
        }
    }
    arena[c].gcount
}

/// Assign the star-particle windows of a subtree, depth-first.
pub fn link_sparts(arena: &mut CellArena, c: CellId, base: usize) -> usize {
    arena[c].sparts_offset = base;
    if arena[c].split {
        let progeny = arena[c].progeny;
        let mut offset = 0;
        for child in progeny.into_iter().flatten() {
            offset += link_sparts(arena, child, base + offset);
        }
    }
    arena[c].scount
}

/// 3-bit octant key of a position against the pivot.
///
/// Gas particles bin with `>=`; gravity and star particles bin with a
/// strict `>`. The asymmetry is load-bearing for particles sitting
/// exactly on a pivot plane and must not be normalised.
#[inline]
fn octant_ge(x: &[f64; 3], pivot: &[f64; 3]) -> u8 {
    (((x[0] >= pivot[0]) as u8) << 2)
        | (((x[1] >= pivot[1]) as u8) << 1)
        | ((x[2] >= pivot[2]) as u8)
}

#[inline]
fn octant_gt(x: &[f64; 3], pivot: &[f64; 3]) -> u8 {
    (((x[0] > pivot[0]) as u8) << 2)
        | (((x[1] > pivot[1]) as u8) << 1)
        | ((x[2] > pivot[2]) as u8)
}

/// Permute a window into eight contiguous octant buckets, in place, by
/// chasing displacement cycles. `aux` (when present) is carried through
/// the identical permutation; `bids` holds each slot's target bucket and
/// is permuted in lockstep so classification stays O(n).
///
/// Returns the per-bucket counts and the nine bucket boundaries.
fn octant_permute<T: Copy, A: Copy>(
    items: &mut [T],
    mut aux: Option<&mut [A]>,
    bids: &mut [u8],
) -> ([usize; 8], [usize; 9]) {
    let mut count = [0usize; 8];
    for &b in bids.iter() {
        count[b as usize] += 1;
    }
    let mut offset = [0usize; 9];
    for k in 1..=8 {
        offset[k] = offset[k - 1] + count[k - 1];
    }

    // Settled entries per bucket; doubles as the cursor to the next free
    // slot of each bucket while cycles are chased.
    let mut settled = [0usize; 8];

    for bucket in 0..8 {
        let mut k = offset[bucket] + settled[bucket];
        while k < offset[bucket + 1] {
            let mut bid = bids[k] as usize;
            if bid != bucket {
                let mut item = items[k];
                let mut carried_aux = aux.as_deref_mut().map(|a| a[k]);
                let mut carried_bid = bids[k];

                while bid != bucket {
                    let mut j = offset[bid] + settled[bid];
                    settled[bid] += 1;
                    while bids[j] as usize == bid {
                        j += 1;
                        settled[bid] += 1;
                    }
                    std::mem::swap(&mut items[j], &mut item);
                    if let Some(a) = aux.as_deref_mut() {
                        let held = carried_aux.take().expect("aux lost mid-cycle");
                        carried_aux = Some(std::mem::replace(&mut a[j], held));
                    }
                    std::mem::swap(&mut bids[j], &mut carried_bid);
                    bid = carried_bid as usize;
                }
                items[k] = item;
                if let Some(a) = aux.as_deref_mut() {
                    a[k] = carried_aux.take().expect("aux lost at deposit");
                }
                bids[k] = carried_bid;
            }
            settled[bids[k] as usize] += 1;
            k += 1;
        }
    }

    (count, offset)
}

/// Subdivide a cell: allocate its eight progeny, partition all three
/// particle windows into octants in place, and re-derive the cross-species
/// links from the new layout.
///
/// Empty octants still get a child with an empty window at the
/// pivot-derived location.
pub fn split_cell(
    arena: &mut CellArena,
    c: CellId,
    parts: &mut [Part],
    xparts: &mut [XPart],
    gparts: &mut [GPart],
    sparts: &mut [SPart],
) {
    let (loc, width, depth, node_id, pivot) = {
        let cell = &arena[c];
        (cell.loc, cell.width, cell.depth, cell.node_id, cell.center())
    };

    // Allocate the progeny on the pivot-derived grid.
    let half = [width[0] / 2.0, width[1] / 2.0, width[2] / 2.0];
    let mut progeny = [None; 8];
    for (k, slot) in progeny.iter_mut().enumerate() {
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
        child.dmin = arena[c].dmin / 2.0;
        child.node_id = node_id;
        *slot = Some(arena.insert(child));
    }
    {
        let cell = &mut arena[c];
        cell.progeny = progeny;
        cell.split = true;
    }

    let (p_off, count) = (arena[c].parts_offset, arena[c].count);
    let (g_off, gcount) = (arena[c].gparts_offset, arena[c].gcount);
    let (s_off, scount) = (arena[c].sparts_offset, arena[c].scount);

    // Gas particles, with the extended state carried through the same
    // permutation.
    let mut bids: Vec<u8> = parts[p_off..p_off + count]
        .iter()
        .map(|p| octant_ge(&p.x, &pivot))
        .collect();
    let (bucket_count, bucket_offset) = octant_permute(
        &mut parts[p_off..p_off + count],
        Some(&mut xparts[p_off..p_off + count]),
        &mut bids,
    );
    for k in 0..8 {
        let child = &mut arena[progeny[k].unwrap()];
        child.count = bucket_count[k];
        child.parts_offset = p_off + bucket_offset[k];
    }
    if count > 0 && gcount > 0 {
        relink_gparts_to_parts(&parts[p_off..p_off + count], p_off, gparts);
    }

    #[cfg(debug_assertions)]
    check_part_octants(arena, c, parts, &pivot);

    // Star particles.
    let mut sbids: Vec<u8> = sparts[s_off..s_off + scount]
        .iter()
        .map(|sp| octant_gt(&sp.x, &pivot))
        .collect();
    let (s_count, s_offset) =
        octant_permute::<SPart, XPart>(&mut sparts[s_off..s_off + scount], None, &mut sbids);
    for k in 0..8 {
        let child = &mut arena[progeny[k].unwrap()];
        child.scount = s_count[k];
        child.sparts_offset = s_off + s_offset[k];
    }
    if scount > 0 && gcount > 0 {
        relink_gparts_to_sparts(&sparts[s_off..s_off + scount], s_off, gparts);
    }

    // Gravity particles last, so both link directions settle.
    let mut gbids: Vec<u8> = gparts[g_off..g_off + gcount]
        .iter()
        .map(|gp| octant_gt(&gp.x, &pivot))
        .collect();
    let (g_count, g_offset) =
        octant_permute::<GPart, XPart>(&mut gparts[g_off..g_off + gcount], None, &mut gbids);
    for k in 0..8 {
        let child = &mut arena[progeny[k].unwrap()];
        child.gcount = g_count[k];
        child.gparts_offset = g_off + g_offset[k];
    }
    if count > 0 && gcount > 0 {
        relink_parts_to_gparts(&gparts[g_off..g_off + gcount], g_off, parts);
    }
    if scount > 0 && gcount > 0 {
        relink_sparts_to_gparts(&gparts[g_off..g_off + gcount], g_off, sparts);
    }
}

/// Verify the gas windows of freshly split progeny: contiguity, edge
/// alignment, and octant membership of every particle.
#[cfg(debug_assertions)]
fn check_part_octants(arena: &CellArena, c: CellId, parts: &[Part], pivot: &[f64; 3]) {
    let cell = &arena[c];
    let mut expected = cell.parts_offset;
    for (k, &child) in cell.progeny.iter().enumerate() {
        let child = &arena[child.expect("split cell with missing progeny")];
        assert_eq!(
            child.parts_offset, expected,
            "particle sorting failed (window {} not contiguous, depth {})",
            k, cell.depth
        );
        for p in &parts[child.parts_offset..child.parts_offset + child.count] {
            assert_eq!(
                octant_ge(&p.x, pivot) as usize,
                k,
                "particle assigned to wrong octant (depth {})",
                cell.depth
            );
        }
        expected += child.count;
    }
    assert_eq!(
        expected,
        cell.parts_offset + cell.count,
        "particle sorting failed (right edge, depth {})",
        cell.depth
    );
}

/// Clamp absurd smoothing lengths ahead of the first density pass.
///
/// Cells with fewer than [`SANITIZE_MAX_COUNT`] particles whose subtree
/// has not been treated yet clamp `h == 0` and oversized values to the
/// cell-derived upper bound; `h_max` is then recomputed bottom-up.
pub fn sanitize(arena: &mut CellArena, parts: &mut [Part], c: CellId, treated: bool) {
    let (offset, count, dmin, split) = {
        let cell = &arena[c];
        (cell.parts_offset, cell.count, cell.dmin, cell.split)
    };

    if count < SANITIZE_MAX_COUNT && !treated {
        let upper_h_max = dmin as f32 / (1.2 * KERNEL_GAMMA);
        for p in &mut parts[offset..offset + count] {
            if p.h == 0.0 || p.h > upper_h_max {
                p.h = upper_h_max;
            }
        }
    }

    let mut h_max = 0.0_f32;
    if split {
        let progeny = arena[c].progeny;
        for child in progeny.into_iter().flatten() {
            sanitize(arena, parts, child, count < SANITIZE_MAX_COUNT);
            h_max = h_max.max(arena[child].h_max);
        }
    } else {
        for p in &parts[offset..offset + count] {
            h_max = h_max.max(p.h);
        }
    }

    arena[c].h_max = h_max;
}

/// Convert the hydro quantities of a cell's window to a valid state after
/// the initial density calculation.
pub fn convert_hydro(arena: &CellArena, parts: &mut [Part], xparts: &[XPart], c: CellId) {
    let cell = &arena[c];
    for i in cell.parts_offset..cell.parts_offset + cell.count {
        hydro::convert_quantities(&mut parts[i], &xparts[i]);
    }
}

/// Recursively check that every particle of a local leaf has been
/// assigned a time-step, and every cell with tasks an end time.
pub fn check_timesteps(arena: &CellArena, parts: &[Part], c: CellId, node_id: i32) {
    let cell = &arena[c];
    assert!(
        !(cell.ti_hydro_end_min == 0 && cell.ti_gravity_end_min == 0 && cell.nr_tasks > 0),
        "cell without assigned time-step (depth {})",
        cell.depth
    );

    if cell.split {
        for &child in cell.progeny.iter().flatten() {
            check_timesteps(arena, parts, child, node_id);
        }
    } else if cell.node_id == node_id {
        for p in &parts[cell.parts_offset..cell.parts_offset + cell.count] {
            assert!(p.time_bin != 0, "particle without assigned time-bin");
        }
    }
}
