// src/cells/multipoles.rs

//! Bottom-up construction of the cell multipoles.

use crate::gravity::{m2m, multipole_equal, Multipole};
use crate::particles::GPart;
use crate::timeline::IntegerTime;

use super::cell::{CellArena, CellId};

/// Largest distance from `com` to any corner of the box at `loc` with the
/// given widths.
fn max_corner_distance(loc: [f64; 3], width: [f64; 3], com: [f64; 3]) -> f64 {
    let mut d2 = 0.0;
    for k in 0..3 {
        let d = if com[k] > loc[k] + width[k] / 2.0 {
            com[k] - loc[k]
        } else {
            loc[k] + width[k] - com[k]
        };
        d2 += d * d;
    }
    d2.sqrt()
}

/// Recursively construct the multipoles of a subtree, consistent with its
/// particles, and stamp them with `ti_current`.
pub fn make_multipoles(arena: &mut CellArena, gparts: &[GPart], c: CellId, ti_current: IntegerTime) {
    let (split, loc, width) = {
        let cell = &arena[c];
        (cell.split, cell.loc, cell.width)
    };

    if split {
        // Children first.
        let progeny = arena[c].progeny;
        for child in progeny.into_iter().flatten() {
            make_multipoles(arena, gparts, child, ti_current);
        }

        // Collect the freshly built child expansions.
        let mut children: Vec<Multipole> = Vec::with_capacity(8);
        for child in progeny.into_iter().flatten() {
            children.push(arena[child].multipole.get_mut().m);
        }

        // Mass-weighted centre and bulk velocity of the progeny.
        let mut mass = 0.0_f64;
        let mut com = [0.0_f64; 3];
        let mut vel = [0.0_f64; 3];
        for m in &children {
            let child_mass = m.moments.m_000 as f64;
            mass += child_mass;
            for k in 0..3 {
                com[k] += m.com[k] * child_mass;
                vel[k] += m.vel[k] as f64 * child_mass;
            }
        }
        let state = arena[c].multipole.get_mut();
        state.m.reset();

        if mass > 0.0 {
            for k in 0..3 {
                com[k] /= mass;
                vel[k] /= mass;
            }

            // Shift the progeny expansions onto the new centre and sum
            // them, tracking the child-derived radius bound as we go.
            let mut r_max = 0.0_f64;
            for m in &children {
                if m.moments.m_000 == 0.0 {
                    continue;
                }
                state.m.moments.add(&m2m(&m.moments, com, m.com));

                let dx = com[0] - m.com[0];
                let dy = com[1] - m.com[1];
                let dz = com[2] - m.com[2];
                r_max = r_max.max(m.r_max + (dx * dx + dy * dy + dz * dz).sqrt());
            }

            state.m.com = com;
            state.m.vel = [vel[0] as f32, vel[1] as f32, vel[2] as f32];
            // Keep the smaller of the two upper bounds on the
            // CoM-to-particle distance.
            state.m.r_max = r_max.min(max_corner_distance(loc, width, com));
        } else {
            state.m.com = [
                loc[0] + width[0] / 2.0,
                loc[1] + width[1] / 2.0,
                loc[2] + width[2] / 2.0,
            ];
            state.m.r_max = 0.0;
        }
    } else {
        let (offset, gcount) = {
            let cell = &arena[c];
            (cell.gparts_offset, cell.gcount)
        };
        let state = arena[c].multipole.get_mut();
        state.m.reset();

        if gcount > 0 {
            state.m.p2m(&gparts[offset..offset + gcount]);
            state.m.r_max = max_corner_distance(loc, width, state.m.com);
        } else {
            state.m.com = [
                loc[0] + width[0] / 2.0,
                loc[1] + width[1] / 2.0,
                loc[2] + width[2] / 2.0,
            ];
            state.m.r_max = 0.0;
        }
    }

    arena[c].multipole.get_mut().ti_old = ti_current;
}

/// Compare the recursively built multipole of every cell against a direct
/// construction from its particle window. Aborts on disagreement beyond
/// the relative tolerance, on a radius bound that fails to majorise the
/// direct one, and on a bound exceeding the cell diagonal.
pub fn check_multipole(arena: &mut CellArena, gparts: &[GPart], c: CellId) {
    const TOLERANCE: f32 = 1e-3;

    if arena[c].split {
        let progeny = arena[c].progeny;
        for child in progeny.into_iter().flatten() {
            check_multipole(arena, gparts, child);
        }
    }

    let (offset, gcount, width, depth) = {
        let cell = &arena[c];
        (cell.gparts_offset, cell.gcount, cell.width, cell.depth)
    };
    if gcount == 0 {
        return;
    }

    let mut direct = Multipole::default();
    direct.p2m(&gparts[offset..offset + gcount]);

    let built = arena[c].multipole.get_mut().m;
    assert!(
        multipole_equal(&direct, &built, TOLERANCE),
        "multipoles are not equal at depth {} (tol {})",
        depth,
        TOLERANCE
    );
    assert!(
        built.r_max >= direct.r_max,
        "upper limit r_max {:e} too small at depth {} (should be >= {:e})",
        built.r_max,
        depth,
        direct.r_max
    );
    assert!(
        built.r_max * built.r_max <= 3.0 * width[0] * width[0],
        "r_max {:e} larger than the cell diagonal {:e} at depth {}",
        built.r_max,
        (3.0 * width[0] * width[0]).sqrt(),
        depth
    );
}
