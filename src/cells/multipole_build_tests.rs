use approx::assert_relative_eq;

use crate::cells::*;
use crate::gravity::Multipole;
use crate::particles::{GPart, Part, SPart, XPart};

fn scattered_gparts(n: usize) -> Vec<GPart> {
    // Deterministic pseudo-random scatter over the unit cell.
    let mut state = 0x9e3779b97f4a7c15_u64;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state >> 11) as f64 / (1_u64 << 53) as f64
    };
    (0..n)
        .map(|i| {
            let x = [next(), next(), next()];
            let v = [next() as f32 - 0.5, next() as f32 - 0.5, next() as f32 - 0.5];
            GPart::new_dark_matter(x, v, 0.5 + (i % 3) as f32, i as u64)
        })
        .collect()
}

fn built_tree(n: usize) -> (CellArena, CellId, Vec<GPart>) {
    let mut gparts = scattered_gparts(n);
    let mut parts: Vec<Part> = Vec::new();
    let mut xparts: Vec<XPart> = Vec::new();
    let mut sparts: Vec<SPart> = Vec::new();

    let mut arena = CellArena::new();
    let mut root = Cell::new([0.0; 3], [1.0; 3], 0, None);
    root.gcount = n;
    let root = arena.insert(root);
    split_cell(&mut arena, root, &mut parts, &mut xparts, &mut gparts, &mut sparts);

    // One more level under the fullest child, to get depth into the test.
    let fullest = (0..8)
        .map(|k| arena[root].progeny[k].unwrap())
        .max_by_key(|&c| arena[c].gcount)
        .unwrap();
    split_cell(&mut arena, fullest, &mut parts, &mut xparts, &mut gparts, &mut sparts);

    (arena, root, gparts)
}

#[test]
fn test_recursive_build_matches_direct_p2m() {
    let (mut arena, root, gparts) = built_tree(64);

    make_multipoles(&mut arena, &gparts, root, 4);

    let mut direct = Multipole::default();
    direct.p2m(&gparts);

    let built = arena[root].multipole.get_mut().m;
    assert_relative_eq!(built.moments.m_000 as f64, direct.moments.m_000 as f64, max_relative = 1e-5);
    for k in 0..3 {
        assert_relative_eq!(built.com[k], direct.com[k], epsilon = 1e-9);
    }
    assert_eq!(arena[root].multipole.get_mut().ti_old, 4);
}

#[test]
fn test_build_passes_consistency_check() {
    let (mut arena, root, gparts) = built_tree(64);
    make_multipoles(&mut arena, &gparts, root, 4);

    // The debug verification walks the whole tree and aborts on any
    // disagreement or radius-bound violation.
    check_multipole(&mut arena, &gparts, root);
}

#[test]
fn test_r_max_majorises_particles_and_fits_diagonal() {
    let (mut arena, root, gparts) = built_tree(64);
    make_multipoles(&mut arena, &gparts, root, 4);

    let mut stack = vec![root];
    while let Some(c) = stack.pop() {
        let (offset, gcount, width) = {
            let cell = &arena[c];
            (cell.gparts_offset, cell.gcount, cell.width[0])
        };
        if gcount > 0 {
            let m = arena[c].multipole.get_mut().m;
            let mut direct = Multipole::default();
            direct.p2m(&gparts[offset..offset + gcount]);

            assert!(m.r_max >= direct.r_max);
            assert!(m.r_max * m.r_max <= 3.0 * width * width);
        }
        for &child in arena[c].progeny.iter().flatten() {
            stack.push(child);
        }
    }
}

#[test]
fn test_empty_leaf_gets_zero_expansion() {
    let mut arena = CellArena::new();
    let c = arena.insert(Cell::new([0.25, 0.0, 0.0], [0.25; 3], 2, None));
    let gparts: Vec<GPart> = Vec::new();

    make_multipoles(&mut arena, &gparts, c, 4);

    let state = arena[c].multipole.get_mut();
    assert_eq!(state.m.moments.m_000, 0.0);
    assert_eq!(state.m.com, [0.375, 0.125, 0.125]);
    assert_eq!(state.m.r_max, 0.0);
    assert_eq!(state.ti_old, 4);
}

#[test]
fn test_make_multipoles_is_idempotent() {
    let (mut arena, root, gparts) = built_tree(32);

    make_multipoles(&mut arena, &gparts, root, 4);
    let first = arena[root].multipole.get_mut().m;

    make_multipoles(&mut arena, &gparts, root, 4);
    let second = arena[root].multipole.get_mut().m;

    assert_eq!(first.com, second.com);
    assert_eq!(first.r_max, second.r_max);
    assert_eq!(first.moments, second.moments);
}
