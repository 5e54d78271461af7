use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cells::CellId;
use crate::engine::{Engine, POLICY_HYDRO, POLICY_SELF_GRAVITY};
use crate::particles::{GPart, GPartLink, Part, SPart};
use crate::space::{Space, SpaceConfig};

fn random_space(n: usize, grid: [usize; 3], split_size: usize) -> Space {
    let mut rng = StdRng::seed_from_u64(42);
    let mut parts = Vec::with_capacity(n);
    let mut gparts = Vec::with_capacity(n);
    for i in 0..n {
        let x = [rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>()];
        let mut p = Part::new(x, [0.0; 3], 0.02, 1.0);
        p.gpart = i as i64;
        p.time_bin = 1;
        let mut gp = GPart::new_dark_matter(x, [0.0; 3], 1.0, i as u64);
        gp.link = GPartLink::Gas(i);
        gp.time_bin = 1;
        parts.push(p);
        gparts.push(gp);
    }

    let config =
        SpaceConfig::new(None, Some(true), Some(grid), Some(split_size)).unwrap();
    Space::new(config, parts, gparts, Vec::new()).unwrap()
}

fn walk(space: &Space, c: CellId, f: &mut impl FnMut(&Space, CellId)) {
    f(space, c);
    for &child in space.cells[c].progeny.iter().flatten() {
        walk(space, child, f);
    }
}

#[test]
fn test_config_rejects_bad_domain() {
    assert!(SpaceConfig::new(Some([0.0, 1.0, 1.0]), None, None, None).is_err());
    assert!(SpaceConfig::new(None, None, Some([0, 2, 2]), None).is_err());
}

#[test]
fn test_rebuild_bins_particles_into_top_cells() {
    let mut space = random_space(256, [2, 2, 2], 32);
    let e = Engine::local(POLICY_HYDRO | POLICY_SELF_GRAVITY, 1.0e-6).unwrap();

    space.rebuild(&e);

    assert_eq!(space.top.len(), 8);
    let mut total = 0;
    for &c in &space.top {
        let cell = &space.cells[c];
        total += cell.count;
        // Every particle of the window sits inside the cell.
        for p in &space.parts[cell.parts_offset..cell.parts_offset + cell.count] {
            for k in 0..3 {
                assert!(
                    p.x[k] >= cell.loc[k] && p.x[k] < cell.loc[k] + cell.width[k],
                    "particle escaped its top-level cell"
                );
            }
        }
    }
    assert_eq!(total, space.parts.len());
}

#[test]
fn test_rebuild_keeps_links_consistent() {
    let mut space = random_space(256, [2, 2, 2], 32);
    let e = Engine::local(POLICY_HYDRO | POLICY_SELF_GRAVITY, 1.0e-6).unwrap();

    space.rebuild(&e);

    for (i, p) in space.parts.iter().enumerate() {
        assert!(p.gpart >= 0);
        assert_eq!(space.gparts[p.gpart as usize].link, GPartLink::Gas(i));
        assert_eq!(space.gparts[p.gpart as usize].x, p.x);
    }
}

#[test]
fn test_rebuild_splits_down_to_threshold() {
    let mut space = random_space(512, [1, 1, 1], 32);
    let e = Engine::local(POLICY_HYDRO | POLICY_SELF_GRAVITY, 1.0e-6).unwrap();

    space.rebuild(&e);

    let root = space.top[0];
    assert!(space.cells[root].split);

    // No leaf exceeds the threshold, and split windows partition.
    let mut leaves = 0;
    walk(&space, root, &mut |space, c| {
        let cell = &space.cells[c];
        if cell.split {
            let sum: usize = cell
                .progeny
                .iter()
                .flatten()
                .map(|&p| space.cells[p].count)
                .sum();
            assert_eq!(sum, cell.count);
        } else {
            assert!(cell.count <= 32);
            leaves += 1;
        }
    });
    assert!(leaves > 1);
}

#[test]
fn test_rebuild_builds_multipoles() {
    let mut space = random_space(128, [1, 1, 1], 32);
    let e = Engine::local(POLICY_SELF_GRAVITY, 1.0e-6).unwrap();

    space.rebuild(&e);

    let root = space.top[0];
    let total_mass: f32 = space.gparts.iter().map(|gp| gp.mass).sum();
    let m = space.cells[root].multipole.get_mut().m;
    crate::assert_float_eq(m.moments.m_000 as f64, total_mass as f64, 1e-3, None);
    assert!(m.r_max > 0.0);
}

#[test]
fn test_rebuild_resets_motion_envelopes() {
    let mut space = random_space(64, [1, 1, 1], 16);
    let e = Engine::local(POLICY_HYDRO, 1.0e-6).unwrap();

    // Pretend the particles had drifted far before the rebuild.
    for xp in &mut space.xparts {
        xp.x_diff = [0.5; 3];
        xp.x_diff_sort = [0.5; 3];
    }

    space.rebuild(&e);

    for xp in &space.xparts {
        assert_eq!(xp.x_diff, [0.0; 3]);
        assert_eq!(xp.x_diff_sort, [0.0; 3]);
    }
}

#[test]
fn test_get_cells_draws_from_pool() {
    let mut space = random_space(8, [1, 1, 1], 16);
    let fresh = space.get_cells(4);
    assert_eq!(fresh.len(), 4);

    space.cells.recycle(fresh[0]);
    let again = space.get_cells(1);
    assert_eq!(again[0], fresh[0]);
}

#[test]
fn test_stars_follow_their_own_classifier() {
    // A star exactly on the pivot plane goes low with the strict `>`
    // rule, while a gas particle at the same spot goes high with `>=`.
    let mut parts = vec![Part::new([0.5, 0.5, 0.5], [0.0; 3], 0.02, 1.0)];
    parts[0].time_bin = 1;
    let mut sparts = vec![SPart::new([0.5, 0.5, 0.5], [0.0; 3], 1.0)];
    let mut gparts = vec![
        GPart::new_dark_matter([0.5, 0.5, 0.5], [0.0; 3], 1.0, 0),
        GPart::new_dark_matter([0.6, 0.6, 0.6], [0.0; 3], 1.0, 1),
    ];
    parts[0].gpart = 0;
    gparts[0].link = GPartLink::Gas(0);
    sparts[0].gpart = 1;
    gparts[1].link = GPartLink::Star(0);

    let config = SpaceConfig::new(None, None, None, Some(1)).unwrap();
    let mut space = Space::new(config, parts, gparts, sparts).unwrap();
    let e = Engine::local(POLICY_HYDRO | POLICY_SELF_GRAVITY, 1.0e-6).unwrap();
    space.rebuild(&e);

    let root = space.top[0];
    let high = space.cells[root].progeny[7].unwrap();
    let low = space.cells[root].progeny[0].unwrap();
    assert_eq!(space.cells[high].count, 1, "gas particle on the pivot binned low");
    assert_eq!(space.cells[low].scount, 1, "star on the pivot binned high");
}
