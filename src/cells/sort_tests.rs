use crate::cells::*;
use crate::particles::Part;

fn cell_at(loc: [f64; 3]) -> Cell {
    Cell::new(loc, [0.25, 0.25, 0.25], 0, None)
}

#[test]
fn test_axis_neighbours_map_to_axis_directions() {
    let dim = [1.0, 1.0, 1.0];
    let ci = cell_at([0.25, 0.25, 0.25]);

    // +x, +y, +z neighbours land on the three axis directions.
    let (sid, shift, flipped) = get_sid(dim, true, &ci, &cell_at([0.5, 0.25, 0.25]));
    assert_eq!((sid, flipped), (4, false));
    assert_eq!(shift, [0.0; 3]);

    let (sid, _, flipped) = get_sid(dim, true, &ci, &cell_at([0.25, 0.5, 0.25]));
    assert_eq!((sid, flipped), (10, false));

    let (sid, _, flipped) = get_sid(dim, true, &ci, &cell_at([0.25, 0.25, 0.5]));
    assert_eq!((sid, flipped), (12, false));
}

#[test]
fn test_opposite_neighbours_fold_onto_same_direction() {
    let dim = [1.0, 1.0, 1.0];
    let ci = cell_at([0.25, 0.25, 0.25]);
    let left = cell_at([0.0, 0.25, 0.25]);
    let right = cell_at([0.5, 0.25, 0.25]);

    let (sid_r, _, flipped_r) = get_sid(dim, true, &ci, &right);
    let (sid_l, _, flipped_l) = get_sid(dim, true, &ci, &left);

    // Antisymmetry: -x folds onto the +x direction with the pair swapped.
    assert_eq!(sid_l, sid_r);
    assert!(flipped_l);
    assert!(!flipped_r);
}

#[test]
fn test_corner_neighbour_gets_diagonal_direction() {
    let dim = [1.0, 1.0, 1.0];
    let ci = cell_at([0.25, 0.25, 0.25]);
    let corner = cell_at([0.5, 0.5, 0.5]);

    let (sid, _, flipped) = get_sid(dim, true, &ci, &corner);
    assert_eq!((sid, flipped), (0, false));
}

#[test]
fn test_periodic_wrap_produces_shift() {
    // Neighbours across the box boundary: cj at the far end is really
    // one cell to the left.
    let dim = [1.0, 1.0, 1.0];
    let ci = cell_at([0.0, 0.25, 0.25]);
    let cj = cell_at([0.75, 0.25, 0.25]);

    let (sid, shift, flipped) = get_sid(dim, true, &ci, &cj);
    assert_eq!(sid, 4);
    // After the flip, the canonical first cell is cj and the shift moves
    // ci up by one box length.
    assert!(flipped);
    assert_eq!(shift, [1.0, 0.0, 0.0]);
}

#[test]
fn test_without_periodicity_no_wrap_happens() {
    let dim = [1.0, 1.0, 1.0];
    let ci = cell_at([0.0, 0.25, 0.25]);
    let cj = cell_at([0.75, 0.25, 0.25]);

    let (_, shift, flipped) = get_sid(dim, false, &ci, &cj);
    assert!(!flipped);
    assert_eq!(shift, [0.0; 3]);
}

#[test]
fn test_all_26_neighbours_fold_to_13_directions() {
    let dim = [1.0, 1.0, 1.0];
    let ci = cell_at([0.5, 0.5, 0.5]);

    let mut seen = [false; NR_SORT_DIRECTIONS];
    let mut flips = 0;
    for di in -1i32..=1 {
        for dj in -1i32..=1 {
            for dk in -1i32..=1 {
                if di == 0 && dj == 0 && dk == 0 {
                    continue;
                }
                let cj = cell_at([
                    0.5 + 0.25 * di as f64,
                    0.5 + 0.25 * dj as f64,
                    0.5 + 0.25 * dk as f64,
                ]);
                let (sid, _, flipped) = get_sid(dim, false, &ci, &cj);
                assert!(sid < NR_SORT_DIRECTIONS);
                seen[sid] = true;
                if flipped {
                    flips += 1;
                }

                // Swapping the pair lands on the same direction with the
                // opposite orientation.
                let (sid_rev, _, flipped_rev) = get_sid(dim, false, &cj, &ci);
                assert_eq!(sid, sid_rev);
                assert_ne!(flipped, flipped_rev);
            }
        }
    }

    // Every canonical direction is hit, and exactly half the stencil
    // needed the swap.
    assert!(seen.iter().all(|&s| s));
    assert_eq!(flips, 13);
}

#[test]
fn test_sort_shift_vectors_are_unit_length() {
    for axis in SORT_SHIFT.iter() {
        let norm = (axis[0] * axis[0] + axis[1] * axis[1] + axis[2] * axis[2]).sqrt();
        crate::assert_float_eq(norm, 1.0, 1e-12, None);
    }
}

#[test]
fn test_run_sort_orders_entries_along_axis() {
    let parts: Vec<Part> = [0.9, 0.1, 0.5, 0.3, 0.7]
        .iter()
        .map(|&x| Part::new([x, 0.0, 0.0], [0.0; 3], 0.05, 1.0))
        .collect();

    let mut arena = CellArena::new();
    let mut cell = Cell::new([0.0; 3], [1.0; 3], 0, None);
    cell.count = parts.len();
    let c = arena.insert(cell);

    run_sort(&mut arena, c, &parts, 1 << 4);

    let sorted = arena[c].sorted.load(std::sync::atomic::Ordering::Relaxed);
    assert_eq!(sorted & (1 << 4), 1 << 4);

    let entries = arena[c].sort[4].as_ref().unwrap();
    assert_eq!(entries.len(), parts.len());
    let order: Vec<u32> = entries.iter().map(|s| s.i).collect();
    assert_eq!(order, vec![1, 3, 2, 4, 0]);

    // Directions nobody asked for stay unbuilt.
    assert!(arena[c].sort[0].is_none());
}

#[test]
fn test_run_sort_consumes_pending_bits() {
    let parts = vec![Part::new([0.5; 3], [0.0; 3], 0.05, 1.0)];
    let mut arena = CellArena::new();
    let mut cell = Cell::new([0.0; 3], [1.0; 3], 0, None);
    cell.count = 1;
    let c = arena.insert(cell);

    // A pending direction left by the activation pass is picked up even
    // when the task's own flags say nothing.
    arena[c].do_sort.store(1 << 12, std::sync::atomic::Ordering::Relaxed);
    run_sort(&mut arena, c, &parts, 0);

    assert_eq!(arena[c].do_sort.load(std::sync::atomic::Ordering::Relaxed), 0);
    assert!(arena[c].sort[12].is_some());
}

#[test]
fn test_run_sort_covers_the_subtree() {
    let mut parts: Vec<Part> = (0..8)
        .map(|k| {
            let x = if k & 4 != 0 { 0.75 } else { 0.25 };
            let y = if k & 2 != 0 { 0.75 } else { 0.25 };
            let z = if k & 1 != 0 { 0.75 } else { 0.25 };
            Part::new([x, y, z], [0.0; 3], 0.05, 1.0)
        })
        .collect();
    let mut xparts = vec![crate::particles::XPart::default(); parts.len()];
    let mut gparts: Vec<crate::particles::GPart> = Vec::new();
    let mut sparts: Vec<crate::particles::SPart> = Vec::new();

    let mut arena = CellArena::new();
    let mut root = Cell::new([0.0; 3], [1.0; 3], 0, None);
    root.count = 8;
    let root = arena.insert(root);
    split_cell(&mut arena, root, &mut parts, &mut xparts, &mut gparts, &mut sparts);

    run_sort(&mut arena, root, &parts, 1 << 4);

    for k in 0..8 {
        let child = arena[root].progeny[k].unwrap();
        let sorted = arena[child].sorted.load(std::sync::atomic::Ordering::Relaxed);
        assert_eq!(sorted & (1 << 4), 1 << 4, "child {} missed the subtree sort", k);
    }
}
