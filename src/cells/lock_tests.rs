use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::cells::*;

/// A root with two children and one grandchild under the first child.
fn small_tree() -> (CellArena, CellId, CellId, CellId, CellId) {
    let mut arena = CellArena::new();
    let root = arena.insert(Cell::new([0.0; 3], [1.0; 3], 0, None));
    let left = arena.insert(Cell::new([0.0; 3], [0.5; 3], 1, Some(root)));
    let right = arena.insert(Cell::new([0.5, 0.0, 0.0], [0.5; 3], 1, Some(root)));
    let leaf = arena.insert(Cell::new([0.0; 3], [0.25; 3], 2, Some(left)));
    arena[root].progeny[0] = Some(left);
    arena[root].progeny[4] = Some(right);
    arena[root].split = true;
    arena[left].progeny[0] = Some(leaf);
    arena[left].split = true;
    (arena, root, left, right, leaf)
}

#[test]
fn test_lock_holds_ancestors() {
    let (arena, root, left, _right, leaf) = small_tree();

    assert_eq!(locktree(&arena, leaf, LockKind::Part), LockStatus::Ok);
    assert_eq!(arena[left].part_lock.hold(), 1);
    assert_eq!(arena[root].part_lock.hold(), 1);

    unlocktree(&arena, leaf, LockKind::Part);
    assert_eq!(arena[left].part_lock.hold(), 0);
    assert_eq!(arena[root].part_lock.hold(), 0);
}

#[test]
fn test_held_cell_refuses_its_own_lock() {
    let (arena, _root, left, _right, leaf) = small_tree();

    assert_eq!(locktree(&arena, leaf, LockKind::Part), LockStatus::Ok);
    // `left` is held by its descendant, so its own lock must fail...
    assert_eq!(locktree(&arena, left, LockKind::Part), LockStatus::Busy);
    unlocktree(&arena, leaf, LockKind::Part);
    // ...and succeed again once the descendant lets go.
    assert_eq!(locktree(&arena, left, LockKind::Part), LockStatus::Ok);
    unlocktree(&arena, left, LockKind::Part);
}

#[test]
fn test_locked_ancestor_blocks_descendant() {
    let (arena, root, _left, _right, leaf) = small_tree();

    assert_eq!(locktree(&arena, root, LockKind::Part), LockStatus::Ok);
    // The leaf's ancestor walk hits the root's taken mutex.
    assert_eq!(locktree(&arena, leaf, LockKind::Part), LockStatus::Busy);
    // A failed attempt leaves no holds behind.
    assert_eq!(arena[root].part_lock.hold(), 0);
    unlocktree(&arena, root, LockKind::Part);
}

#[test]
fn test_sibling_subtrees_do_not_contend() {
    let (arena, root, left, right, _leaf) = small_tree();

    assert_eq!(locktree(&arena, left, LockKind::Part), LockStatus::Ok);
    assert_eq!(locktree(&arena, right, LockKind::Part), LockStatus::Ok);
    assert_eq!(arena[root].part_lock.hold(), 2);

    unlocktree(&arena, left, LockKind::Part);
    unlocktree(&arena, right, LockKind::Part);
    assert_eq!(arena[root].part_lock.hold(), 0);
}

#[test]
fn test_kinds_are_independent() {
    let (arena, _root, left, _right, leaf) = small_tree();

    assert_eq!(locktree(&arena, left, LockKind::Part), LockStatus::Ok);
    assert_eq!(locktree(&arena, left, LockKind::GPart), LockStatus::Ok);
    assert_eq!(locktree(&arena, leaf, LockKind::Multipole), LockStatus::Ok);

    unlocktree(&arena, left, LockKind::Part);
    unlocktree(&arena, left, LockKind::GPart);
    unlocktree(&arena, leaf, LockKind::Multipole);
}

#[test]
#[should_panic(expected = "hold counter underflow")]
fn test_hold_underflow_aborts() {
    let (arena, _root, _left, _right, leaf) = small_tree();
    assert_eq!(locktree(&arena, leaf, LockKind::Part), LockStatus::Ok);
    unlocktree(&arena, leaf, LockKind::Part);
    // A second unlock walks the ancestors into negative holds.
    unlocktree(&arena, leaf, LockKind::Part);
}

#[test]
fn test_no_two_workers_hold_overlapping_subtrees() {
    let (arena, root, left, right, leaf) = small_tree();

    // One marker per cell; a worker sets the markers of its whole locked
    // subtree while it believes itself exclusive.
    let marked = [
        AtomicBool::new(false), // root
        AtomicBool::new(false), // left
        AtomicBool::new(false), // right
        AtomicBool::new(false), // leaf
    ];
    let subtree_of = |c: CellId| -> Vec<usize> {
        if c == root {
            vec![0, 1, 2, 3]
        } else if c == left {
            vec![1, 3]
        } else if c == right {
            vec![2]
        } else {
            vec![3]
        }
    };
    let acquired = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for worker in 0..4 {
            let targets = [root, left, right, leaf];
            let marked = &marked;
            let arena = &arena;
            let acquired = &acquired;
            let subtree_of = &subtree_of;
            s.spawn(move || {
                for round in 0..500 {
                    let c = targets[(worker + round) % targets.len()];
                    if locktree(arena, c, LockKind::Part) == LockStatus::Busy {
                        continue;
                    }
                    for &m in &subtree_of(c) {
                        assert!(
                            !marked[m].swap(true, Ordering::SeqCst),
                            "two workers hold overlapping subtrees"
                        );
                    }
                    std::hint::spin_loop();
                    for &m in &subtree_of(c) {
                        marked[m].store(false, Ordering::SeqCst);
                    }
                    unlocktree(arena, c, LockKind::Part);
                    acquired.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });

    // The protocol must have made progress.
    assert!(acquired.load(Ordering::Relaxed) > 0);
    assert_eq!(arena[root].part_lock.hold(), 0);
    assert_eq!(arena[left].part_lock.hold(), 0);
}
