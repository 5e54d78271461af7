// src/cells/lock.rs

//! The subtree lock protocol.
//!
//! A worker that wants to mutate a cell's particle window takes the cell's
//! own try-lock, then walks the chain of strict ancestors bumping each
//! one's hold counter. An ancestor's mutex is only held for the instant of
//! the bump, so sibling subtrees proceed independently; a cell whose hold
//! counter is non-zero refuses its own lock, which is what makes a locked
//! cell's whole subtree exclusive. Nothing ever blocks: any failure
//! unwinds completely and reports `Busy`.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use super::cell::{CellArena, CellId};

/// Which of a cell's four independent resources to lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockKind {
    Part,
    GPart,
    SPart,
    Multipole,
}

/// Result of a lock attempt. `Busy` leaves global state unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum LockStatus {
    Ok,
    Busy,
}

/// One try-lock plus the hold counter its descendants bump.
#[derive(Debug, Default)]
pub struct CellLock {
    locked: AtomicBool,
    hold: AtomicI32,
}

impl CellLock {
    /// Non-blocking acquisition of the mutex alone.
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Spin until the mutex is taken. Only used for the brief multipole
    /// drift during gravity activation, where the critical section is a
    /// handful of loads and stores.
    #[inline]
    pub fn lock_spin(&self) {
        while !self.try_lock() {
            std::hint::spin_loop();
        }
    }

    #[inline]
    pub fn unlock(&self) {
        let was = self.locked.swap(false, Ordering::Release);
        assert!(was, "unlock of a cell that was not locked");
    }

    #[inline]
    pub fn hold(&self) -> i32 {
        self.hold.load(Ordering::Acquire)
    }

    #[inline]
    fn bump_hold(&self) {
        self.hold.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    fn drop_hold(&self) {
        let prev = self.hold.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "hold counter underflow");
    }
}

#[inline]
fn lock_of(arena: &CellArena, id: CellId, kind: LockKind) -> &CellLock {
    arena[id].lock(kind)
}

/// Lock a cell for writes to one of its particle windows (or its
/// multipole) and hold its chain of ancestors.
///
/// Returns [`LockStatus::Busy`] without mutating anything if the cell is
/// held by a descendant, already locked, or any ancestor's mutex cannot be
/// taken.
pub fn locktree(arena: &CellArena, c: CellId, kind: LockKind) -> LockStatus {
    let own = lock_of(arena, c, kind);

    // First of all, try to lock this cell.
    if own.hold() > 0 || !own.try_lock() {
        return LockStatus::Busy;
    }

    // Did somebody hold this cell in the meantime?
    if own.hold() > 0 {
        own.unlock();
        return LockStatus::Busy;
    }

    // Climb up the tree and lock/hold/unlock.
    let mut finger = arena[c].parent;
    while let Some(f) = finger {
        let ancestor = lock_of(arena, f, kind);
        if !ancestor.try_lock() {
            break;
        }
        ancestor.bump_hold();
        ancestor.unlock();
        finger = arena[f].parent;
    }

    // If we reached the top of the tree, we're done.
    if finger.is_none() {
        return LockStatus::Ok;
    }

    // Otherwise, undo the holds up to the snag and admit defeat.
    let snag = finger;
    let mut walk = arena[c].parent;
    while walk != snag {
        let f = walk.expect("snag cell vanished from the ancestor chain");
        lock_of(arena, f, kind).drop_hold();
        walk = arena[f].parent;
    }
    own.unlock();
    LockStatus::Busy
}

/// Release a cell's lock and un-hold every strict ancestor.
pub fn unlocktree(arena: &CellArena, c: CellId, kind: LockKind) {
    lock_of(arena, c, kind).unlock();

    let mut finger = arena[c].parent;
    while let Some(f) = finger {
        lock_of(arena, f, kind).drop_hold();
        finger = arena[f].parent;
    }
}
