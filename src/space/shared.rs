// src/space/shared.rs

use std::marker::PhantomData;

use super::space::Space;

/// A space handle that task bodies on several workers can reach through.
///
/// The scheduler's dependency graph and the subtree lock protocol are
/// what make concurrent access sound: at any instant, at most one task
/// writes a given cell's particle windows, and drift tasks on disjoint
/// subtrees touch disjoint windows. The handle only erases the exclusive
/// borrow; it adds no synchronisation of its own.
pub struct SharedSpace<'a> {
    ptr: *mut Space,
    _marker: PhantomData<&'a mut Space>,
}

unsafe impl Send for SharedSpace<'_> {}
unsafe impl Sync for SharedSpace<'_> {}

impl<'a> SharedSpace<'a> {
    pub fn new(space: &'a mut Space) -> Self {
        SharedSpace { ptr: space, _marker: PhantomData }
    }

    /// Reborrow the space.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that no other worker mutates any state
    /// reachable through the returned reference at the same time, either
    /// by holding the relevant subtree locks or by relying on the
    /// scheduler's dependency edges.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get(&self) -> &'a mut Space {
        &mut *self.ptr
    }
}
