// src/utils/atomic_float.rs

use std::sync::atomic::{AtomicU32, Ordering};

/// An `f32` that can be written from several workers at once.
///
/// Activation sweeps snapshot per-cell motion bounds from whichever pair
/// task reaches the cell first; the stores race benignly, so the value is
/// kept as raw bits in an `AtomicU32`.
#[derive(Debug, Default)]
pub struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        AtomicF32 { bits: AtomicU32::new(value.to_bits()) }
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Clone for AtomicF32 {
    fn clone(&self) -> Self {
        AtomicF32::new(self.load())
    }
}
