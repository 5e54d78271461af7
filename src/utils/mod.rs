mod constants;
mod atomic_float;
mod math;

pub use constants::*;
pub use atomic_float::AtomicF32;
pub use math::nearest;

#[cfg(test)]
mod atomic_float_tests;
