mod particle;

pub use particle::*;

#[cfg(test)]
mod particle_tests;
